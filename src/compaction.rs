//! Compaction engine for rskv
//!
//! Reclaims log space below a caller-chosen boundary by copying the still-live
//! records it contains to the tail, so the region can later be dropped via a
//! head-address shift. Mirrors FASTER's two LogCompactionType strategies:
//! Lookup (single pass, index-probe per record) and Scan (build an in-memory
//! key/value map first, then emit only the survivors).

use std::collections::HashMap;
use std::sync::Arc;

use crate::common::{Address, Key, Result, RsKvError, Value};
use crate::epoch::SharedEpochManager;
use crate::hlog::{BufferingMode, HybridLog, LogRecord};
use crate::index::SharedMemHashIndex;

/// Compaction strategy to use for a single `compact` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionType {
    /// Probe the index for every record visited during the scan. Low memory
    /// overhead, pays a hash lookup per record.
    Lookup,
    /// Deduplicate into an in-memory map before emitting survivors. Higher
    /// memory overhead, avoids redundant index probes for keys rewritten
    /// many times within the compacted range.
    Scan,
}

impl std::str::FromStr for CompactionType {
    type Err = RsKvError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lookup" => Ok(CompactionType::Lookup),
            "scan" => Ok(CompactionType::Scan),
            other => Err(RsKvError::InvalidCompactionType {
                name: other.to_string(),
            }),
        }
    }
}

/// Outcome of a `compact` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactionStats {
    /// Records visited during the scan.
    pub scanned: u64,
    /// Records found live (still reachable from the index).
    pub live: u64,
    /// Live records copied to the tail.
    pub copied: u64,
    /// Boundary the compaction ran up to.
    pub until_address: Address,
}

/// How often (in records visited) a lookup-style compaction cooperatively
/// drains pending epoch actions, so a long compaction doesn't stall other
/// region shifts.
const DRAIN_EVERY: u64 = 256;

/// Caller-supplied liveness override, mirroring FASTER's
/// `ICompactionFunctions::IsDeleted`. A record that is not tombstoned and is
/// still the index's latest version for its key is nonetheless dropped if
/// this predicate returns `true` for it.
pub struct CompactionFunctions {
    is_deleted: Box<dyn Fn(&Key, &Value) -> bool + Send + Sync>,
}

impl CompactionFunctions {
    pub fn new<F>(is_deleted: F) -> Self
    where
        F: Fn(&Key, &Value) -> bool + Send + Sync + 'static,
    {
        Self {
            is_deleted: Box::new(is_deleted),
        }
    }

    fn is_deleted(&self, key: &Key, value: &Value) -> bool {
        (self.is_deleted)(key, value)
    }
}

impl Default for CompactionFunctions {
    fn default() -> Self {
        Self::new(|_key, _value| false)
    }
}

/// A record at `address` is reachable iff the index still considers it the
/// latest version of `key`. The index stores one entry per key (the head of
/// its version chain), so no further chain walk is needed: an older version
/// is, by construction, unreachable once a newer one has been indexed.
fn is_reachable(index: &SharedMemHashIndex, key: &Key, address: Address) -> bool {
    index.find(key) == Some(address)
}

fn copy_to_tail(
    hlog: &Arc<HybridLog>,
    index: &SharedMemHashIndex,
    key: Key,
    value: Value,
    tombstone: bool,
    old_address: Address,
) -> Result<Option<Address>> {
    let previous_address = index.find(&key).unwrap_or(old_address);
    let record = if tombstone {
        LogRecord::tombstone(key.clone(), previous_address)
    } else {
        LogRecord::new(key.clone(), value, previous_address)
    };

    let new_address = hlog.insert_record(record)?;

    if index.update_if_exists(&key, old_address, new_address) {
        Ok(Some(new_address))
    } else {
        // Someone else updated the key after our liveness check (or wrote a
        // newer version while we were copying); the copy we just made is
        // orphaned but harmless, it will be reclaimed on the next pass.
        Ok(None)
    }
}

/// Compact `[BeginAddress, until_address)`. `until_address` must not exceed
/// `SafeReadOnlyAddress`: records above it may still be concurrently
/// rewritten and are not safe to reason about.
///
/// `functions` supplies the caller's custom liveness predicate; pass
/// [`CompactionFunctions::default()`] to compact using only the index and
/// tombstone bits.
pub fn compact(
    hlog: &Arc<HybridLog>,
    index: &SharedMemHashIndex,
    epoch: &SharedEpochManager,
    until_address: Address,
    compaction_type: CompactionType,
    functions: &CompactionFunctions,
) -> Result<CompactionStats> {
    let safe_ro = hlog.get_safe_read_only_address();
    if until_address > safe_ro {
        return Err(RsKvError::CompactionBoundary {
            until: until_address,
            safe_read_only: safe_ro,
        });
    }

    let begin = hlog.get_begin_address();
    if until_address <= begin {
        return Ok(CompactionStats {
            until_address: begin,
            ..Default::default()
        });
    }

    match compaction_type {
        CompactionType::Lookup => compact_lookup(hlog, index, epoch, begin, until_address, functions),
        CompactionType::Scan => compact_scan(hlog, index, epoch, begin, until_address, functions),
    }
}

fn compact_lookup(
    hlog: &Arc<HybridLog>,
    index: &SharedMemHashIndex,
    epoch: &SharedEpochManager,
    begin: Address,
    until_address: Address,
    functions: &CompactionFunctions,
) -> Result<CompactionStats> {
    let mut stats = CompactionStats {
        until_address,
        ..Default::default()
    };
    let mut reached = begin;

    let mut iter = hlog.scan(begin, until_address, BufferingMode::SinglePage);
    while iter.get_next()? {
        stats.scanned += 1;
        let record_address = iter.current_address();
        let key = iter.current_key().expect("buffered record has a key").clone();
        let header = *iter.current_record_info().expect("buffered record has a header");

        if is_reachable(index, &key, record_address) {
            stats.live += 1;
            if !header.tombstone {
                let value = iter.current_value().expect("live record has a value").clone();
                if !functions.is_deleted(&key, &value)
                    && copy_to_tail(hlog, index, key, value, false, record_address)?.is_some()
                {
                    stats.copied += 1;
                }
            }
            // A live tombstone at this address means deletion is still the
            // latest word on the key; nothing survives to copy.
        }

        reached = iter.next_address();
        if stats.scanned % DRAIN_EVERY == 0 {
            epoch.protect_and_drain();
        }
    }

    stats.until_address = reached;
    Ok(stats)
}

enum TempValue {
    Value(Value),
    Tombstone,
}

fn compact_scan(
    hlog: &Arc<HybridLog>,
    index: &SharedMemHashIndex,
    epoch: &SharedEpochManager,
    begin: Address,
    until_address: Address,
    functions: &CompactionFunctions,
) -> Result<CompactionStats> {
    let mut stats = CompactionStats {
        until_address,
        ..Default::default()
    };
    let mut reached = begin;

    // Phase 1: build the deduplicated temp map over [begin, until_address).
    let mut temp_kv: HashMap<Key, TempValue> = HashMap::new();
    let mut iter = hlog.scan(begin, until_address, BufferingMode::DoublePage);
    while iter.get_next()? {
        stats.scanned += 1;
        let header = *iter.current_record_info().expect("buffered record has a header");
        let key = iter.current_key().expect("buffered record has a key").clone();
        if header.tombstone {
            temp_kv.insert(key, TempValue::Tombstone);
        } else {
            let value = iter.current_value().expect("record has a value").clone();
            temp_kv.insert(key, TempValue::Value(value));
        }
        reached = iter.next_address();
        if stats.scanned % DRAIN_EVERY == 0 {
            epoch.protect_and_drain();
        }
    }
    stats.until_address = reached;
    let original_until_address = reached;

    // Phase 2: catch up on whatever became immutable after the snapshot of
    // `reached` we started from, folding later writes into the map so
    // survivors reflect the newest version of each key.
    let catch_up_end = hlog.get_safe_read_only_address();
    if catch_up_end > reached {
        let mut catch_up = hlog.scan(reached, catch_up_end, BufferingMode::SinglePage);
        while catch_up.get_next()? {
            let header = *catch_up
                .current_record_info()
                .expect("buffered record has a header");
            let key = catch_up.current_key().expect("buffered record has a key").clone();
            if header.tombstone {
                temp_kv.insert(key, TempValue::Tombstone);
            } else {
                let value = catch_up.current_value().expect("record has a value").clone();
                temp_kv.insert(key, TempValue::Value(value));
            }
        }
    }

    // Phase 3: emit survivors whose key is still indexed to an address below
    // the catch-up boundary (i.e. nobody wrote a newer version during phases
    // 1-2, which would have been folded into `temp_kv` above and so would no
    // longer match the address we read it at).
    let live_ceiling = catch_up_end.max(original_until_address);
    for (key, value) in temp_kv {
        let current = match index.find(&key) {
            Some(addr) => addr,
            None => continue,
        };
        if current < live_ceiling {
            stats.live += 1;
            if let TempValue::Value(v) = value
                && !functions.is_deleted(&key, &v)
                && copy_to_tail(hlog, index, key, v, false, current)?.is_some()
            {
                stats.copied += 1;
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::EpochManager;
    use crate::hlog::FileStorageDevice;
    use crate::index::new_shared_mem_hash_index;

    fn new_test_env() -> (Arc<HybridLog>, SharedMemHashIndex, SharedEpochManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Box::new(FileStorageDevice::new(dir.path().join("test.log")).unwrap());
        let epoch: SharedEpochManager = Arc::new(EpochManager::new());
        let hlog = Arc::new(HybridLog::new(64 * 1024 * 1024, storage, epoch.clone()).unwrap());
        let index = new_shared_mem_hash_index(epoch.clone());
        (hlog, index, epoch, dir)
    }

    fn upsert(hlog: &Arc<HybridLog>, index: &SharedMemHashIndex, key: &[u8], value: &[u8]) -> Address {
        let previous = index.find(&key.to_vec()).unwrap_or(crate::common::INVALID_ADDRESS);
        let record = LogRecord::new(key.to_vec(), value.to_vec(), previous);
        let address = hlog.insert_record(record).unwrap();
        index.insert(key.to_vec(), address);
        address
    }

    #[test]
    fn lookup_compaction_preserves_live_keys() {
        let (hlog, index, epoch, _dir) = new_test_env();

        for i in 0..20u32 {
            upsert(&hlog, &index, format!("key{i}").as_bytes(), format!("v{i}").as_bytes());
        }

        let until = hlog.get_tail_address();
        hlog.shift_read_only_address(until);

        let stats = compact(&hlog, &index, &epoch, until, CompactionType::Lookup, &CompactionFunctions::default()).unwrap();
        assert_eq!(stats.scanned, 20);
        assert_eq!(stats.live, 20);
        assert_eq!(stats.copied, 20);

        for i in 0..20u32 {
            let key = format!("key{i}").into_bytes();
            let addr = index.find(&key).unwrap();
            let record = hlog.read_record(addr).unwrap();
            assert_eq!(record.value, format!("v{i}").into_bytes());
        }
    }

    #[test]
    fn lookup_compaction_skips_overwritten_keys() {
        let (hlog, index, epoch, _dir) = new_test_env();

        upsert(&hlog, &index, b"k", b"v1");
        upsert(&hlog, &index, b"k", b"v2");

        let until = hlog.get_tail_address();
        hlog.shift_read_only_address(until);

        let stats = compact(&hlog, &index, &epoch, until, CompactionType::Lookup, &CompactionFunctions::default()).unwrap();
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.live, 1);
        assert_eq!(stats.copied, 1);

        let addr = index.find(&b"k".to_vec()).unwrap();
        assert_eq!(hlog.read_record(addr).unwrap().value, b"v2".to_vec());
    }

    #[test]
    fn scan_compaction_deduplicates_before_emitting() {
        let (hlog, index, epoch, _dir) = new_test_env();

        for _ in 0..5 {
            upsert(&hlog, &index, b"hot", b"latest");
        }
        upsert(&hlog, &index, b"cold", b"only");

        let until = hlog.get_tail_address();
        hlog.shift_read_only_address(until);

        let stats = compact(&hlog, &index, &epoch, until, CompactionType::Scan, &CompactionFunctions::default()).unwrap();
        assert_eq!(stats.scanned, 6);
        assert_eq!(stats.copied, 2);

        assert_eq!(
            hlog.read_record(index.find(&b"hot".to_vec()).unwrap())
                .unwrap()
                .value,
            b"latest".to_vec()
        );
        assert_eq!(
            hlog.read_record(index.find(&b"cold".to_vec()).unwrap())
                .unwrap()
                .value,
            b"only".to_vec()
        );
    }

    #[test]
    fn compaction_past_safe_read_only_is_rejected() {
        let (hlog, index, epoch, _dir) = new_test_env();
        upsert(&hlog, &index, b"k", b"v");

        let tail = hlog.get_tail_address();
        let err = compact(&hlog, &index, &epoch, tail, CompactionType::Lookup, &CompactionFunctions::default()).unwrap_err();
        assert!(matches!(err, RsKvError::CompactionBoundary { .. }));
    }

    #[test]
    fn custom_liveness_drops_keys_lookup() {
        let (hlog, index, epoch, _dir) = new_test_env();

        for i in 0..10u32 {
            upsert(&hlog, &index, format!("key{i}").as_bytes(), i.to_string().as_bytes());
        }

        let until = hlog.get_tail_address();
        hlog.shift_read_only_address(until);

        // Drop every key whose value is odd, mirroring a caller-defined
        // liveness rule independent of tombstones and the index.
        let functions = CompactionFunctions::new(|_key, value| {
            let n: u32 = std::str::from_utf8(value).unwrap().parse().unwrap();
            n % 2 != 0
        });

        let stats = compact(&hlog, &index, &epoch, until, CompactionType::Lookup, &functions).unwrap();
        assert_eq!(stats.scanned, 10);
        assert_eq!(stats.live, 10);
        assert_eq!(stats.copied, 5);

        for i in 0..10u32 {
            let key = format!("key{i}").into_bytes();
            let addr = index.find(&key).unwrap();
            let record = hlog.read_record(addr).unwrap();
            if i % 2 == 0 {
                assert!(!record.header.tombstone);
                assert_eq!(record.value, i.to_string().into_bytes());
            } else {
                // Not copied to the tail, but the index still points at the
                // pre-compaction record until the prefix is truncated.
                assert_eq!(record.value, i.to_string().into_bytes());
                assert!(addr < stats.until_address);
            }
        }
    }

    #[test]
    fn custom_liveness_drops_keys_scan() {
        let (hlog, index, epoch, _dir) = new_test_env();

        upsert(&hlog, &index, b"keep", b"even");
        upsert(&hlog, &index, b"drop", b"odd");

        let until = hlog.get_tail_address();
        hlog.shift_read_only_address(until);

        let functions = CompactionFunctions::new(|key, _value| key == b"drop");

        let stats = compact(&hlog, &index, &epoch, until, CompactionType::Scan, &functions).unwrap();
        assert_eq!(stats.live, 2);
        assert_eq!(stats.copied, 1);

        let kept_addr = index.find(&b"keep".to_vec()).unwrap();
        assert!(kept_addr >= stats.until_address);
        assert_eq!(hlog.read_record(kept_addr).unwrap().value, b"even".to_vec());
    }
}
