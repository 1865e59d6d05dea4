//! Synchronous log accessor facade for rskv
//!
//! Wraps the allocator's region-shift operations with epoch protection, so
//! callers never have to reason about `Protect`/`Suspend`/`ProtectAndDrain`
//! themselves. Mirrors FASTER's `LogAccessor<K, V>`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::common::{Address, Result, RsKvError};
use crate::epoch::SharedEpochManager;
use crate::hlog::{BufferingMode, EvictionEvent, HybridLog, LogIterator, ReadOnlyEvent};

/// How long [`LogAccessor::shift_head_address`] and
/// [`LogAccessor::shift_read_only_address`] will spin-wait for a requested
/// shift to become safely visible before giving up.
const WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Synchronous facade over a [`HybridLog`]'s address-region operations.
pub struct LogAccessor {
    hlog: Arc<HybridLog>,
    epoch: SharedEpochManager,
    checkpointing_enabled: AtomicBool,
}

impl LogAccessor {
    pub fn new(hlog: Arc<HybridLog>, epoch: SharedEpochManager) -> Self {
        Self {
            hlog,
            epoch,
            checkpointing_enabled: AtomicBool::new(true),
        }
    }

    /// Run `f` under epoch protection, unless the calling thread already
    /// holds it (a reentrant call from inside another accessor operation).
    fn protected<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if self.epoch.this_instance_protected() {
            f()
        } else {
            self.epoch.protect();
            let result = f();
            self.epoch.suspend();
            result
        }
    }

    fn wait_until<F>(&self, mut condition: F) -> Result<()>
    where
        F: FnMut() -> bool,
    {
        let start = Instant::now();
        while !condition() {
            if start.elapsed() > WAIT_TIMEOUT {
                return Err(RsKvError::Timeout {
                    duration_ms: WAIT_TIMEOUT.as_millis() as u64,
                });
            }
            self.epoch.protect_and_drain();
            std::thread::yield_now();
        }
        Ok(())
    }

    pub fn begin_address(&self) -> Address {
        self.hlog.get_begin_address()
    }

    pub fn head_address(&self) -> Address {
        self.hlog.get_head_address()
    }

    pub fn safe_head_address(&self) -> Address {
        self.hlog.get_safe_head_address()
    }

    pub fn read_only_address(&self) -> Address {
        self.hlog.get_read_only_address()
    }

    pub fn safe_read_only_address(&self) -> Address {
        self.hlog.get_safe_read_only_address()
    }

    pub fn tail_address(&self) -> Address {
        self.hlog.get_tail_address()
    }

    /// Raise `BeginAddress`, snapping down to a page boundary.
    pub fn shift_begin_address(&self, new_begin: Address) -> Address {
        self.protected(|| self.hlog.shift_begin_address(new_begin, true))
    }

    /// Alias matching FASTER's naming: drop everything below `new_begin`
    /// from the addressable log (data stays on disk if already flushed).
    pub fn truncate(&self, new_begin: Address) -> Address {
        self.shift_begin_address(new_begin)
    }

    /// Raise `ReadOnlyAddress` to `new_ro`. When `wait` is set, blocks (by
    /// cooperatively draining epoch actions) until `SafeReadOnlyAddress`
    /// catches up.
    pub fn shift_read_only_address(&self, new_ro: Address, wait: bool) -> Result<Address> {
        let target = self.protected(|| self.hlog.shift_read_only_address(new_ro));
        if wait {
            self.wait_until(|| self.hlog.get_safe_read_only_address() >= target)?;
        }
        Ok(target)
    }

    /// Raise `HeadAddress` to `new_head`, first raising `ReadOnlyAddress`
    /// (and waiting for its flush) if it has not already reached `new_head`.
    pub fn shift_head_address(&self, new_head: Address, wait: bool) -> Result<Address> {
        if self.hlog.get_read_only_address() < new_head {
            self.shift_read_only_address(new_head, true)?;
        }

        let target = self.protected(|| self.hlog.shift_head_address(new_head))?;
        if wait {
            self.wait_until(|| self.hlog.get_safe_head_address() >= target)?;
        }
        Ok(target)
    }

    /// Flush `[FlushedUntilAddress, until_address)` to the storage device.
    pub fn flush(&self, until_address: Address) -> Result<()> {
        self.protected(|| self.hlog.flush_sync(until_address))
    }

    /// Flush and then evict `[HeadAddress, until_address)`, waiting for the
    /// eviction to become safe.
    pub fn flush_and_evict(&self, until_address: Address) -> Result<Address> {
        self.shift_head_address(until_address, true)
    }

    /// Release every in-memory page. The log accessor (and the allocator
    /// underneath it) is unusable afterwards.
    pub fn dispose_from_memory(&self) {
        self.hlog.dispose_from_memory();
    }

    /// Iterate `[begin, end)`. Stops at `SafeReadOnlyAddress` unless
    /// `allow_mutable` is set.
    pub fn scan(&self, begin: Address, end: Address, mode: BufferingMode, allow_mutable: bool) -> LogIterator {
        if allow_mutable {
            self.hlog.scan_allow_mutable(begin, end, mode)
        } else {
            self.hlog.scan(begin, end, mode)
        }
    }

    /// Install the read-only transition observer, replacing any existing
    /// one (binding a second observer silently supersedes the first).
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(ReadOnlyEvent) + Send + Sync + 'static,
    {
        self.hlog.subscribe_read_only(observer);
    }

    pub fn unsubscribe(&self) {
        self.hlog.unsubscribe_read_only();
    }

    /// Install the eviction observer, replacing any existing one.
    pub fn subscribe_evictions<F>(&self, observer: F)
    where
        F: Fn(EvictionEvent) + Send + Sync + 'static,
    {
        self.hlog.subscribe_evictions(observer);
    }

    pub fn unsubscribe_evictions(&self) {
        self.hlog.unsubscribe_evictions();
    }

    /// Number of ring pages permanently held empty. A request at or past the
    /// buffer size is clamped rather than rejected.
    pub fn set_empty_page_count(&self, count: u64) {
        self.hlog.set_empty_page_count(count);
    }

    pub fn empty_page_count(&self) -> u64 {
        self.hlog.empty_page_count()
    }

    pub fn set_checkpointing(&self, enabled: bool) {
        self.checkpointing_enabled.store(enabled, Ordering::Release);
    }

    pub fn checkpointing_enabled(&self) -> bool {
        self.checkpointing_enabled.load(Ordering::Acquire)
    }
}
