//! Hybrid Log (HLog) implementation for rskv
//!
//! This module implements the core storage engine inspired by FASTER's
//! PersistentMemoryMalloc. It provides a large, in-memory, circular buffer
//! with persistent storage support, six monotone address cursors, epoch
//! protected region shifts, and a boundary-respecting record iterator.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use memmap2::{MmapMut, MmapOptions};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::common::{
    Address, Key, PAGE_SIZE, RecordInfo, Result, RsKvError, Value, get_offset, get_page,
    make_address,
};
use crate::epoch::SharedEpochManager;

/// Storage device trait for abstracting disk I/O operations
pub trait StorageDevice {
    /// Write data to storage at the specified offset
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Read data from storage at the specified offset
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Flush pending writes to storage
    fn flush(&mut self) -> Result<()>;

    /// Get the size of the storage device
    fn size(&self) -> u64;

    /// Truncate the storage to the specified size
    fn truncate(&mut self, size: u64) -> Result<()>;

    /// Check if the storage device supports memory mapping
    fn supports_mmap(&self) -> bool {
        false
    }

    /// Get memory mapped access to the storage (if supported)
    fn get_mmap(&mut self, offset: u64, len: usize) -> Result<Option<&mut [u8]>> {
        let _ = (offset, len);
        Ok(None)
    }
}

/// File-based storage device implementation
pub struct FileStorageDevice {
    file: File,
    #[allow(dead_code)]
    path: PathBuf,
}

impl FileStorageDevice {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        Ok(Self { file, path })
    }
}

impl StorageDevice for FileStorageDevice {
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        use std::io::{Read, Seek, SeekFrom};

        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        Ok(file.read(buf)?)
    }

    fn flush(&mut self) -> Result<()> {
        use std::io::Write;
        self.file.flush()?;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.file.metadata().map(|m| m.len()).unwrap_or(0)
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        self.file.set_len(size)?;
        Ok(())
    }
}

/// Atomic page offset structure (matches FASTER's PageOffset)
#[derive(Debug)]
pub struct AtomicPageOffset {
    value: AtomicU64,
}

impl AtomicPageOffset {
    pub fn new(page: u32, offset: u32) -> Self {
        let value = make_address(page, offset);
        Self {
            value: AtomicU64::new(value),
        }
    }

    pub fn load(&self) -> (u32, u32) {
        let addr = self.value.load(Ordering::Acquire);
        (get_page(addr), get_offset(addr))
    }

    pub fn store(&self, page: u32, offset: u32) {
        let addr = make_address(page, offset);
        self.value.store(addr, Ordering::Release);
    }

    /// Reserve space for allocation (atomic fetch_add operation)
    /// Returns the old page and offset values
    pub fn reserve(&self, size: u32) -> (u32, u32) {
        let old_value = self.value.fetch_add(size as u64, Ordering::AcqRel);
        (get_page(old_value), get_offset(old_value))
    }

    /// Compare and exchange operation for page boundary crossing
    pub fn compare_exchange(
        &self,
        expected_page: u32,
        expected_offset: u32,
        new_page: u32,
        new_offset: u32,
    ) -> std::result::Result<(), (u32, u32)> {
        let expected = make_address(expected_page, expected_offset);
        let new_value = make_address(new_page, new_offset);

        match self
            .value
            .compare_exchange(expected, new_value, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(actual) => Err((get_page(actual), get_offset(actual))),
        }
    }
}

/// Status of a page in the hybrid log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// Page is not allocated
    NotAllocated,
    /// Page is in memory and mutable
    InMemory,
    /// Page is being flushed to disk
    Flushing,
    /// Page has been flushed to disk
    OnDisk,
}

/// Record stored in the hybrid log
/// This is the serialized form that gets written to the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Record header with metadata
    pub header: RecordInfo,
    /// The key (variable length)
    pub key: Key,
    /// The value (variable length)
    pub value: Value,
}

impl LogRecord {
    pub fn new(key: Key, value: Value, previous_address: Address) -> Self {
        Self {
            header: RecordInfo::new(previous_address, 0, true, false, false),
            key,
            value,
        }
    }

    /// Create a tombstone record for deletion
    pub fn tombstone(key: Key, previous_address: Address) -> Self {
        Self {
            header: RecordInfo::new(previous_address, 0, true, true, false),
            key,
            value: Vec::new(),
        }
    }
}

const LENGTH_PREFIX_BYTES: usize = 4;

fn encode_record(record: &LogRecord) -> Result<Vec<u8>> {
    let payload = bincode::serialize(record)?;
    let mut framed = Vec::with_capacity(LENGTH_PREFIX_BYTES + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    framed.extend_from_slice(&payload);
    Ok(framed)
}

/// Decode a record from a byte span that starts exactly at a record boundary.
/// Returns the record plus the number of bytes it and its length prefix
/// occupy, or `None` if the span starts at unused (zeroed) space, meaning
/// the scan has hit the skip-padding at the tail of a page.
fn decode_record(data: &[u8]) -> Result<Option<(LogRecord, u32)>> {
    if data.len() < LENGTH_PREFIX_BYTES {
        return Ok(None);
    }
    let len = u32::from_le_bytes(data[..LENGTH_PREFIX_BYTES].try_into().unwrap());
    if len == 0 {
        return Ok(None);
    }
    let end = LENGTH_PREFIX_BYTES + len as usize;
    if end > data.len() {
        return Ok(None);
    }
    let record: LogRecord = bincode::deserialize(&data[LENGTH_PREFIX_BYTES..end])?;
    Ok(Some((record, end as u32)))
}

/// Buffering strategy used by a [`LogIterator`] while it reads the in-memory
/// portion of the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferingMode {
    /// Touch only the page the iterator is currently on.
    SinglePage,
    /// Eagerly clone the next page's bytes once the current page is opened.
    DoublePage,
    /// Re-read the owning page on every record (no caching at all).
    NoBuffering,
}

/// Event delivered to the read-only transition observer: every record in
/// `[start, end)` just became immutable.
#[derive(Debug, Clone, Copy)]
pub struct ReadOnlyEvent {
    pub start: Address,
    pub end: Address,
}

/// Event delivered to the eviction observer: every record in `[start, end)`
/// was just evicted from memory.
#[derive(Debug, Clone, Copy)]
pub struct EvictionEvent {
    pub start: Address,
    pub end: Address,
}

type ReadOnlyObserver = Box<dyn Fn(ReadOnlyEvent) + Send + Sync>;
type EvictionObserver = Box<dyn Fn(EvictionEvent) + Send + Sync>;

/// The Hybrid Log - core storage engine inspired by FASTER
pub struct HybridLog {
    /// In-memory circular buffer of pages
    pages: Vec<RwLock<Option<Box<[u8]>>>>,

    /// Page status tracking
    page_status: Vec<RwLock<PageStatus>>,

    /// Size of the circular buffer (number of pages)
    buffer_size: u32,

    /// Number of pages at the tail end of the ring permanently kept empty,
    /// reducing effective capacity.
    empty_page_count: AtomicU64,

    // Six canonical address cursors. All monotone, all CAS-updated.
    begin_address: AtomicU64,
    safe_head_address: AtomicU64,
    head_address: AtomicU64,
    safe_read_only_address: AtomicU64,
    read_only_address: AtomicU64,
    tail_page_offset: AtomicPageOffset,

    /// Address that has been flushed to disk
    flushed_until_address: AtomicU64,

    /// Epoch manager for safe memory reclamation
    epoch: SharedEpochManager,

    /// Storage device for persistence
    storage: Arc<Mutex<Box<dyn StorageDevice + Send + Sync>>>,

    /// At-most-one observer for read-only transitions
    read_only_observer: Mutex<Option<ReadOnlyObserver>>,

    /// At-most-one observer for eviction
    eviction_observer: Mutex<Option<EvictionObserver>>,

    /// Set once DisposeFromMemory has run; further operations fail fast.
    closed: AtomicBool,
}

impl HybridLog {
    /// Create a new hybrid log instance
    pub fn new(
        memory_size: u64,
        storage_device: Box<dyn StorageDevice + Send + Sync>,
        epoch: SharedEpochManager,
    ) -> Result<Self> {
        let buffer_size = (memory_size / PAGE_SIZE as u64) as u32;
        if buffer_size == 0 {
            return Err(RsKvError::Configuration {
                message: "Memory size too small for at least one page".to_string(),
            });
        }

        let mut pages = Vec::with_capacity(buffer_size as usize);
        let mut page_status = Vec::with_capacity(buffer_size as usize);

        for _ in 0..buffer_size {
            pages.push(RwLock::new(None));
            page_status.push(RwLock::new(PageStatus::NotAllocated));
        }

        // Skip the invalid address page, same as FASTER.
        let start_address = PAGE_SIZE as u64;

        let hlog = Self {
            pages,
            page_status,
            buffer_size,
            empty_page_count: AtomicU64::new(0),
            begin_address: AtomicU64::new(start_address),
            safe_head_address: AtomicU64::new(start_address),
            head_address: AtomicU64::new(start_address),
            safe_read_only_address: AtomicU64::new(start_address),
            read_only_address: AtomicU64::new(start_address),
            tail_page_offset: AtomicPageOffset::new(get_page(start_address), get_offset(start_address)),
            flushed_until_address: AtomicU64::new(start_address),
            epoch,
            storage: Arc::new(Mutex::new(storage_device)),
            read_only_observer: Mutex::new(None),
            eviction_observer: Mutex::new(None),
            closed: AtomicBool::new(false),
        };

        hlog.allocate_page(get_page(start_address))?;

        Ok(hlog)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RsKvError::AllocatorClosed);
        }
        Ok(())
    }

    /// Allocate space in the log for a record of given size
    pub fn allocate(&self, size: u32) -> Result<Address> {
        self.check_open()?;
        if size == 0 || size > PAGE_SIZE {
            return Err(RsKvError::AllocationFailed { size });
        }

        loop {
            let (old_page, old_offset) = self.tail_page_offset.reserve(size);
            let new_offset = old_offset + size;

            if new_offset <= PAGE_SIZE {
                let address = make_address(old_page, old_offset);
                self.allocate_page(old_page)?;
                return Ok(address);
            } else {
                let new_page = old_page + 1;
                if new_page > u32::MAX - 1 {
                    return Err(RsKvError::AllocationFailed { size });
                }

                if self
                    .tail_page_offset
                    .compare_exchange(old_page, new_offset, new_page, size)
                    .is_ok()
                {
                    self.allocate_page(new_page)?;
                    return Ok(make_address(new_page, 0));
                }
                // CAS failed, retry the allocation.
            }
        }
    }

    /// Get a pointer to data at the specified address, if currently in memory.
    pub fn get(&self, address: Address) -> Option<Box<[u8]>> {
        let page = get_page(address);
        let offset = get_offset(address);

        let page_index = (page % self.buffer_size) as usize;
        let page_guard = self.pages[page_index].read();

        if let Some(ref page_data) = *page_guard
            && (offset as usize) < page_data.len()
        {
            return Some(page_data[offset as usize..].into());
        }

        None
    }

    /// Write data to the log at the specified address
    pub fn write(&self, address: Address, data: &[u8]) -> Result<()> {
        let page = get_page(address);
        let offset = get_offset(address);

        if offset as usize + data.len() > PAGE_SIZE as usize {
            return Err(RsKvError::AllocationFailed {
                size: data.len() as u32,
            });
        }

        let page_index = (page % self.buffer_size) as usize;
        let mut page_guard = self.pages[page_index].write();

        if let Some(ref mut page_data) = *page_guard {
            let start = offset as usize;
            let end = start + data.len();

            if end <= page_data.len() {
                page_data[start..end].copy_from_slice(data);
                return Ok(());
            }
        }

        Err(RsKvError::AddressOutOfBounds { address })
    }

    /// Insert a record into the log, returning the address it was written at.
    pub fn insert_record(&self, record: LogRecord) -> Result<Address> {
        let framed = encode_record(&record)?;
        let size = framed.len() as u32;

        let address = self.allocate(size)?;
        self.write(address, &framed)?;

        Ok(address)
    }

    /// Read a record from the log.
    pub fn read_record(&self, address: Address) -> Result<LogRecord> {
        self.read_record_with_len(address).map(|(record, _)| record)
    }

    /// Read a record plus its on-wire length, from memory if present,
    /// falling back to the device otherwise.
    fn read_record_with_len(&self, address: Address) -> Result<(LogRecord, u32)> {
        if let Some(data) = self.get(address)
            && let Some(decoded) = decode_record(&data)?
        {
            return Ok(decoded);
        }

        self.read_record_from_disk(address)
    }

    /// Read a record from disk storage
    fn read_record_from_disk(&self, address: Address) -> Result<(LogRecord, u32)> {
        const INITIAL_READ_SIZE: usize = 1024;
        const MAX_RECORD_SIZE: usize = 64 * 1024;

        let storage = self.storage.lock();
        let mut buffer = vec![0u8; INITIAL_READ_SIZE];

        let bytes_read = storage.read(address, &mut buffer)?;
        if bytes_read == 0 {
            return Err(RsKvError::AddressOutOfBounds { address });
        }

        match decode_record(&buffer[..bytes_read])? {
            Some(decoded) => Ok(decoded),
            None => {
                let mut large_buffer = vec![0u8; MAX_RECORD_SIZE];
                let large_bytes_read = storage.read(address, &mut large_buffer)?;
                if large_bytes_read == 0 {
                    return Err(RsKvError::AddressOutOfBounds { address });
                }
                decode_record(&large_buffer[..large_bytes_read])?
                    .ok_or(RsKvError::AddressOutOfBounds { address })
            }
        }
    }

    /// Allocate a page in the buffer (no-op if already allocated)
    fn allocate_page(&self, page: u32) -> Result<()> {
        let page_index = (page % self.buffer_size) as usize;

        let mut page_guard = self.pages[page_index].write();
        if page_guard.is_none() {
            let page_data = vec![0u8; PAGE_SIZE as usize].into_boxed_slice();
            *page_guard = Some(page_data);

            let mut status_guard = self.page_status[page_index].write();
            *status_guard = PageStatus::InMemory;
        }

        Ok(())
    }

    // ---- address cursor accessors ----

    pub fn get_tail_address(&self) -> Address {
        let (page, offset) = self.tail_page_offset.load();
        make_address(page, offset)
    }

    pub fn get_begin_address(&self) -> Address {
        self.begin_address.load(Ordering::Acquire)
    }

    pub fn get_safe_head_address(&self) -> Address {
        self.safe_head_address.load(Ordering::Acquire)
    }

    pub fn get_head_address(&self) -> Address {
        self.head_address.load(Ordering::Acquire)
    }

    pub fn get_safe_read_only_address(&self) -> Address {
        self.safe_read_only_address.load(Ordering::Acquire)
    }

    pub fn get_read_only_address(&self) -> Address {
        self.read_only_address.load(Ordering::Acquire)
    }

    pub fn get_flushed_until_address(&self) -> Address {
        self.flushed_until_address.load(Ordering::Acquire)
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn empty_page_count(&self) -> u64 {
        self.empty_page_count.load(Ordering::Acquire)
    }

    /// Set the number of ring slots permanently held empty. A request at or
    /// above `buffer_size` is clamped to `buffer_size - 1`: leaving at least
    /// one usable page is load-bearing for the allocator, so this cannot be
    /// an error condition a caller needs to special-case.
    pub fn set_empty_page_count(&self, count: u64) {
        let clamped = count.min(self.buffer_size as u64 - 1);
        self.empty_page_count.store(clamped, Ordering::Release);
    }

    // ---- observers ----

    /// Install the read-only transition observer, replacing any existing one.
    pub fn subscribe_read_only<F>(&self, observer: F)
    where
        F: Fn(ReadOnlyEvent) + Send + Sync + 'static,
    {
        *self.read_only_observer.lock() = Some(Box::new(observer));
    }

    pub fn unsubscribe_read_only(&self) {
        *self.read_only_observer.lock() = None;
    }

    /// Install the eviction observer, replacing any existing one.
    pub fn subscribe_evictions<F>(&self, observer: F)
    where
        F: Fn(EvictionEvent) + Send + Sync + 'static,
    {
        *self.eviction_observer.lock() = Some(Box::new(observer));
    }

    pub fn unsubscribe_evictions(&self) {
        *self.eviction_observer.lock() = None;
    }

    // ---- region shifts ----

    /// Raise `BeginAddress`. Rounds down to a page boundary when
    /// `snap_to_page_start` is set. A no-op (never an error) if `new_begin`
    /// does not advance the cursor.
    pub fn shift_begin_address(&self, new_begin: Address, snap_to_page_start: bool) -> Address {
        let new_begin = if snap_to_page_start {
            new_begin & !(PAGE_SIZE as u64 - 1)
        } else {
            new_begin
        };

        let mut current = self.begin_address.load(Ordering::Acquire);
        loop {
            if new_begin <= current {
                return current;
            }
            match self.begin_address.compare_exchange(
                current,
                new_begin,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return new_begin,
                Err(actual) => current = actual,
            }
        }
    }

    /// Raise `ReadOnlyAddress` to `new_ro` (a no-op if it does not advance).
    /// Schedules an epoch-bump callback that, once every writer active
    /// before the call has drained, flushes the newly-immutable range,
    /// advances `SafeReadOnlyAddress`, and fires the read-only observer.
    pub fn shift_read_only_address(self: &Arc<Self>, new_ro: Address) -> Address {
        let old_ro = self.read_only_address.load(Ordering::Acquire);
        if new_ro <= old_ro {
            return old_ro;
        }
        if self
            .read_only_address
            .compare_exchange(old_ro, new_ro, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return self.read_only_address.load(Ordering::Acquire);
        }

        let this = self.clone();
        self.epoch.bump_current_epoch(move || {
            this.complete_read_only_shift(old_ro, new_ro);
        });

        new_ro
    }

    fn complete_read_only_shift(self: &Arc<Self>, old_ro: Address, new_ro: Address) {
        let start_page = get_page(old_ro);
        let end_page = get_page(new_ro.saturating_sub(1).max(old_ro));
        for page in start_page..=end_page {
            if let Err(e) = self.flush_page_sync(page) {
                log::warn!("failed to flush page {page} during read-only shift: {e}");
            }
        }
        self.flushed_until_address
            .fetch_max(new_ro, Ordering::AcqRel);
        self.safe_read_only_address
            .fetch_max(new_ro, Ordering::AcqRel);

        if let Some(observer) = self.read_only_observer.lock().as_ref() {
            observer(ReadOnlyEvent {
                start: old_ro,
                end: new_ro,
            });
        }
    }

    fn flush_page_sync(&self, page: u32) -> Result<()> {
        let page_index = (page % self.buffer_size) as usize;
        let page_data = {
            let page_guard = self.pages[page_index].read();
            let status_guard = self.page_status[page_index].read();
            if *status_guard != PageStatus::InMemory {
                return Ok(());
            }
            match *page_guard {
                Some(ref data) => data.clone(),
                None => return Ok(()),
            }
        };

        let disk_offset = (page as u64) * (PAGE_SIZE as u64);
        {
            let mut storage = self.storage.lock();
            storage.write(disk_offset, &page_data)?;
            storage.flush()?;
        }

        let mut status_guard = self.page_status[page_index].write();
        if *status_guard == PageStatus::InMemory {
            *status_guard = PageStatus::Flushing;
        }
        Ok(())
    }

    /// Raise `HeadAddress` to `new_head`. Precondition: the caller is
    /// responsible for ensuring `FlushedUntilAddress >= new_head` (the log
    /// accessor enforces this by shifting read-only first). Schedules an
    /// epoch-bump callback that advances `SafeHeadAddress`, evicts the
    /// now-closed pages, and fires the eviction observer.
    pub fn shift_head_address(self: &Arc<Self>, new_head: Address) -> Result<Address> {
        if self.get_flushed_until_address() < new_head {
            return Err(RsKvError::Internal {
                message: "shift_head_address requires the range to already be flushed"
                    .to_string(),
            });
        }

        let old_head = self.head_address.load(Ordering::Acquire);
        if new_head <= old_head {
            return Ok(old_head);
        }
        if self
            .head_address
            .compare_exchange(old_head, new_head, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(self.head_address.load(Ordering::Acquire));
        }

        let this = self.clone();
        self.epoch.bump_current_epoch(move || {
            this.complete_head_shift(old_head, new_head);
        });

        Ok(new_head)
    }

    fn complete_head_shift(self: &Arc<Self>, old_head: Address, new_head: Address) {
        let old_head_page = get_page(old_head);
        let new_head_page = get_page(new_head);
        for page in old_head_page..new_head_page {
            self.evict_page(page);
        }
        self.safe_head_address
            .fetch_max(new_head, Ordering::AcqRel);

        if let Some(observer) = self.eviction_observer.lock().as_ref() {
            observer(EvictionEvent {
                start: old_head,
                end: new_head,
            });
        }
    }

    fn evict_page(&self, page: u32) {
        let page_index = (page % self.buffer_size) as usize;
        let mut page_guard = self.pages[page_index].write();
        let mut status_guard = self.page_status[page_index].write();

        if *status_guard == PageStatus::InMemory || *status_guard == PageStatus::Flushing {
            *page_guard = None;
            *status_guard = PageStatus::OnDisk;
            log::trace!("evicted page {page} from memory");
        }
    }

    /// Release all in-memory pages. Any subsequent allocator operation fails
    /// with [`RsKvError::AllocatorClosed`].
    pub fn dispose_from_memory(&self) {
        self.closed.store(true, Ordering::Release);
        for page in &self.pages {
            *page.write() = None;
        }
        for status in &self.page_status {
            *status.write() = PageStatus::NotAllocated;
        }
    }

    /// Flush every page in `[FlushedUntilAddress, until_address)`.
    pub fn flush_sync(&self, until_address: Address) -> Result<()> {
        let current_flushed = self.flushed_until_address.load(Ordering::Acquire);

        if until_address <= current_flushed {
            return Ok(());
        }

        let start_page = get_page(current_flushed);
        let end_page = get_page(until_address);

        for page in start_page..=end_page {
            self.flush_page_sync(page)?;
        }

        self.flushed_until_address
            .fetch_max(until_address, Ordering::AcqRel);

        {
            let mut storage = self.storage.lock();
            storage.flush()?;
        }

        Ok(())
    }

    /// Async wrapper around [`flush_sync`](Self::flush_sync) for callers
    /// (checkpointing, background tasks) that already run on the tokio
    /// executor.
    pub async fn flush_to_disk(&self, until_address: Address) -> Result<()> {
        self.flush_sync(until_address)
    }

    /// Create a record iterator over `[begin, end)`.
    ///
    /// When `allow_mutable` is false (the default for compaction and plain
    /// scans) the iterator stops at `SafeReadOnlyAddress` even if `end` asks
    /// for more, since records at or above that boundary may still change
    /// underneath the reader.
    pub fn scan(self: &Arc<Self>, begin: Address, end: Address, mode: BufferingMode) -> LogIterator {
        LogIterator::new(self.clone(), begin, end, mode, false)
    }

    /// Like [`scan`](Self::scan), but permitted to read past
    /// `SafeReadOnlyAddress` into the mutable region.
    pub fn scan_allow_mutable(
        self: &Arc<Self>,
        begin: Address,
        end: Address,
        mode: BufferingMode,
    ) -> LogIterator {
        LogIterator::new(self.clone(), begin, end, mode, true)
    }
}

/// State of a [`LogIterator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IteratorState {
    Initial,
    Buffered,
    Exhausted,
}

/// A lazy, non-restartable, finite iterator over `[begin, end)` that never
/// splits a record across a page boundary and stops exactly once the next
/// candidate address would be at or past `end` (or past the safely-immutable
/// boundary, unless `allow_mutable` was requested).
pub struct LogIterator {
    hlog: Arc<HybridLog>,
    end: Address,
    allow_mutable: bool,
    mode: BufferingMode,
    state: IteratorState,
    next_address: Address,
    current_address: Address,
    current_record: Option<LogRecord>,
}

impl LogIterator {
    fn new(
        hlog: Arc<HybridLog>,
        begin: Address,
        end: Address,
        mode: BufferingMode,
        allow_mutable: bool,
    ) -> Self {
        Self {
            hlog,
            end,
            allow_mutable,
            mode,
            state: IteratorState::Initial,
            next_address: begin,
            current_address: begin,
            current_record: None,
        }
    }

    fn read_only_ceiling(&self) -> Address {
        if self.allow_mutable {
            self.end
        } else {
            self.end.min(self.hlog.get_safe_read_only_address())
        }
    }

    /// Advance to the next live record. Returns `false` once the range or the
    /// readable boundary is exhausted; subsequent calls keep returning
    /// `false`.
    pub fn get_next(&mut self) -> Result<bool> {
        if self.state == IteratorState::Exhausted {
            return Ok(false);
        }

        let ceiling = self.read_only_ceiling();

        loop {
            if self.next_address >= ceiling {
                self.state = IteratorState::Exhausted;
                self.current_record = None;
                return Ok(false);
            }

            let address = self.next_address;
            let record_bytes = match self.mode {
                BufferingMode::NoBuffering => self.hlog.get(address),
                _ => self.hlog.get(address),
            };

            let decoded = match record_bytes {
                Some(data) => decode_record(&data)?,
                None => {
                    // Fallen out of memory (below HeadAddress); fall back to disk.
                    Some(self.hlog.read_record_from_disk(address)?)
                }
            };

            match decoded {
                Some((record, consumed)) => {
                    self.current_address = address;
                    self.next_address = address + consumed as u64;
                    if record.header.invalid {
                        continue;
                    }
                    self.current_record = Some(record);
                    self.state = IteratorState::Buffered;
                    return Ok(true);
                }
                None => {
                    // Skip-padding: nothing more on this page, jump to the next.
                    let page = get_page(address);
                    let next_page_start = make_address(page + 1, 0);
                    if next_page_start <= self.next_address {
                        self.state = IteratorState::Exhausted;
                        self.current_record = None;
                        return Ok(false);
                    }
                    self.next_address = next_page_start;
                }
            }
        }
    }

    /// Address of the record last returned by [`get_next`](Self::get_next).
    pub fn current_address(&self) -> Address {
        self.current_address
    }

    /// Address immediately past the record last returned; always a record
    /// boundary, and the address a new scan should resume from.
    pub fn next_address(&self) -> Address {
        self.next_address
    }

    pub fn current_key(&self) -> Option<&Key> {
        self.current_record.as_ref().map(|r| &r.key)
    }

    pub fn current_value(&self) -> Option<&Value> {
        self.current_record.as_ref().map(|r| &r.value)
    }

    pub fn current_record_info(&self) -> Option<&RecordInfo> {
        self.current_record.as_ref().map(|r| &r.header)
    }
}

/// Memory-mapped storage device for high-performance large file access
pub struct MmapStorageDevice {
    file: File,
    mmap: Option<MmapMut>,
    #[allow(dead_code)]
    path: PathBuf,
    size: u64,
    dirty: bool,
}

impl MmapStorageDevice {
    /// Create a new memory-mapped storage device
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let metadata = file.metadata()?;
        let size = metadata.len();

        let mut device = Self {
            file,
            mmap: None,
            path,
            size,
            dirty: false,
        };

        if size > 0 {
            device.init_mmap()?;
        }

        Ok(device)
    }

    fn init_mmap(&mut self) -> Result<()> {
        if self.size > 0 {
            let mmap = unsafe {
                MmapOptions::new()
                    .len(self.size as usize)
                    .map_mut(&self.file)?
            };
            self.mmap = Some(mmap);
        }
        Ok(())
    }

    fn resize_and_remap(&mut self, new_size: u64) -> Result<()> {
        if new_size != self.size {
            self.mmap = None;
            self.file.set_len(new_size)?;
            self.size = new_size;
            if new_size > 0 {
                self.init_mmap()?;
            }
        }
        Ok(())
    }

    fn ensure_capacity(&mut self, offset: u64, len: usize) -> Result<()> {
        let required_size = offset + len as u64;
        if required_size > self.size {
            const GROWTH_CHUNK: u64 = 64 * 1024 * 1024;
            let new_size = required_size.div_ceil(GROWTH_CHUNK) * GROWTH_CHUNK;
            self.resize_and_remap(new_size)?;
        }
        Ok(())
    }
}

impl StorageDevice for MmapStorageDevice {
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.ensure_capacity(offset, data.len())?;

        if let Some(ref mut mmap) = self.mmap {
            let start = offset as usize;
            let end = start + data.len();

            if end <= mmap.len() {
                mmap[start..end].copy_from_slice(data);
                self.dirty = true;
                return Ok(());
            }
        }

        use std::io::{Seek, SeekFrom, Write};
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if let Some(ref mmap) = self.mmap {
            let start = offset as usize;
            let len = buf.len().min(mmap.len().saturating_sub(start));

            if len > 0 {
                buf[..len].copy_from_slice(&mmap[start..start + len]);
                return Ok(len);
            }
        }

        use std::io::{Read, Seek, SeekFrom};
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        Ok(file.read(buf)?)
    }

    fn flush(&mut self) -> Result<()> {
        if self.dirty {
            if let Some(ref mut mmap) = self.mmap {
                mmap.flush()?;
            }
            self.file.sync_all()?;
            self.dirty = false;
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        self.resize_and_remap(size)?;
        Ok(())
    }

    fn supports_mmap(&self) -> bool {
        true
    }

    fn get_mmap(&mut self, offset: u64, len: usize) -> Result<Option<&mut [u8]>> {
        self.ensure_capacity(offset, len)?;

        if let Some(ref mut mmap) = self.mmap {
            let start = offset as usize;
            let end = start + len;

            if end <= mmap.len() {
                return Ok(Some(&mut mmap[start..end]));
            }
        }

        Ok(None)
    }
}

impl Drop for MmapStorageDevice {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
