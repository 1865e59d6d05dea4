//! Background task management for rskv
//!
//! This module implements background tasks for automatic checkpointing and
//! log maintenance: advancing the read-only/head boundaries and running
//! compaction once enough space sits behind `BeginAddress`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock as AsyncRwLock;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::checkpoint::CheckpointState;
use crate::common::{Config, Result, RsKvError};
use crate::compaction::{self, CompactionType};
use crate::epoch::SharedEpochManager;
use crate::hlog::HybridLog;
use crate::index::SharedMemHashIndex;
use crate::log_accessor::LogAccessor;

/// Background task manager for automatic maintenance operations
pub struct BackgroundTaskManager {
    /// Whether background tasks are running
    running: Arc<AtomicBool>,

    /// Configuration
    config: Config,

    /// Reference to checkpoint state
    checkpoint_state: Arc<CheckpointState>,

    /// Reference to hybrid log
    hlog: Arc<HybridLog>,

    /// Hash index, needed by the compaction task
    index: SharedMemHashIndex,

    /// Epoch manager, needed by the compaction task
    epoch: SharedEpochManager,

    /// Synchronous log accessor used by the maintenance and compaction tasks
    log_accessor: Arc<LogAccessor>,

    /// Lock to coordinate with manual operations
    operation_lock: Arc<AsyncRwLock<()>>,

    /// Task handles for cleanup
    task_handles: parking_lot::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

/// Once the disk-resident (retired-but-not-yet-compacted) region exceeds
/// this size, the compaction task kicks in.
const COMPACTION_TRIGGER_SIZE: u64 = 256 * 1024 * 1024;

/// Mutable region size threshold that triggers a read-only shift.
const MAX_MUTABLE_REGION_SIZE: u64 = 128 * 1024 * 1024;

/// Read-only region size threshold that triggers a head shift (eviction).
const MAX_READ_ONLY_REGION_SIZE: u64 = 256 * 1024 * 1024;

impl BackgroundTaskManager {
    /// Create a new background task manager
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        checkpoint_state: Arc<CheckpointState>,
        hlog: Arc<HybridLog>,
        index: SharedMemHashIndex,
        epoch: SharedEpochManager,
        log_accessor: Arc<LogAccessor>,
        operation_lock: Arc<AsyncRwLock<()>>,
    ) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            config,
            checkpoint_state,
            hlog,
            index,
            epoch,
            log_accessor,
            operation_lock,
            task_handles: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Start all background tasks
    pub fn start(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RsKvError::Internal {
                message: "Background tasks are already running".to_string(),
            });
        }

        log::info!("Starting background task manager");

        let mut handles = self.task_handles.lock();

        if self.config.enable_checkpointing {
            let handle = self.start_checkpoint_task();
            handles.push(handle);
        }

        if self.config.enable_gc {
            let handle = self.start_compaction_task();
            handles.push(handle);
        }

        let handle = self.start_log_maintenance_task();
        handles.push(handle);

        log::info!("Started {} background tasks", handles.len());
        Ok(())
    }

    /// Stop all background tasks
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(()); // Already stopped
        }

        log::info!("Stopping background tasks");

        let handles = {
            let mut handles = self.task_handles.lock();
            std::mem::take(&mut *handles)
        };

        for handle in handles {
            handle.abort();
            let _ = handle.await; // Ignore cancellation errors
        }

        log::info!("All background tasks stopped");
        Ok(())
    }

    /// Check if background tasks are running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn start_checkpoint_task(&self) -> tokio::task::JoinHandle<()> {
        let running = self.running.clone();
        let checkpoint_state = self.checkpoint_state.clone();
        let operation_lock = self.operation_lock.clone();
        let interval_ms = self.config.checkpoint_interval_ms;

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_millis(interval_ms));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            log::info!("Checkpoint task started with interval {interval_ms}ms");

            while running.load(Ordering::Acquire) {
                interval.tick().await;

                if !running.load(Ordering::Acquire) {
                    break;
                }

                if let Ok(_lock) = operation_lock.try_write() {
                    match checkpoint_state.initiate_checkpoint().await {
                        Ok(metadata) => {
                            log::debug!(
                                "Background checkpoint {} completed",
                                metadata.checkpoint_id
                            );
                        }
                        Err(e) => {
                            log::warn!("Background checkpoint failed: {e}");
                        }
                    }
                } else {
                    log::debug!("Skipping checkpoint - manual operation in progress");
                }
            }

            log::info!("Checkpoint task stopped");
        })
    }

    /// Start the compaction task: reclaims space below `BeginAddress` once
    /// the retired-but-uncompacted region grows past
    /// [`COMPACTION_TRIGGER_SIZE`].
    fn start_compaction_task(&self) -> tokio::task::JoinHandle<()> {
        let running = self.running.clone();
        let hlog = self.hlog.clone();
        let index = self.index.clone();
        let epoch = self.epoch.clone();
        let log_accessor = self.log_accessor.clone();
        let operation_lock = self.operation_lock.clone();
        let interval_ms = self.config.gc_interval_ms;

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_millis(interval_ms));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            log::info!("Compaction task started with interval {interval_ms}ms");

            while running.load(Ordering::Acquire) {
                interval.tick().await;

                if !running.load(Ordering::Acquire) {
                    break;
                }

                let begin = hlog.get_begin_address();
                let safe_ro = hlog.get_safe_read_only_address();
                if safe_ro.saturating_sub(begin) < COMPACTION_TRIGGER_SIZE {
                    log::trace!("compaction not needed");
                    continue;
                }

                if let Ok(_lock) = operation_lock.try_write() {
                    let until = begin + (safe_ro - begin) / 2;
                    match compaction::compact(
                        &hlog,
                        &index,
                        &epoch,
                        until,
                        CompactionType::Lookup,
                        &compaction::CompactionFunctions::default(),
                    ) {
                        Ok(stats) => {
                            log_accessor.truncate(stats.until_address);
                            log::debug!(
                                "Background compaction reclaimed prefix up to 0x{:x} ({} copied of {} scanned)",
                                stats.until_address,
                                stats.copied,
                                stats.scanned
                            );
                        }
                        Err(e) => {
                            log::warn!("Background compaction failed: {e}");
                        }
                    }
                } else {
                    log::debug!("Skipping compaction - manual operation in progress");
                }
            }

            log::info!("Compaction task stopped");
        })
    }

    /// Start the log maintenance task: advances the read-only and head
    /// boundaries as the mutable and read-only regions grow.
    fn start_log_maintenance_task(&self) -> tokio::task::JoinHandle<()> {
        let running = self.running.clone();
        let hlog = self.hlog.clone();
        let log_accessor = self.log_accessor.clone();
        let operation_lock = self.operation_lock.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(30));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            log::info!("Log maintenance task started");

            while running.load(Ordering::Acquire) {
                interval.tick().await;

                if !running.load(Ordering::Acquire) {
                    break;
                }

                if let Ok(_lock) = operation_lock.try_read() {
                    Self::perform_log_maintenance(&hlog, &log_accessor);
                }
            }

            log::info!("Log maintenance task stopped");
        })
    }

    fn perform_log_maintenance(hlog: &HybridLog, log_accessor: &LogAccessor) {
        let tail_address = hlog.get_tail_address();
        let read_only_address = hlog.get_read_only_address();
        let head_address = hlog.get_head_address();

        let mutable_region_size = tail_address.saturating_sub(read_only_address);
        if mutable_region_size > MAX_MUTABLE_REGION_SIZE {
            match log_accessor.shift_read_only_address(tail_address, false) {
                Ok(new_ro) => log::debug!("Advanced read-only address to 0x{new_ro:x}"),
                Err(e) => log::warn!("Failed to advance read-only address: {e}"),
            }
        }

        let read_only_region_size = read_only_address.saturating_sub(head_address);
        if read_only_region_size > MAX_READ_ONLY_REGION_SIZE {
            let new_head = head_address + (read_only_region_size / 2);
            match log_accessor.flush_and_evict(new_head) {
                Ok(address) => log::debug!("Advanced head address to 0x{address:x}"),
                Err(e) => log::warn!("Failed to shift head address during maintenance: {e}"),
            }
        }
    }

    /// Get statistics about background task performance
    pub fn get_stats(&self) -> BackgroundTaskStats {
        BackgroundTaskStats {
            is_running: self.is_running(),
            checkpoint_enabled: self.config.enable_checkpointing,
            gc_enabled: self.config.enable_gc,
            checkpoint_interval_ms: self.config.checkpoint_interval_ms,
            gc_interval_ms: self.config.gc_interval_ms,
            active_task_count: self.task_handles.lock().len(),
        }
    }
}

impl Drop for BackgroundTaskManager {
    fn drop(&mut self) {
        let running = self.running.clone();
        let handles = {
            let mut handles = self.task_handles.lock();
            std::mem::take(&mut *handles)
        };

        if running.swap(false, Ordering::AcqRel) {
            for handle in handles {
                handle.abort();
            }
        }
    }
}

/// Statistics about background task performance
#[derive(Debug, Clone)]
pub struct BackgroundTaskStats {
    /// Whether background tasks are currently running
    pub is_running: bool,
    /// Whether checkpointing is enabled
    pub checkpoint_enabled: bool,
    /// Whether the compaction task is enabled
    pub gc_enabled: bool,
    /// Checkpoint interval in milliseconds
    pub checkpoint_interval_ms: u64,
    /// Compaction task interval in milliseconds
    pub gc_interval_ms: u64,
    /// Number of active background tasks
    pub active_task_count: usize,
}
