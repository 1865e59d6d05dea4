//! Epoch-based protection for rskv
//!
//! This module implements the grace-period primitive the hybrid log relies on to
//! serialize address-region shifts with concurrent readers and writers. It is
//! inspired by FASTER's light_epoch.h design, but unlike the rest of this codebase
//! it does not wrap crossbeam-epoch: the contract needed here (explicit protect /
//! suspend / bump-with-drain-action / protect-and-drain, with reentrant protection
//! depth) is not something crossbeam-epoch's automatic pin/Guard model exposes.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

/// Fixed capacity of the per-thread protection table, matching FASTER's
/// kTableSize for the epoch protection table.
const TABLE_SIZE: usize = 128;

/// Soft bound on the number of outstanding drain actions. Bumping the epoch
/// past this triggers an eager drain attempt before the new action is queued.
const DRAIN_QUEUE_CAPACITY: usize = 64;

const UNPROTECTED: u64 = 0;

struct DrainAction {
    trigger_epoch: u64,
    action: Box<dyn FnOnce() + Send>,
}

struct ThreadSlot {
    index: usize,
    depth: usize,
}

thread_local! {
    // Keyed by the owning EpochManager's address so one thread can hold slots
    // in several independent managers (as tests routinely do).
    static THREAD_SLOTS: RefCell<HashMap<usize, ThreadSlot>> = RefCell::new(HashMap::new());
}

/// A grace-period epoch manager.
///
/// Every thread that mutates the hybrid log's address cursors must call
/// [`EpochManager::protect`] first and [`EpochManager::suspend`] when done.
/// [`EpochManager::bump_current_epoch`] advances the global epoch and defers
/// `action` until every thread that was protected in the prior epoch has
/// suspended or re-protected at a newer one.
pub struct EpochManager {
    current_epoch: AtomicU64,
    table: Vec<AtomicU64>,
    slot_in_use: Vec<AtomicBool>,
    drain_actions: Mutex<VecDeque<DrainAction>>,
}

impl EpochManager {
    pub fn new() -> Self {
        let mut table = Vec::with_capacity(TABLE_SIZE);
        let mut slot_in_use = Vec::with_capacity(TABLE_SIZE);
        for _ in 0..TABLE_SIZE {
            table.push(AtomicU64::new(UNPROTECTED));
            slot_in_use.push(AtomicBool::new(false));
        }

        Self {
            current_epoch: AtomicU64::new(1),
            table,
            slot_in_use,
            drain_actions: Mutex::new(VecDeque::new()),
        }
    }

    fn manager_key(&self) -> usize {
        self as *const _ as usize
    }

    fn slot_for_current_thread(&self) -> usize {
        let key = self.manager_key();
        THREAD_SLOTS.with(|slots| {
            let mut slots = slots.borrow_mut();
            if let Some(slot) = slots.get(&key) {
                return slot.index;
            }
            let index = self.acquire_slot();
            slots.insert(key, ThreadSlot { index, depth: 0 });
            index
        })
    }

    fn acquire_slot(&self) -> usize {
        for (index, in_use) in self.slot_in_use.iter().enumerate() {
            if in_use
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return index;
            }
        }
        panic!("epoch protection table exhausted ({TABLE_SIZE} threads)");
    }

    /// True if the calling thread already holds protection on this manager.
    /// The log accessor consults this before wrapping a call in
    /// protect/suspend, so re-entrant calls do not double-protect.
    pub fn this_instance_protected(&self) -> bool {
        let key = self.manager_key();
        THREAD_SLOTS.with(|slots| {
            slots
                .borrow()
                .get(&key)
                .map(|slot| slot.depth > 0)
                .unwrap_or(false)
        })
    }

    /// Mark the current thread active in the current epoch. Reentrant: nested
    /// calls only increment a depth counter, and the table entry is written
    /// once, on the outermost call.
    pub fn protect(&self) {
        let index = self.slot_for_current_thread();
        let key = self.manager_key();
        let entering = THREAD_SLOTS.with(|slots| {
            let mut slots = slots.borrow_mut();
            let slot = slots.get_mut(&key).expect("slot just registered");
            slot.depth += 1;
            slot.depth == 1
        });
        if entering {
            let epoch = self.current_epoch.load(Ordering::Acquire);
            self.table[index].store(epoch, Ordering::Release);
        }
    }

    /// Mark the current thread inactive, balancing a prior [`protect`] call.
    /// Only the outermost suspend actually clears the table entry and
    /// attempts a drain pass.
    pub fn suspend(&self) {
        let index = self.slot_for_current_thread();
        let key = self.manager_key();
        let leaving = THREAD_SLOTS.with(|slots| {
            let mut slots = slots.borrow_mut();
            let slot = slots.get_mut(&key).expect("suspend without protect");
            assert!(slot.depth > 0, "suspend without matching protect");
            slot.depth -= 1;
            slot.depth == 0
        });
        if leaving {
            self.table[index].store(UNPROTECTED, Ordering::Release);
            self.try_drain();
        }
    }

    /// Advance the global epoch and schedule `action` to run once every
    /// thread that was protected in the epoch just ended has drained past it.
    /// Returns the new current epoch.
    pub fn bump_current_epoch<F>(&self, action: F) -> u64
    where
        F: FnOnce() + Send + 'static,
    {
        if self.drain_actions.lock().len() >= DRAIN_QUEUE_CAPACITY {
            self.try_drain();
        }

        let prior_epoch = self.current_epoch.fetch_add(1, Ordering::AcqRel);
        self.drain_actions.lock().push_back(DrainAction {
            trigger_epoch: prior_epoch,
            action: Box::new(action),
        });
        self.try_drain();
        prior_epoch + 1
    }

    /// Equivalent to suspend+protect, but guarantees a drain pass runs even
    /// if the calling thread stays protected throughout (so it never blocks
    /// waiting on its own protection to clear).
    pub fn protect_and_drain(&self) {
        let index = self.slot_for_current_thread();
        let epoch = self.current_epoch.load(Ordering::Acquire);
        self.table[index].store(epoch, Ordering::Release);
        self.try_drain();
    }

    /// The epoch every currently-protected thread is at or past.
    fn minimum_protected_epoch(&self) -> Option<u64> {
        let mut min = None;
        for (index, in_use) in self.slot_in_use.iter().enumerate() {
            if !in_use.load(Ordering::Acquire) {
                continue;
            }
            let epoch = self.table[index].load(Ordering::Acquire);
            if epoch == UNPROTECTED {
                continue;
            }
            min = Some(min.map_or(epoch, |m: u64| m.min(epoch)));
        }
        min
    }

    fn try_drain(&self) {
        let threshold = self.minimum_protected_epoch();
        let mut actions = self.drain_actions.lock();
        loop {
            let ready = match actions.front() {
                Some(a) => match threshold {
                    Some(min) => a.trigger_epoch < min,
                    None => true,
                },
                None => false,
            };
            if !ready {
                break;
            }
            let action = actions.pop_front().expect("checked non-empty above");
            drop(actions);
            (action.action)();
            actions = self.drain_actions.lock();
        }
    }
}

impl Default for EpochManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared epoch manager handle.
pub type SharedEpochManager = Arc<EpochManager>;

/// RAII protection guard: protects on construction, suspends on drop.
pub struct EpochGuard<'a> {
    manager: &'a EpochManager,
}

impl<'a> EpochGuard<'a> {
    pub fn new(manager: &'a EpochManager) -> Self {
        manager.protect();
        Self { manager }
    }
}

impl Drop for EpochGuard<'_> {
    fn drop(&mut self) {
        self.manager.suspend();
    }
}
