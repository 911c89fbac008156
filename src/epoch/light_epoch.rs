//! LightEpoch - lightweight epoch-based grace periods.
//!
//! Threads *protect* themselves while touching shared log state and
//! *unprotect* when done. A mutator that needs to wait for all concurrent
//! readers bumps the global epoch and registers a deferred completion; the
//! completion runs once every thread protected in the prior epoch has
//! unprotected or re-protected at a later epoch.
//!
//! Deferred completions live in a mutex-guarded queue rather than a
//! lock-free structure: completions are region shifts, which are orders of
//! magnitude rarer than the record operations whose hot path is the single
//! atomic load in [`LightEpoch::protect`]. Completions are always executed
//! after the queue lock is released, so a completion may itself bump the
//! epoch and defer more work.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::constants::MAX_THREADS;
use crate::status::Status;

// ============ Thread ID allocation ============

struct IdPool {
    next: usize,
    free: Vec<usize>,
}

/// IDs index the epoch table; exiting threads return theirs for reuse.
static THREAD_ID_POOL: Mutex<IdPool> = Mutex::new(IdPool {
    next: 0,
    free: Vec::new(),
});

#[derive(Debug)]
struct ThreadIdGuard {
    id: usize,
}

impl Drop for ThreadIdGuard {
    fn drop(&mut self) {
        THREAD_ID_POOL.lock().free.push(self.id);
    }
}

fn allocate_thread_id() -> Option<ThreadIdGuard> {
    let mut pool = THREAD_ID_POOL.lock();
    if let Some(id) = pool.free.pop() {
        return Some(ThreadIdGuard { id });
    }
    if pool.next < MAX_THREADS {
        let id = pool.next;
        pool.next += 1;
        return Some(ThreadIdGuard { id });
    }
    None
}

thread_local! {
    static THREAD_ID: RefCell<Option<ThreadIdGuard>> = const { RefCell::new(None) };
}

/// Get the current thread's ID for epoch protection.
///
/// The ID is allocated on first call, stays fixed for the thread's lifetime,
/// and is recycled when the thread exits.
///
/// # Errors
///
/// Returns `Status::TooManyThreads` if more than `MAX_THREADS` threads
/// concurrently use the library.
#[inline]
pub fn get_thread_id() -> Result<usize, Status> {
    try_get_thread_id().ok_or(Status::TooManyThreads)
}

/// Try to get the current thread's ID for epoch protection.
#[inline]
pub fn try_get_thread_id() -> Option<usize> {
    THREAD_ID.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(guard) = slot.as_ref() {
            return Some(guard.id);
        }

        let guard = allocate_thread_id()?;
        let id = guard.id;
        *slot = Some(guard);
        Some(id)
    })
}

/// Epoch value published by a thread that is not protected
pub const UNPROTECTED: u64 = 0;

/// Per-thread slot of the epoch table.
///
/// Cache-line aligned so one thread's epoch publication does not bounce the
/// line its neighbors read; the alignment attribute supplies the padding.
#[repr(align(64))]
struct Slot {
    /// Epoch the thread entered protection at (UNPROTECTED outside)
    epoch: AtomicU64,
    /// Protection nesting depth
    depth: AtomicU32,
}

impl Slot {
    const fn new() -> Self {
        Self {
            epoch: AtomicU64::new(UNPROTECTED),
            depth: AtomicU32::new(0),
        }
    }
}

/// A completion waiting out its grace period.
struct DeferredAction {
    /// The completion may run once this epoch is safe
    trigger_epoch: u64,
    action: Box<dyn FnOnce() + Send + 'static>,
}

/// Lightweight epoch protection framework.
///
/// Tracks which threads are inside the protected region and defers
/// completions until every thread has moved past the epoch they were
/// registered under.
pub struct LightEpoch {
    /// Per-thread epoch table
    table: Box<[Slot]>,
    /// Completions waiting on a grace period
    deferred: Mutex<Vec<DeferredAction>>,
    /// Queue length mirror, so hot paths skip the lock when empty
    deferred_count: AtomicUsize,
    /// Current global epoch
    current: AtomicU64,
    /// Cached newest epoch with no straggling reader
    safe: AtomicU64,
}

impl LightEpoch {
    /// Create a new LightEpoch instance
    pub fn new() -> Self {
        let table = (0..MAX_THREADS).map(|_| Slot::new()).collect::<Vec<_>>().into_boxed_slice();
        Self {
            table,
            deferred: Mutex::new(Vec::new()),
            deferred_count: AtomicUsize::new(0),
            current: AtomicU64::new(1),
            safe: AtomicU64::new(0),
        }
    }

    /// Current global epoch
    #[inline]
    pub fn current_epoch(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Newest epoch known to have no straggling reader
    #[inline]
    pub fn safe_epoch(&self) -> u64 {
        self.safe.load(Ordering::Acquire)
    }

    /// Enter the protected region.
    ///
    /// Returns the epoch entered at. Must be balanced with
    /// [`Self::unprotect`].
    #[inline]
    pub fn protect(&self, thread_id: usize) -> u64 {
        debug_assert!(thread_id < MAX_THREADS);
        let epoch = self.current.load(Ordering::Acquire);
        self.table[thread_id].epoch.store(epoch, Ordering::Release);
        epoch
    }

    /// Enter the protected region and run any completions that are ready
    #[inline]
    pub fn protect_and_drain(&self, thread_id: usize) -> u64 {
        let epoch = self.protect(thread_id);
        if self.deferred_count.load(Ordering::Acquire) > 0 {
            self.drain(epoch);
        }
        epoch
    }

    /// Reentrant protection - supports nested protection calls.
    ///
    /// Only the outermost call publishes an epoch; inner calls deepen the
    /// nesting counter.
    #[inline]
    pub fn reentrant_protect(&self, thread_id: usize) -> u64 {
        debug_assert!(thread_id < MAX_THREADS);
        // The slot is owned by the calling thread: only that thread mutates
        // its depth and epoch, while others read the published epoch.
        let slot = &self.table[thread_id];

        if slot.depth.fetch_add(1, Ordering::AcqRel) == 0 {
            let epoch = self.current.load(Ordering::Acquire);
            slot.epoch.store(epoch, Ordering::Release);
            epoch
        } else {
            slot.epoch.load(Ordering::Acquire)
        }
    }

    /// Check whether this thread is currently protected.
    ///
    /// The re-entrancy check: callers already inside must not protect again,
    /// and cooperative waiters must drain instead of blocking.
    #[inline]
    pub fn is_protected(&self, thread_id: usize) -> bool {
        debug_assert!(thread_id < MAX_THREADS);
        self.table[thread_id].epoch.load(Ordering::Acquire) != UNPROTECTED
    }

    /// Exit the protected region
    #[inline]
    pub fn unprotect(&self, thread_id: usize) {
        debug_assert!(thread_id < MAX_THREADS);
        self.table[thread_id].epoch.store(UNPROTECTED, Ordering::Release);
    }

    /// Exit reentrant protection; the outermost exit unpublishes the epoch
    #[inline]
    pub fn reentrant_unprotect(&self, thread_id: usize) {
        debug_assert!(thread_id < MAX_THREADS);
        let slot = &self.table[thread_id];

        if slot.depth.fetch_sub(1, Ordering::AcqRel) == 1 {
            slot.epoch.store(UNPROTECTED, Ordering::Release);
        }
    }

    /// Run any ready completions without entering protection.
    ///
    /// Wait loops on unprotected threads call this so deferred shift
    /// completions make progress even when no other thread is active.
    pub fn drain_pending(&self) {
        if self.deferred_count.load(Ordering::Acquire) > 0 {
            self.drain(self.current_epoch());
        }
    }

    /// Advance the current epoch
    pub fn bump_current_epoch(&self) -> u64 {
        let next = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        if self.deferred_count.load(Ordering::Acquire) > 0 {
            self.drain(next);
        }
        next
    }

    /// Advance the current epoch and register `action` to run once every
    /// thread protected in the prior epoch has drained past it.
    pub fn bump_current_epoch_with_action<F>(&self, action: F) -> u64
    where
        F: FnOnce() + Send + 'static,
    {
        let prior = self.current.fetch_add(1, Ordering::AcqRel);

        {
            let mut queue = self.deferred.lock();
            queue.push(DeferredAction {
                trigger_epoch: prior,
                action: Box::new(action),
            });
            self.deferred_count.store(queue.len(), Ordering::Release);
        }

        self.drain(prior + 1);
        prior + 1
    }

    /// Recompute the safe epoch from the thread table
    pub fn refresh_safe_epoch(&self, current_epoch: u64) -> u64 {
        let oldest_ongoing = self
            .table
            .iter()
            .map(|slot| slot.epoch.load(Ordering::Acquire))
            .filter(|&epoch| epoch != UNPROTECTED)
            .min()
            .unwrap_or(current_epoch);

        let safe = oldest_ongoing.saturating_sub(1);
        self.safe.store(safe, Ordering::Release);
        safe
    }

    /// Whether `epoch` has no straggling reader
    #[inline]
    pub fn is_safe_to_reclaim(&self, epoch: u64) -> bool {
        epoch <= self.safe_epoch()
    }

    /// Pop and run every completion whose trigger epoch is now safe.
    fn drain(&self, up_to_epoch: u64) {
        let safe = self.refresh_safe_epoch(up_to_epoch);

        // Completions run after the lock is released: one of them may bump
        // the epoch and defer more work.
        let ready = self.take_ready(safe);
        for action in ready {
            action();
        }
    }

    fn take_ready(&self, safe_epoch: u64) -> Vec<Box<dyn FnOnce() + Send + 'static>> {
        let mut queue = self.deferred.lock();
        let mut ready = Vec::new();

        let mut i = 0;
        while i < queue.len() {
            if queue[i].trigger_epoch <= safe_epoch {
                ready.push(queue.swap_remove(i).action);
            } else {
                i += 1;
            }
        }
        self.deferred_count.store(queue.len(), Ordering::Release);
        ready
    }
}

impl Default for LightEpoch {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for reentrant epoch protection
pub struct EpochGuard {
    epoch: Arc<LightEpoch>,
    thread_id: usize,
}

impl EpochGuard {
    /// Enter reentrant protection, exiting when the guard drops
    pub fn new(epoch: Arc<LightEpoch>, thread_id: usize) -> Self {
        epoch.reentrant_protect(thread_id);
        Self { epoch, thread_id }
    }

    /// Get the thread ID
    pub fn thread_id(&self) -> usize {
        self.thread_id
    }

    /// Re-publish the current epoch and drain, for long-running operations
    pub fn refresh(&self) {
        self.epoch.protect_and_drain(self.thread_id);
    }
}

impl Drop for EpochGuard {
    fn drop(&mut self) {
        self.epoch.reentrant_unprotect(self.thread_id);
    }
}
