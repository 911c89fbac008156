//! Synchronous façade over the hybrid log allocator.
//!
//! Every shift follows the same skeleton: check whether the calling thread is
//! already epoch-protected (the re-entrancy guard), wrap the allocator call
//! in protect/unprotect if it is not, and - when the caller asked to wait -
//! block on the matching progress condition. Unprotected waiters block on the
//! shift-progress condition variable; protected waiters cooperatively drain
//! instead, since blocking under protection would stall the very drain they
//! are waiting for.

use std::sync::Arc;
use std::time::Duration;

use crate::address::Address;
use crate::allocator::{HybridLog, HybridLogConfig, LogStats};
use crate::device::StorageDevice;
use crate::epoch::{get_thread_id, try_get_thread_id, LightEpoch};
use crate::log::observer::{LogObserver, ObserverKind, SubscriptionHandle};
use crate::record::{Key, Value};
use crate::scan::{LogIterator, ScanBufferingMode};
use crate::status::Status;

/// The user-visible log surface.
///
/// Cheap to clone; all clones drive the same log.
pub struct LogAccessor<K: Key, V: Value, D: StorageDevice> {
    hlog: HybridLog<K, V, D>,
}

impl<K: Key, V: Value, D: StorageDevice> Clone for LogAccessor<K, V, D> {
    fn clone(&self) -> Self {
        Self {
            hlog: self.hlog.clone(),
        }
    }
}

impl<K: Key, V: Value, D: StorageDevice> LogAccessor<K, V, D> {
    pub(crate) fn new(hlog: HybridLog<K, V, D>) -> Self {
        Self { hlog }
    }

    /// Create a standalone log over `device` with its own epoch instance.
    pub fn create(config: HybridLogConfig, device: Arc<D>) -> Result<Self, Status> {
        let epoch = Arc::new(LightEpoch::new());
        Ok(Self::new(HybridLog::new(config, device, epoch)?))
    }

    /// The underlying allocator handle
    pub fn hybrid_log(&self) -> &HybridLog<K, V, D> {
        &self.hlog
    }

    /// The epoch instance guarding this log
    pub fn epoch(&self) -> &Arc<LightEpoch> {
        self.hlog.epoch()
    }

    // ---- cursors ----

    /// Oldest logically live byte
    pub fn begin_address(&self) -> Address {
        self.hlog.begin_address()
    }

    /// Oldest byte still in memory
    pub fn head_address(&self) -> Address {
        self.hlog.head_address()
    }

    /// Head address all in-flight readers have drained past
    pub fn safe_head_address(&self) -> Address {
        self.hlog.safe_head_address()
    }

    /// Immutable/mutable boundary
    pub fn read_only_address(&self) -> Address {
        self.hlog.read_only_address()
    }

    /// Read-only address all mutators have drained past
    pub fn safe_read_only_address(&self) -> Address {
        self.hlog.safe_read_only_address()
    }

    /// Next byte to be appended
    pub fn tail_address(&self) -> Address {
        self.hlog.tail_address()
    }

    /// Durable prefix watermark
    pub fn flushed_until_address(&self) -> Address {
        self.hlog.flushed_until_address()
    }

    /// Snapshot of all cursors
    pub fn stats(&self) -> LogStats {
        self.hlog.stats()
    }

    // ---- protection plumbing ----

    /// Run `f` under epoch protection, protecting only if the calling thread
    /// is not already inside.
    fn with_protection<R>(&self, f: impl FnOnce() -> R) -> Result<R, Status> {
        let tid = get_thread_id()?;
        let epoch = self.epoch();
        let already_protected = epoch.is_protected(tid);
        if !already_protected {
            epoch.reentrant_protect(tid);
        }
        let result = f();
        if !already_protected {
            epoch.reentrant_unprotect(tid);
        }
        Ok(result)
    }

    /// Block until `cond` holds, making cooperative progress.
    fn wait_until(&self, mut cond: impl FnMut() -> bool) {
        let tid = try_get_thread_id();
        let epoch = self.epoch();
        loop {
            if cond() {
                return;
            }
            match tid {
                Some(tid) if epoch.is_protected(tid) => {
                    // Cooperative variant: re-publish and drain rather than
                    // block while holding protection.
                    epoch.protect_and_drain(tid);
                    std::thread::yield_now();
                }
                _ => {
                    epoch.drain_pending();
                    if cond() {
                        return;
                    }
                    self.hlog.inner().signal.wait_timeout(Duration::from_millis(10));
                }
            }
        }
    }

    // ---- shifts ----

    /// Raise the begin address to `until`, retiring the prefix.
    ///
    /// With `snap_to_page_start`, `until` is rounded down to its page start
    /// first. With `truncate_log`, the device prefix below the new begin
    /// address is destructively discarded once in-flight readers drain.
    pub fn shift_begin_address(
        &self,
        until: Address,
        snap_to_page_start: bool,
        truncate_log: bool,
    ) -> Result<(), Status> {
        let target = if snap_to_page_start { until.page_start() } else { until };
        self.with_protection(|| self.hlog.shift_begin_address(target, truncate_log))?;
        self.epoch().drain_pending();
        Ok(())
    }

    /// Shortcut: discard the device prefix below the current begin address.
    pub fn truncate(&self) -> Result<(), Status> {
        self.shift_begin_address(self.begin_address(), false, true)
    }

    /// Raise the read-only boundary; with `wait`, block until the newly
    /// immutable range is durable (`FlushedUntilAddress >= new_ro`).
    pub fn shift_read_only_address(&self, new_ro: Address, wait: bool) -> Result<(), Status> {
        let target = std::cmp::min(new_ro, self.tail_address());
        self.with_protection(|| self.hlog.shift_read_only_address(target))?;
        self.epoch().drain_pending();
        if wait {
            self.wait_until(|| self.flushed_until_address() >= target);
        }
        Ok(())
    }

    /// Raise the head boundary, evicting pages from memory; with `wait`,
    /// block until the eviction has drained (`SafeHeadAddress >= new_head`).
    ///
    /// Precedes the eviction with a forced-wait read-only shift so the
    /// evicted range is durable first.
    pub fn shift_head_address(&self, new_head: Address, wait: bool) -> Result<(), Status> {
        let target = std::cmp::min(new_head, self.tail_address());
        self.shift_read_only_address(target, true)?;

        let effective = self.with_protection(|| self.hlog.shift_head_address(target))?;
        self.epoch().drain_pending();
        debug_assert!(effective >= target);

        if wait {
            self.wait_until(|| self.safe_head_address() >= target);
        }
        Ok(())
    }

    /// Flush the log up to the current tail.
    pub fn flush(&self, wait: bool) -> Result<(), Status> {
        self.shift_read_only_address(self.tail_address(), wait)
    }

    /// Flush the log up to the current tail and evict it from memory.
    pub fn flush_and_evict(&self, wait: bool) -> Result<(), Status> {
        self.shift_head_address(self.tail_address(), wait)
    }

    /// Flush, evict, and release all pages. Terminal: subsequent allocations
    /// fail with `AllocatorClosed`.
    pub fn dispose_from_memory(&self) -> Result<(), Status> {
        self.flush_and_evict(true)?;
        self.hlog.delete_from_memory();
        Ok(())
    }

    // ---- scans and observers ----

    /// Iterate records in `[begin, end)`. With `allow_mutable`, the scan may
    /// read past the read-only boundary; otherwise it stops at the safe
    /// read-only address.
    pub fn scan(
        &self,
        begin: Address,
        end: Address,
        mode: ScanBufferingMode,
        allow_mutable: bool,
    ) -> LogIterator<K, V, D> {
        self.hlog.scan(begin, end, mode, allow_mutable)
    }

    /// Install the read-only-transition observer (replacing any current one).
    /// The observer sees each newly immutable range exactly once.
    pub fn subscribe(&self, observer: Arc<dyn LogObserver<K, V, D>>) -> SubscriptionHandle<K, V, D> {
        self.hlog.inner().set_read_only_observer(Some(Arc::clone(&observer)));
        SubscriptionHandle::new(Arc::clone(self.hlog.inner()), observer, ObserverKind::ReadOnly)
    }

    /// Install the eviction observer (replacing any current one). The
    /// observer sees each evicted range exactly once, before the pages are
    /// returned to the ring.
    pub fn subscribe_evictions(
        &self,
        observer: Arc<dyn LogObserver<K, V, D>>,
    ) -> SubscriptionHandle<K, V, D> {
        self.hlog.inner().set_eviction_observer(Some(Arc::clone(&observer)));
        SubscriptionHandle::new(Arc::clone(self.hlog.inner()), observer, ObserverKind::Eviction)
    }

    // ---- maintenance ----

    /// Change the number of ring slots reserved as always-empty, shrinking
    /// the in-memory footprint. With `wait`, blocks until the implied head
    /// shift has drained.
    pub fn set_empty_page_count(&self, count: u32, wait: bool) -> Result<(), Status> {
        self.hlog.set_empty_page_count(count);
        let target = self.hlog.inner().head_target_for_empty_pages();
        if target > self.head_address() {
            self.shift_head_address(target, wait)?;
        }
        Ok(())
    }

    /// Toggle the checkpointing regime flag; forces an epoch bump so
    /// in-flight operations observe the change on their next re-protect.
    pub fn set_checkpointing(&self, active: bool) {
        self.hlog.set_checkpointing(active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    fn test_accessor() -> LogAccessor<u64, u64, MemoryDevice> {
        let config = HybridLogConfig {
            page_size_bits: 12,
            buffer_size: 8,
            empty_page_count: 1,
            mutable_fraction: 0.5,
        };
        LogAccessor::create(config, Arc::new(MemoryDevice::new())).unwrap()
    }

    #[test]
    fn flush_waits_for_durability() {
        let log = test_accessor();
        log.hybrid_log().allocate(1000).unwrap();

        let tail = log.tail_address();
        log.flush(true).unwrap();

        assert!(log.flushed_until_address() >= tail);
        assert!(log.safe_read_only_address() >= tail);
    }

    #[test]
    fn flush_and_evict_moves_every_boundary_to_tail() {
        let log = test_accessor();
        log.hybrid_log().allocate(1000).unwrap();
        log.hybrid_log().allocate(1000).unwrap();

        let tail = log.tail_address();
        log.flush_and_evict(true).unwrap();

        assert!(log.safe_head_address() >= tail);
        assert!(log.stats().is_chain_monotone());
    }

    #[test]
    fn dispose_is_terminal() {
        let log = test_accessor();
        log.hybrid_log().allocate(100).unwrap();

        log.dispose_from_memory().unwrap();
        assert_eq!(log.hybrid_log().allocate(100).unwrap_err(), Status::AllocatorClosed);
    }

    #[test]
    fn begin_shift_snaps_to_page_start() {
        let log = test_accessor();
        for _ in 0..200 {
            log.hybrid_log().allocate(100).unwrap();
        }

        let mid = Address::new(2, 500);
        log.shift_begin_address(mid, true, false).unwrap();
        assert_eq!(log.begin_address(), Address::new(2, 0));
    }

    #[test]
    fn stale_subscription_handle_keeps_replacement() {
        let log = test_accessor();

        let first = log.subscribe(Arc::new(|_: &mut LogIterator<u64, u64, MemoryDevice>| {}));
        let _second = log.subscribe(Arc::new(|_: &mut LogIterator<u64, u64, MemoryDevice>| {}));

        // Dropping the replaced handle must not clear the live observer.
        drop(first);
        log.hybrid_log().allocate(1000).unwrap();
        log.flush(true).unwrap();
    }
}
