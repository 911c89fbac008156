//! The hybrid log allocator.
//!
//! Owns the page ring, the six region cursors and the flush worker. Shift
//! operations CAS the raw cursor and defer the corresponding safe-cursor
//! advance (plus flush submission / observer dispatch / page close) to an
//! epoch drain action, so no reader of the prior epoch can still be inside
//! the shifted region when the completion runs.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::address::{Address, AtomicTail, Cursor, TailPosition};
use crate::allocator::flush::{FlushManager, FlushRequest, FlushShared, ProgressSignal};
use crate::allocator::page::PageSlot;
use crate::constants::PAGE_HEADER_SIZE;
use crate::device::StorageDevice;
use crate::epoch::{try_get_thread_id, LightEpoch};
use crate::log::LogObserver;
use crate::record::{Key, Value};
use crate::scan::{LogIterator, ScanBufferingMode};
use crate::status::Status;

/// Configuration for the hybrid log allocator
#[derive(Debug, Clone)]
pub struct HybridLogConfig {
    /// Page size as a power of two (`page size = 1 << page_size_bits`)
    pub page_size_bits: u32,
    /// Number of page slots in the in-memory ring
    pub buffer_size: u32,
    /// Ring slots reserved as always-empty
    pub empty_page_count: u32,
    /// Fraction of in-memory pages kept mutable
    pub mutable_fraction: f64,
}

impl HybridLogConfig {
    /// Derive a configuration from a total memory budget
    pub fn from_memory_size(memory_size: u64, page_size_bits: u32) -> Self {
        let page_size = 1u64 << page_size_bits;
        let buffer_size = (memory_size / page_size).max(4) as u32;
        Self {
            page_size_bits,
            buffer_size,
            empty_page_count: 1,
            mutable_fraction: 0.9,
        }
    }

    /// Page size in bytes
    #[inline]
    pub fn page_size(&self) -> usize {
        1usize << self.page_size_bits
    }

    fn validate(&self) -> Result<(), Status> {
        if self.page_size_bits < 9 || self.page_size_bits > Address::OFFSET_BITS {
            return Err(Status::InvalidArgument);
        }
        if self.buffer_size < 2 || self.empty_page_count >= self.buffer_size {
            return Err(Status::InvalidArgument);
        }
        if !(0.0..=1.0).contains(&self.mutable_fraction) {
            return Err(Status::InvalidArgument);
        }
        Ok(())
    }
}

impl Default for HybridLogConfig {
    fn default() -> Self {
        Self {
            page_size_bits: 22, // 4 MB pages
            buffer_size: 32,
            empty_page_count: 1,
            mutable_fraction: 0.9,
        }
    }
}

/// Shared allocator state; drain actions and iterators hold it by `Arc`.
pub(crate) struct HlogInner<K: Key, V: Value, D: StorageDevice> {
    pub(crate) page_size: usize,
    pub(crate) buffer_size: u32,
    mutable_fraction: f64,

    pub(crate) device: Arc<D>,
    pub(crate) epoch: Arc<LightEpoch>,
    pub(crate) slots: Arc<[PageSlot]>,

    tail: AtomicTail,
    begin_address: Cursor,
    head_address: Cursor,
    safe_head_address: Cursor,
    read_only_address: Cursor,
    safe_read_only_address: Cursor,
    pub(crate) flushed_until_address: Arc<Cursor>,

    empty_page_count: AtomicU32,
    checkpointing: AtomicBool,
    disposed: AtomicBool,

    pub(crate) signal: Arc<ProgressSignal>,
    flush_shared: Arc<FlushShared<D>>,
    flush: FlushManager,

    read_only_observer: Mutex<Option<Arc<dyn LogObserver<K, V, D>>>>,
    eviction_observer: Mutex<Option<Arc<dyn LogObserver<K, V, D>>>>,

    /// Back-reference so drain actions and iterators can hold the allocator
    self_weak: std::sync::Weak<HlogInner<K, V, D>>,
}

// Safety: page buffers are single-writer per reservation, cursor state is
// atomic, and slot reuse waits for epoch-protected readers to drain.
unsafe impl<K: Key, V: Value, D: StorageDevice> Send for HlogInner<K, V, D> {}
unsafe impl<K: Key, V: Value, D: StorageDevice> Sync for HlogInner<K, V, D> {}

impl<K: Key, V: Value, D: StorageDevice> HlogInner<K, V, D> {
    /// First record address on a fresh page
    #[inline]
    fn first_offset() -> u32 {
        PAGE_HEADER_SIZE as u32
    }

    #[inline]
    fn slot(&self, page: u32) -> &PageSlot {
        &self.slots[(page % self.buffer_size) as usize]
    }

    /// Strong handle to this allocator, for drain closures and iterators.
    pub(crate) fn arc(&self) -> Arc<Self> {
        self.self_weak.upgrade().expect("allocator alive while in use")
    }

    /// Byte offset of `address` on the device
    #[inline]
    pub(crate) fn byte_offset(&self, address: Address) -> u64 {
        address.page() as u64 * self.page_size as u64 + address.offset() as u64
    }

    /// Pages kept mutable behind the tail
    fn mutable_pages(&self) -> u32 {
        let usable = self.buffer_size - self.empty_page_count.load(Ordering::Acquire);
        let pages = (self.buffer_size as f64 * self.mutable_fraction) as u32;
        pages.clamp(1, usable.max(1))
    }

    /// Pages the head lags behind the tail:
    /// `BufferSize − EmptyPageCount`, expressed in pages.
    fn head_lag_pages(&self) -> u32 {
        self.buffer_size - self.empty_page_count.load(Ordering::Acquire)
    }

    // ---- cursor reads ----

    #[inline]
    pub(crate) fn tail_address(&self) -> Address {
        self.tail.load().to_address()
    }

    #[inline]
    pub(crate) fn begin_address_load(&self) -> Address {
        self.begin_address.load()
    }

    #[inline]
    pub(crate) fn head_address_load(&self) -> Address {
        self.head_address.load()
    }

    #[inline]
    pub(crate) fn safe_head_address_load(&self) -> Address {
        self.safe_head_address.load()
    }

    #[inline]
    pub(crate) fn read_only_address_load(&self) -> Address {
        self.read_only_address.load()
    }

    #[inline]
    pub(crate) fn safe_read_only_address_load(&self) -> Address {
        self.safe_read_only_address.load()
    }

    #[inline]
    pub(crate) fn flushed_until_address_load(&self) -> Address {
        self.flushed_until_address.load()
    }

    #[inline]
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Whether checkpointing mode is active
    #[inline]
    pub(crate) fn is_checkpointing(&self) -> bool {
        self.checkpointing.load(Ordering::Acquire)
    }

    // ---- record access ----

    /// Raw pointer to the record bytes at `address`, if its page is mapped.
    ///
    /// # Safety
    /// The caller must hold epoch protection and `address` must be in
    /// `[SafeHeadAddress, TailAddress)`.
    pub(crate) unsafe fn record_ptr(&self, address: Address) -> Option<*mut u8> {
        let page = address.page();
        let slot = self.slot(page);
        if slot.owner() != Some(page) {
            return None;
        }
        slot.byte_ptr(address.offset() as usize)
    }

    // ---- allocation ----

    /// Cooperative progress while waiting: re-publish the epoch (if inside)
    /// and run any ready drain actions.
    pub(crate) fn refresh_for_progress(&self) {
        if let Some(tid) = try_get_thread_id() {
            if self.epoch.is_protected(tid) {
                self.epoch.protect_and_drain(tid);
            } else {
                self.epoch.drain_pending();
            }
        } else {
            self.epoch.drain_pending();
        }
        std::thread::yield_now();
    }

    /// Reserve `num_bytes` at the tail, returning the record address.
    ///
    /// Blocks while the target ring slot is not yet reclaimable.
    pub(crate) fn allocate(&self, num_bytes: u32) -> Result<Address, Status> {
        if self.is_disposed() {
            return Err(Status::AllocatorClosed);
        }
        if num_bytes == 0 || num_bytes as usize > self.page_size - PAGE_HEADER_SIZE {
            return Err(Status::InvalidArgument);
        }

        loop {
            let reserved: TailPosition = self.tail.reserve(num_bytes);
            let page = reserved.page();
            let end = reserved.offset() + num_bytes as u64;

            if end <= self.page_size as u64 {
                let address = Address::new(page, reserved.offset() as u32);
                self.wait_page_open(page)?;
                return Ok(address);
            }

            // Overflow: the remainder of the page stays zeroed (skip padding)
            // and the tail moves to the next page.
            if page >= Address::MAX_PAGE - 1 {
                return Err(Status::OutOfMemory);
            }

            let (advanced, won_cas) = self.tail.advance_page(page, Self::first_offset());
            if !advanced {
                continue;
            }
            if won_cas {
                self.open_new_page(page + 1)?;
            }
        }
    }

    /// Spin until `page` is mapped into its slot (set up by the CAS winner).
    fn wait_page_open(&self, page: u32) -> Result<(), Status> {
        loop {
            if self.is_disposed() {
                return Err(Status::AllocatorClosed);
            }
            if self.slot(page).owner() == Some(page) {
                return Ok(());
            }
            self.refresh_for_progress();
        }
    }

    /// Winner-side page transition: maintain the region boundaries driven by
    /// the tail, wait for the target slot to drain out of the ring, and map
    /// the new page into it.
    fn open_new_page(&self, new_page: u32) -> Result<(), Status> {
        self.page_aligned_shift_read_only(new_page);
        self.page_aligned_shift_head(new_page);

        let slot = self.slot(new_page);
        while !slot.reusable_for(new_page) {
            if self.is_disposed() {
                return Err(Status::AllocatorClosed);
            }
            // Keep the head moving as flushes complete.
            self.page_aligned_shift_head(self.tail_address().page());
            self.refresh_for_progress();
            self.signal.wait_timeout(std::time::Duration::from_millis(1));
        }

        // SAFETY: this thread won the page CAS and the slot is reclaimable.
        unsafe { slot.reset_for(new_page) };
        self.signal.notify_all();
        Ok(())
    }

    fn page_aligned_shift_read_only(&self, tail_page: u32) {
        let desired_page = tail_page.saturating_sub(self.mutable_pages());
        self.shift_read_only_address(Address::new(desired_page, 0));
    }

    fn page_aligned_shift_head(&self, tail_page: u32) {
        let desired_page = tail_page.saturating_sub(self.head_lag_pages());
        self.shift_head_address(Address::new(desired_page, 0));
    }

    // ---- shifts ----

    /// Raise `ReadOnlyAddress` to `new_ro`. Non-monotone requests are
    /// silently ignored.
    pub(crate) fn shift_read_only_address(&self, new_ro: Address) {
        if self.is_disposed() {
            return;
        }
        let new_ro = std::cmp::min(new_ro, self.tail_address());
        if self.read_only_address.advance_to(new_ro) {
            let inner = self.arc();
            self.epoch.bump_current_epoch_with_action(move || {
                inner.on_pages_marked_read_only(new_ro);
            });
        }
    }

    /// Raise `HeadAddress` toward `desired`, clamped so eviction never
    /// outruns durability. Returns the effective target.
    pub(crate) fn shift_head_address(&self, desired: Address) -> Address {
        if self.is_disposed() {
            return self.head_address_load();
        }
        let flushed = self.flushed_until_address_load();
        let new_head = std::cmp::min(desired, flushed);

        if self.head_address.advance_to(new_head) {
            let inner = self.arc();
            self.epoch.bump_current_epoch_with_action(move || {
                inner.on_pages_closed(new_head);
            });
        }
        new_head
    }

    /// Raise `BeginAddress` to `new_begin`, retiring the prefix. If
    /// `truncate` is set, the device prefix is discarded once the prior
    /// epoch drains.
    pub(crate) fn shift_begin_address(&self, new_begin: Address, truncate: bool) {
        let new_begin = std::cmp::min(new_begin, self.tail_address());
        let advanced = self.begin_address.advance_to(new_begin);
        if !advanced && !truncate {
            return;
        }

        let inner = self.arc();
        self.epoch.bump_current_epoch_with_action(move || {
            // The whole chain sits at or above the begin address: everything
            // below it is retired, flushed-or-not.
            inner.read_only_address.advance_to(new_begin);
            inner.safe_read_only_address.advance_to(new_begin);
            inner.flushed_until_address.advance_to(new_begin);
            inner.head_address.advance_to(new_begin);
            inner.on_pages_closed(new_begin);

            if truncate {
                let below = inner.byte_offset(new_begin.page_start());
                debug!(page = new_begin.page(), "truncating log below page");
                inner.flush.submit(FlushRequest::Truncate { below_offset: below });
            }
            inner.signal.notify_all();
        });
    }

    /// Drain action for a read-only shift: advance the safe cursor, hand the
    /// newly immutable range to the observer, and submit page flushes.
    fn on_pages_marked_read_only(&self, new_safe_ro: Address) {
        let Some(prev) = self.safe_read_only_address.advance_returning_prev(new_safe_ro) else {
            return;
        };

        let observer = self.read_only_observer.lock().clone();
        if let Some(observer) = observer {
            let mut iter = LogIterator::new(
                self.arc(),
                prev,
                new_safe_ro,
                ScanBufferingMode::SinglePage,
                true,
            );
            observer.on_next(&mut iter);
        }

        self.submit_flushes(prev, new_safe_ro);
        self.signal.notify_all();
    }

    /// Submit flush requests covering `[from, upto)`.
    fn submit_flushes(&self, from: Address, upto: Address) {
        if upto <= from {
            return;
        }
        let last_page = if upto.offset() == 0 { upto.page().saturating_sub(1) } else { upto.page() };

        for page in from.page()..=last_page {
            let slot = self.slot(page);
            if slot.owner() != Some(page) {
                continue;
            }

            let page_upto = if upto.page() > page {
                Address::new(page + 1, 0)
            } else {
                upto
            };
            let len = if page_upto.page() > page {
                self.page_size
            } else {
                page_upto.offset() as usize
            };
            if len == 0 {
                continue;
            }

            // SAFETY: the range is at or below the new safe read-only
            // address, so these bytes are immutable.
            let data = match unsafe { slot.bytes() } {
                Some(bytes) => bytes[..len].to_vec(),
                None => continue,
            };
            self.flush.submit(FlushRequest::Page {
                page,
                upto: page_upto,
                data,
            });
        }
    }

    /// Drain action for a head shift: advance the safe cursor, hand the
    /// evicted range to the observer, then return fully passed slots to the
    /// ring.
    fn on_pages_closed(&self, new_safe_head: Address) {
        let Some(prev) = self.safe_head_address.advance_returning_prev(new_safe_head) else {
            return;
        };

        let observer = self.eviction_observer.lock().clone();
        if let Some(observer) = observer {
            let mut iter = LogIterator::new(
                self.arc(),
                prev,
                new_safe_head,
                ScanBufferingMode::SinglePage,
                true,
            );
            observer.on_next(&mut iter);
        }

        let begin = self.begin_address_load();
        for page in prev.page()..new_safe_head.page() {
            let slot = self.slot(page);
            if slot.owner() != Some(page) {
                continue;
            }
            let page_end = Address::new(page + 1, 0);
            if page_end <= begin {
                // Retired pages close without waiting for durability.
                slot.advance_flushed_to(page_end.control());
            }
            slot.mark_closed();
        }

        self.flush_shared.advance_flushed_until();
        self.signal.notify_all();
    }

    // ---- observers ----

    pub(crate) fn set_read_only_observer(&self, observer: Option<Arc<dyn LogObserver<K, V, D>>>) {
        *self.read_only_observer.lock() = observer;
    }

    pub(crate) fn set_eviction_observer(&self, observer: Option<Arc<dyn LogObserver<K, V, D>>>) {
        *self.eviction_observer.lock() = observer;
    }

    /// Clear the read-only observer slot if `predicate` approves the current
    /// occupant (used by subscription handles to avoid clearing a successor).
    pub(crate) fn clear_read_only_observer_if(
        &self,
        predicate: impl FnOnce(&Option<Arc<dyn LogObserver<K, V, D>>>) -> bool,
    ) {
        let mut slot = self.read_only_observer.lock();
        if predicate(&slot) {
            *slot = None;
        }
    }

    /// Clear the eviction observer slot if `predicate` approves the current
    /// occupant.
    pub(crate) fn clear_eviction_observer_if(
        &self,
        predicate: impl FnOnce(&Option<Arc<dyn LogObserver<K, V, D>>>) -> bool,
    ) {
        let mut slot = self.eviction_observer.lock();
        if predicate(&slot) {
            *slot = None;
        }
    }

    // ---- maintenance ----

    /// Clamp and store the empty page count; returns the effective value.
    pub(crate) fn set_empty_page_count(&self, count: u32) -> u32 {
        let max = self.buffer_size - 1;
        let effective = count.min(max);
        if effective != count {
            warn!(requested = count, clamped = effective, "empty page count clamped");
        }
        self.empty_page_count.store(effective, Ordering::Release);
        effective
    }

    /// Head target implied by the current tail and empty page count:
    /// `(TailAddress page start) − (BufferSize − EmptyPageCount) pages`.
    pub(crate) fn head_target_for_empty_pages(&self) -> Address {
        let tail_page = self.tail_address().page();
        Address::new(tail_page.saturating_sub(self.head_lag_pages()), 0)
    }

    pub(crate) fn set_checkpointing(&self, active: bool) {
        self.checkpointing.store(active, Ordering::Release);
        // Force in-flight operations to observe the new regime on their next
        // re-protect.
        self.epoch.bump_current_epoch();
    }

    /// Terminal: release all pages. Subsequent allocations fail with
    /// `AllocatorClosed`.
    pub(crate) fn delete_from_memory(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.flush.stop();
        for slot in self.slots.iter() {
            // SAFETY: dispose is called after flush-and-evict has drained all
            // sessions past the evicted pages.
            unsafe { slot.release_buffer() };
        }
        self.signal.notify_all();
    }
}

/// The hybrid log allocator handle.
///
/// Cheap to clone; all clones share the same log.
pub struct HybridLog<K: Key, V: Value, D: StorageDevice> {
    inner: Arc<HlogInner<K, V, D>>,
}

impl<K: Key, V: Value, D: StorageDevice> Clone for HybridLog<K, V, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Key, V: Value, D: StorageDevice> HybridLog<K, V, D> {
    /// Create a new hybrid log over `device`.
    pub fn new(config: HybridLogConfig, device: Arc<D>, epoch: Arc<LightEpoch>) -> Result<Self, Status> {
        config.validate()?;

        let page_size = config.page_size();
        let buffer_size = config.buffer_size;
        let alignment = StorageDevice::alignment(device.as_ref()).max(4096);

        let slots: Arc<[PageSlot]> = (0..buffer_size)
            .map(|_| PageSlot::new(page_size, alignment))
            .collect::<Vec<_>>()
            .into();

        // Map page 0 into its slot; later pages are mapped by the tail CAS
        // winner as the log grows.
        // SAFETY: construction is single-threaded.
        unsafe { slots[0].initialize_for(0) };

        let first = Address::new(0, PAGE_HEADER_SIZE as u32);
        let flushed_until_address = Arc::new(Cursor::new(first));
        let signal = Arc::new(ProgressSignal::new());

        let flush_shared = Arc::new(FlushShared::new(
            Arc::clone(&device),
            Arc::clone(&slots),
            buffer_size,
            page_size,
            Arc::clone(&flushed_until_address),
            Arc::clone(&signal),
        ));
        let flush = FlushManager::new(Arc::clone(&flush_shared));

        let inner = Arc::new_cyclic(|weak| HlogInner {
            self_weak: weak.clone(),
            page_size,
            buffer_size,
            mutable_fraction: config.mutable_fraction,
            device,
            epoch,
            slots,
            tail: AtomicTail::from_address(first),
            begin_address: Cursor::new(first),
            head_address: Cursor::new(first),
            safe_head_address: Cursor::new(first),
            read_only_address: Cursor::new(first),
            safe_read_only_address: Cursor::new(first),
            flushed_until_address,
            empty_page_count: AtomicU32::new(config.empty_page_count),
            checkpointing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            signal,
            flush_shared,
            flush,
            read_only_observer: Mutex::new(None),
            eviction_observer: Mutex::new(None),
        });

        Ok(Self { inner })
    }

    pub(crate) fn inner(&self) -> &Arc<HlogInner<K, V, D>> {
        &self.inner
    }

    /// The epoch instance guarding this log
    pub fn epoch(&self) -> &Arc<LightEpoch> {
        &self.inner.epoch
    }

    /// Page size in bytes
    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    /// Number of ring slots
    pub fn buffer_size(&self) -> u32 {
        self.inner.buffer_size
    }

    /// Next byte to be appended
    pub fn tail_address(&self) -> Address {
        self.inner.tail_address()
    }

    /// Oldest logically live byte
    pub fn begin_address(&self) -> Address {
        self.inner.begin_address_load()
    }

    /// Oldest byte still in memory
    pub fn head_address(&self) -> Address {
        self.inner.head_address_load()
    }

    /// Head address all in-flight readers have drained past
    pub fn safe_head_address(&self) -> Address {
        self.inner.safe_head_address_load()
    }

    /// Boundary between the immutable and mutable regions
    pub fn read_only_address(&self) -> Address {
        self.inner.read_only_address_load()
    }

    /// Read-only address all mutators have drained past
    pub fn safe_read_only_address(&self) -> Address {
        self.inner.safe_read_only_address_load()
    }

    /// Durable prefix watermark
    pub fn flushed_until_address(&self) -> Address {
        self.inner.flushed_until_address_load()
    }

    /// Reserve `num_bytes` at the tail
    pub fn allocate(&self, num_bytes: u32) -> Result<Address, Status> {
        self.inner.allocate(num_bytes)
    }

    /// Raise the read-only boundary
    pub fn shift_read_only_address(&self, new_ro: Address) {
        self.inner.shift_read_only_address(new_ro);
    }

    /// Raise the head boundary (clamped to the durable watermark)
    pub fn shift_head_address(&self, new_head: Address) -> Address {
        self.inner.shift_head_address(new_head)
    }

    /// Retire the prefix below `new_begin`
    pub fn shift_begin_address(&self, new_begin: Address, truncate: bool) {
        self.inner.shift_begin_address(new_begin, truncate);
    }

    /// Iterate records in `[begin, end)`
    pub fn scan(
        &self,
        begin: Address,
        end: Address,
        mode: ScanBufferingMode,
        allow_mutable: bool,
    ) -> LogIterator<K, V, D> {
        LogIterator::new(Arc::clone(&self.inner), begin, end, mode, allow_mutable)
    }

    /// Check if an address is in the mutable region
    pub fn is_mutable(&self, address: Address) -> bool {
        address >= self.read_only_address()
    }

    /// Check if an address has been evicted to the device
    pub fn is_on_disk(&self, address: Address) -> bool {
        address < self.head_address()
    }

    /// Clamp and store the empty page count; returns the effective value
    pub fn set_empty_page_count(&self, count: u32) -> u32 {
        self.inner.set_empty_page_count(count)
    }

    /// Toggle the checkpointing regime flag
    pub fn set_checkpointing(&self, active: bool) {
        self.inner.set_checkpointing(active);
    }

    /// Terminal: release all pages; subsequent allocations fail
    pub fn delete_from_memory(&self) {
        self.inner.delete_from_memory();
    }

    /// Snapshot of the region cursors
    pub fn stats(&self) -> LogStats {
        LogStats {
            begin_address: self.begin_address(),
            safe_head_address: self.safe_head_address(),
            head_address: self.head_address(),
            safe_read_only_address: self.safe_read_only_address(),
            read_only_address: self.read_only_address(),
            tail_address: self.tail_address(),
            flushed_until_address: self.flushed_until_address(),
        }
    }
}

/// Snapshot of the log's region cursors
#[derive(Debug, Clone)]
pub struct LogStats {
    /// Oldest logically live byte
    pub begin_address: Address,
    /// Safe head cursor
    pub safe_head_address: Address,
    /// Head cursor
    pub head_address: Address,
    /// Safe read-only cursor
    pub safe_read_only_address: Address,
    /// Read-only cursor
    pub read_only_address: Address,
    /// Tail cursor
    pub tail_address: Address,
    /// Durable watermark
    pub flushed_until_address: Address,
}

impl LogStats {
    /// Check the monotone cursor chain
    pub fn is_chain_monotone(&self) -> bool {
        self.begin_address <= self.safe_head_address
            && self.safe_head_address <= self.head_address
            && self.head_address <= self.safe_read_only_address
            && self.safe_read_only_address <= self.read_only_address
            && self.read_only_address <= self.tail_address
    }
}

impl std::fmt::Display for LogStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Log cursors:")?;
        writeln!(f, "  begin:          {}", self.begin_address)?;
        writeln!(f, "  safe head:      {}", self.safe_head_address)?;
        writeln!(f, "  head:           {}", self.head_address)?;
        writeln!(f, "  safe read-only: {}", self.safe_read_only_address)?;
        writeln!(f, "  read-only:      {}", self.read_only_address)?;
        writeln!(f, "  tail:           {}", self.tail_address)?;
        writeln!(f, "  flushed until:  {}", self.flushed_until_address)
    }
}
