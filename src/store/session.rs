//! Client sessions.
//!
//! A session binds a thread to the store: it owns the thread's epoch
//! protection, its pending-I/O accounting, and the periodic refresh that
//! keeps drain actions moving during long operation streams. Sessions are
//! not `Send`; each thread starts its own.

use bytemuck::Zeroable;

use crate::address::Address;
use crate::compaction::{self, CompactionFunctions, CompactionType};
use crate::device::StorageDevice;
use crate::epoch::get_thread_id;
use crate::record::{Key, Record, RecordInfo, Value};
use crate::status::Status;
use crate::store::kv::TideKv;

/// Refresh epoch protection after this many operations
const REFRESH_INTERVAL: u32 = 64;

/// A single-threaded handle for store operations.
pub struct Session<'a, K: Key, V: Value, D: StorageDevice> {
    store: &'a TideKv<K, V, D>,
    thread_id: usize,
    active: bool,
    pending_count: u32,
    io_ops: u64,
    ops_since_refresh: u32,
}

impl<'a, K: Key, V: Value, D: StorageDevice> Session<'a, K, V, D> {
    pub(crate) fn new(store: &'a TideKv<K, V, D>) -> Result<Self, Status> {
        let thread_id = get_thread_id()?;
        Ok(Self {
            store,
            thread_id,
            active: false,
            pending_count: 0,
            io_ops: 0,
            ops_since_refresh: 0,
        })
    }

    /// The store this session operates on
    pub fn store(&self) -> &'a TideKv<K, V, D> {
        self.store
    }

    /// Thread ID bound to this session
    pub fn thread_id(&self) -> usize {
        self.thread_id
    }

    /// Device reads performed so far
    pub fn io_ops(&self) -> u64 {
        self.io_ops
    }

    /// Outstanding pending operations
    pub fn pending_count(&self) -> u32 {
        self.pending_count
    }

    fn ensure_started(&mut self) {
        if !self.active {
            self.store.epoch().reentrant_protect(self.thread_id);
            self.active = true;
        }
    }

    /// Re-publish the epoch and run ready drain actions.
    pub fn refresh(&self) {
        if self.active {
            self.store.epoch().protect_and_drain(self.thread_id);
        } else {
            self.store.epoch().drain_pending();
        }
    }

    fn maybe_refresh(&mut self) {
        self.ops_since_refresh += 1;
        if self.ops_since_refresh >= REFRESH_INTERVAL {
            self.ops_since_refresh = 0;
            self.refresh();
        }
    }

    /// Drain completed pending operations and refresh protection.
    pub fn complete_pending(&mut self) {
        while self.store.pending.poll(self.thread_id).is_some() {
            self.pending_count = self.pending_count.saturating_sub(1);
        }
        self.refresh();
    }

    /// Leave the protected region. Operations re-enter automatically.
    pub fn stop(&mut self) {
        if self.active {
            self.store.epoch().reentrant_unprotect(self.thread_id);
            self.active = false;
        }
    }

    // ---- operations ----

    /// Insert or update `key`.
    pub fn upsert(&mut self, key: K, value: V) -> Result<(), Status> {
        self.ensure_started();
        let result = self.upsert_internal(&key, &value);
        self.maybe_refresh();
        result
    }

    /// Read the latest value for `key`, or `None` if absent or deleted.
    pub fn read(&mut self, key: &K) -> Result<Option<V>, Status> {
        self.ensure_started();
        let result = self.read_internal(key);
        self.maybe_refresh();
        result
    }

    /// Append a tombstone for `key`. `Err(NotFound)` if no chain exists.
    pub fn delete(&mut self, key: &K) -> Result<(), Status> {
        self.ensure_started();
        let result = self.delete_internal(key);
        self.maybe_refresh();
        result
    }

    /// Compact the log prefix `[BeginAddress, until)` with default liveness.
    pub fn compact(&mut self, until: Address, kind: CompactionType) -> Result<Address, Status> {
        self.compact_with(&CompactionFunctions::default(), until, kind)
    }

    /// Compact with caller-provided liveness functions.
    pub fn compact_with(
        &mut self,
        cf: &CompactionFunctions<K, V>,
        until: Address,
        kind: CompactionType,
    ) -> Result<Address, Status> {
        self.ensure_started();
        match kind {
            CompactionType::Lookup => compaction::compact_lookup(self, cf, until),
            CompactionType::Scan => compaction::compact_scan(self, cf, until),
        }
    }

    // ---- internals ----

    fn upsert_internal(&mut self, key: &K, value: &V) -> Result<(), Status> {
        let hash = key.get_hash();
        let store = self.store;
        let hlog = store.hybrid_log();

        loop {
            let head = store.index().entry(hash);

            // In-place update if the chain head is this key, mutable, and
            // live. The checkpointing regime suppresses in-place updates so
            // every write lands at the tail.
            if let Some(head_addr) = head {
                if head_addr >= hlog.read_only_address()
                    && head_addr >= hlog.head_address()
                    && !hlog.inner().is_checkpointing()
                {
                    // SAFETY: the session holds epoch protection and the
                    // address is at or above the head.
                    if let Some(ptr) = unsafe { hlog.inner().record_ptr(head_addr) } {
                        let record = unsafe { &mut *(ptr as *mut Record<K, V>) };
                        if unsafe { record.key() } == key && !record.header.is_tombstone() {
                            let dst = unsafe { record.value_mut() };
                            if (store.functions.concurrent_writer)(key, value, dst) {
                                return Ok(());
                            }
                        }
                    }
                }
            }

            let address = self.append_record(hash, head, key, value, false)?;
            if address.is_some() {
                return Ok(());
            }
            // Lost the publish race: retry against the new chain head.
        }
    }

    fn read_internal(&mut self, key: &K) -> Result<Option<V>, Status> {
        let store = self.store;
        let hlog = store.hybrid_log();
        let begin = hlog.begin_address();
        let mut cursor = store.index().entry(key.get_hash());

        while let Some(address) = cursor {
            if !address.is_valid() || address < begin {
                return Ok(None);
            }

            if address >= hlog.head_address() {
                // SAFETY: epoch-protected in-memory access.
                if let Some(ptr) = unsafe { hlog.inner().record_ptr(address) } {
                    let record = unsafe { &*(ptr as *const Record<K, V>) };
                    if unsafe { record.key() } == key {
                        if record.header.is_tombstone() {
                            return Ok(None);
                        }
                        return Ok(Some(*unsafe { record.value() }));
                    }
                    cursor = Some(record.header.previous_address());
                    continue;
                }
                // The page raced out of memory; fall through to the device.
            }

            let bytes = self.read_record_bytes(address)?;
            let info = Record::<K, V>::info_from_bytes(&bytes);
            if info.is_null() {
                return Ok(None);
            }
            if Record::<K, V>::key_from_bytes(&bytes) == *key {
                if info.is_tombstone() {
                    return Ok(None);
                }
                return Ok(Some(Record::<K, V>::value_from_bytes(&bytes)));
            }
            cursor = Some(info.previous_address());
        }

        Ok(None)
    }

    fn delete_internal(&mut self, key: &K) -> Result<(), Status> {
        let hash = key.get_hash();
        loop {
            let head = self.store.index().entry(hash);
            if head.is_none() {
                return Err(Status::NotFound);
            }
            let address = self.append_record(hash, head, key, &V::zeroed(), true)?;
            if address.is_some() {
                return Ok(());
            }
        }
    }

    /// Append a record for `key` linked to `head` and publish it. Returns
    /// `Ok(None)` if another writer got in first (caller retries).
    fn append_record(
        &mut self,
        hash: u64,
        head: Option<Address>,
        key: &K,
        value: &V,
        tombstone: bool,
    ) -> Result<Option<Address>, Status> {
        let store = self.store;
        let hlog = store.hybrid_log();

        let address = hlog.allocate(TideKv::<K, V, D>::record_size())?;
        let previous = head.unwrap_or(Address::INVALID);
        let header =
            RecordInfo::new(previous, store.current_version(), false, tombstone, head.is_none());

        // SAFETY: the reservation at `address` belongs to this thread.
        unsafe {
            let ptr = hlog.inner().record_ptr(address).ok_or(Status::AllocatorClosed)?;
            Record::<K, V>::write_into(ptr, header, key, &V::zeroed());
            let dst = &mut *(ptr.add(Record::<K, V>::value_offset()) as *mut V);
            (store.functions.single_writer)(key, value, dst);
        }

        match store.index().try_update(hash, head, address) {
            Ok(()) => Ok(Some(address)),
            Err(_) => {
                // SAFETY: the record is ours and unpublished.
                unsafe {
                    if let Some(ptr) = hlog.inner().record_ptr(address) {
                        (*(ptr as *const Record<K, V>)).header.set_invalid(true);
                    }
                }
                Ok(None)
            }
        }
    }

    /// Whether the hash chain holds any record for `key` at an address at or
    /// above `min_address`.
    pub(crate) fn chain_contains_at_or_above(
        &mut self,
        key: &K,
        min_address: Address,
    ) -> Result<bool, Status> {
        let store = self.store;
        let hlog = store.hybrid_log();
        let mut cursor = store.index().entry(key.get_hash());

        while let Some(address) = cursor {
            if !address.is_valid() || address < min_address {
                return Ok(false);
            }

            if address >= hlog.head_address() {
                // SAFETY: epoch-protected in-memory access.
                if let Some(ptr) = unsafe { hlog.inner().record_ptr(address) } {
                    let record = unsafe { &*(ptr as *const Record<K, V>) };
                    if unsafe { record.key() } == key {
                        return Ok(true);
                    }
                    cursor = Some(record.header.previous_address());
                    continue;
                }
            }

            let bytes = self.read_record_bytes(address)?;
            let info = Record::<K, V>::info_from_bytes(&bytes);
            if info.is_null() {
                return Ok(false);
            }
            if Record::<K, V>::key_from_bytes(&bytes) == *key {
                return Ok(true);
            }
            cursor = Some(info.previous_address());
        }
        Ok(false)
    }

    /// Conditionally re-append `(key, value)` at the tail: the copy is
    /// dropped if the chain already holds a record for `key` at or above
    /// `min_address` (the source is superseded). Returns whether a copy was
    /// appended.
    pub(crate) fn compaction_copy_to_tail(
        &mut self,
        key: &K,
        value: &V,
        min_address: Address,
    ) -> Result<bool, Status> {
        let hash = key.get_hash();
        loop {
            if self.chain_contains_at_or_above(key, min_address)? {
                return Ok(false);
            }
            let head = self.store.index().entry(hash);
            if self.append_record(hash, head, key, value, false)?.is_some() {
                return Ok(true);
            }
            // Publish race: a concurrent writer changed the chain; re-check.
        }
    }

    /// Read the raw bytes of the record at `address` through the pending-I/O
    /// path.
    pub(crate) fn read_record_bytes(&mut self, address: Address) -> Result<Vec<u8>, Status> {
        let store = self.store;
        let offset = store.hybrid_log().inner().byte_offset(address);
        let len = TideKv::<K, V, D>::record_size() as usize;

        self.pending_count += 1;
        if !store.pending.submit_read(self.thread_id, address, offset, len) {
            self.pending_count -= 1;
            return Err(Status::IoError);
        }

        loop {
            if let Some(completion) = store.pending.poll(self.thread_id) {
                self.pending_count = self.pending_count.saturating_sub(1);
                self.io_ops += 1;
                return completion.result.map_err(|_| Status::IoError);
            }
            std::thread::yield_now();
        }
    }
}

impl<K: Key, V: Value, D: StorageDevice> Drop for Session<'_, K, V, D> {
    fn drop(&mut self) {
        self.stop();
    }
}
