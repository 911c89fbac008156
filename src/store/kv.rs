//! The store: hash index + hybrid log + sessions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::allocator::{HybridLog, HybridLogConfig};
use crate::device::StorageDevice;
use crate::epoch::LightEpoch;
use crate::index::HashIndex;
use crate::log::LogAccessor;
use crate::record::{Key, Record, Value};
use crate::status::Status;
use crate::store::functions::StoreFunctions;
use crate::store::pending_io::PendingIoManager;
use crate::store::session::Session;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of hash index buckets (rounded up to a power of two)
    pub table_size: u64,
    /// Hybrid log configuration
    pub log: HybridLogConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_size: 1 << 16,
            log: HybridLogConfig::default(),
        }
    }
}

/// A key-value store over a hybrid log.
///
/// Client operations go through [`Session`]s started with
/// [`TideKv::start_session`]; the log surface (shifts, flushes, scans,
/// subscriptions) is exposed via [`TideKv::log`].
pub struct TideKv<K: Key, V: Value, D: StorageDevice> {
    epoch: Arc<LightEpoch>,
    index: HashIndex,
    log: LogAccessor<K, V, D>,
    pub(crate) pending: PendingIoManager,
    pub(crate) functions: StoreFunctions<K, V>,
    version: AtomicU32,
}

impl<K: Key, V: Value, D: StorageDevice> TideKv<K, V, D> {
    /// Create a store with default write functions.
    pub fn new(config: StoreConfig, device: D) -> Result<Self, Status> {
        Self::with_functions(config, device, StoreFunctions::default())
    }

    /// Create a store with custom write functions.
    pub fn with_functions(
        config: StoreConfig,
        device: D,
        functions: StoreFunctions<K, V>,
    ) -> Result<Self, Status> {
        let device = Arc::new(device);
        let epoch = Arc::new(LightEpoch::new());
        let hlog = HybridLog::new(config.log, Arc::clone(&device), Arc::clone(&epoch))?;
        let index = HashIndex::new(config.table_size)?;
        let pending = PendingIoManager::new(device);

        Ok(Self {
            epoch,
            index,
            log: LogAccessor::new(hlog),
            pending,
            functions,
            version: AtomicU32::new(0),
        })
    }

    /// The epoch instance shared by the log and all sessions
    pub fn epoch(&self) -> &Arc<LightEpoch> {
        &self.epoch
    }

    /// The log accessor
    pub fn log(&self) -> &LogAccessor<K, V, D> {
        &self.log
    }

    /// The hash index
    pub fn index(&self) -> &HashIndex {
        &self.index
    }

    /// Start a session for the calling thread.
    pub fn start_session(&self) -> Result<Session<'_, K, V, D>, Status> {
        Session::new(self)
    }

    /// Record version stamped into new records
    pub(crate) fn current_version(&self) -> u16 {
        (self.version.load(Ordering::Acquire) & 0x1fff) as u16
    }

    /// Toggle the checkpointing regime. Activation bumps the record version
    /// so records written under the new regime are distinguishable.
    pub fn set_checkpointing(&self, active: bool) {
        if active {
            self.version.fetch_add(1, Ordering::AcqRel);
        }
        self.log.set_checkpointing(active);
    }

    /// Fixed record footprint for this store's key/value types
    #[inline]
    pub(crate) fn record_size() -> u32 {
        Record::<K, V>::size() as u32
    }

    pub(crate) fn hybrid_log(&self) -> &HybridLog<K, V, D> {
        self.log.hybrid_log()
    }
}

impl<K: Key, V: Value, D: StorageDevice> Drop for TideKv<K, V, D> {
    fn drop(&mut self) {
        self.pending.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    fn small_config() -> StoreConfig {
        StoreConfig {
            table_size: 1024,
            log: HybridLogConfig {
                page_size_bits: 12,
                buffer_size: 8,
                empty_page_count: 1,
                mutable_fraction: 0.5,
            },
        }
    }

    #[test]
    fn upsert_and_read() {
        let store = TideKv::<u64, u64, _>::new(small_config(), MemoryDevice::new()).unwrap();
        let mut session = store.start_session().unwrap();

        session.upsert(42, 100).unwrap();
        assert_eq!(session.read(&42).unwrap(), Some(100));
    }

    #[test]
    fn read_missing_key() {
        let store = TideKv::<u64, u64, _>::new(small_config(), MemoryDevice::new()).unwrap();
        let mut session = store.start_session().unwrap();

        assert_eq!(session.read(&999).unwrap(), None);
    }

    #[test]
    fn upsert_overwrites() {
        let store = TideKv::<u64, u64, _>::new(small_config(), MemoryDevice::new()).unwrap();
        let mut session = store.start_session().unwrap();

        session.upsert(1, 10).unwrap();
        session.upsert(1, 20).unwrap();
        assert_eq!(session.read(&1).unwrap(), Some(20));
    }

    #[test]
    fn delete_hides_key() {
        let store = TideKv::<u64, u64, _>::new(small_config(), MemoryDevice::new()).unwrap();
        let mut session = store.start_session().unwrap();

        session.upsert(7, 70).unwrap();
        assert_eq!(session.read(&7).unwrap(), Some(70));

        session.delete(&7).unwrap();
        assert_eq!(session.read(&7).unwrap(), None);
    }

    #[test]
    fn many_keys_round_trip() {
        let store = TideKv::<u64, u64, _>::new(small_config(), MemoryDevice::new()).unwrap();
        let mut session = store.start_session().unwrap();

        for i in 0..500u64 {
            session.upsert(i, i * 3).unwrap();
        }
        for i in 0..500u64 {
            assert_eq!(session.read(&i).unwrap(), Some(i * 3), "key {i}");
        }
    }

    #[test]
    fn reads_follow_records_to_the_device() {
        let store = TideKv::<u64, u64, _>::new(small_config(), MemoryDevice::new()).unwrap();
        let mut session = store.start_session().unwrap();

        for i in 0..200u64 {
            session.upsert(i, i + 1).unwrap();
        }
        drop(session);

        store.log().flush_and_evict(true).unwrap();

        let mut session = store.start_session().unwrap();
        for i in 0..200u64 {
            assert_eq!(session.read(&i).unwrap(), Some(i + 1), "key {i}");
        }
    }

    #[test]
    fn custom_writer_slot_is_used() {
        let functions = StoreFunctions::<u64, u64> {
            single_writer: |_k, src, dst| *dst = src + 1,
            ..Default::default()
        };
        let store =
            TideKv::<u64, u64, _>::with_functions(small_config(), MemoryDevice::new(), functions)
                .unwrap();
        let mut session = store.start_session().unwrap();

        session.upsert(1, 10).unwrap();
        // The concurrent writer only applies to in-place updates; the first
        // write goes through single_writer.
        assert_eq!(session.read(&1).unwrap(), Some(11));
    }
}
