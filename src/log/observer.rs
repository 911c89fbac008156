//! Observer subscriptions for log region transitions.
//!
//! At most one observer is installed per event kind; a later subscription
//! silently replaces the earlier one. Observers see only events after
//! subscription; historical content is obtained via a scan.

use std::sync::Arc;

use crate::allocator::HlogInner;
use crate::device::StorageDevice;
use crate::record::{Key, Value};
use crate::scan::LogIterator;

/// Receives address-ordered record batches for a log event kind.
///
/// Read-only observers get one batch per safe-read-only transition, covering
/// exactly the newly immutable range; eviction observers get one batch per
/// safe-head transition, covering exactly the evicted range. Record borrows
/// obtained from the iterator must not outlive the callback.
pub trait LogObserver<K: Key, V: Value, D: StorageDevice>: Send + Sync + 'static {
    /// Called with an iterator spanning the transitioned range.
    fn on_next(&self, records: &mut LogIterator<K, V, D>);
}

impl<K: Key, V: Value, D: StorageDevice, F> LogObserver<K, V, D> for F
where
    F: Fn(&mut LogIterator<K, V, D>) + Send + Sync + 'static,
{
    fn on_next(&self, records: &mut LogIterator<K, V, D>) {
        self(records)
    }
}

/// Which observer slot a subscription occupies
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObserverKind {
    ReadOnly,
    Eviction,
}

/// Clears the observer slot on drop.
///
/// Dropping a handle that has already been replaced by a newer subscription
/// leaves the newer observer in place.
pub struct SubscriptionHandle<K: Key, V: Value, D: StorageDevice> {
    hlog: Arc<HlogInner<K, V, D>>,
    observer: Arc<dyn LogObserver<K, V, D>>,
    kind: ObserverKind,
}

impl<K: Key, V: Value, D: StorageDevice> SubscriptionHandle<K, V, D> {
    pub(crate) fn new(
        hlog: Arc<HlogInner<K, V, D>>,
        observer: Arc<dyn LogObserver<K, V, D>>,
        kind: ObserverKind,
    ) -> Self {
        Self {
            hlog,
            observer,
            kind,
        }
    }
}

impl<K: Key, V: Value, D: StorageDevice> Drop for SubscriptionHandle<K, V, D> {
    fn drop(&mut self) {
        let clear = |current: &Option<Arc<dyn LogObserver<K, V, D>>>| {
            current
                .as_ref()
                .is_some_and(|cur| Arc::ptr_eq(cur, &self.observer))
        };
        match self.kind {
            ObserverKind::ReadOnly => self.hlog.clear_read_only_observer_if(clear),
            ObserverKind::Eviction => self.hlog.clear_eviction_observer_if(clear),
        }
    }
}
