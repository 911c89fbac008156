//! Transient dedup buffer for scan compaction.
//!
//! An in-memory map with its own miniature address space: each upsert takes
//! a fresh monotonically increasing address, so iteration in address order
//! reproduces log order and `contains_key_in_memory` can confirm that an
//! entry is still the latest version for its key. Deletes remove entries
//! outright; nothing here ever touches a device.

use std::collections::{BTreeMap, HashMap};

use crate::record::{Key, Value};

/// In-memory latest-version buffer.
pub(crate) struct TempKv<K: Key, V: Value> {
    /// Latest live entry per key
    entries: HashMap<K, (u64, V)>,
    /// Live entries in address order
    order: BTreeMap<u64, K>,
    next_address: u64,
}

impl<K: Key, V: Value> TempKv<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_address: 0,
        }
    }

    /// Install `value` as the latest version of `key`.
    pub(crate) fn upsert(&mut self, key: K, value: V) {
        let address = self.next_address;
        self.next_address += 1;

        if let Some((old_address, _)) = self.entries.insert(key, (address, value)) {
            self.order.remove(&old_address);
        }
        self.order.insert(address, key);
    }

    /// Drop `key` entirely.
    pub(crate) fn delete(&mut self, key: &K) {
        if let Some((address, _)) = self.entries.remove(key) {
            self.order.remove(&address);
        }
    }

    /// Latest address for `key`, if it is live.
    pub(crate) fn contains_key_in_memory(&self, key: &K) -> Option<u64> {
        self.entries.get(key).map(|(address, _)| *address)
    }

    /// Snapshot of the live entries in address order.
    pub(crate) fn snapshot(&self) -> Vec<(u64, K, V)> {
        self.order
            .iter()
            .map(|(&address, key)| {
                let (_, value) = self.entries[key];
                (address, *key, value)
            })
            .collect()
    }

    /// Number of live entries
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_supersedes_in_address_order() {
        let mut kv = TempKv::<u64, u64>::new();
        kv.upsert(1, 10);
        kv.upsert(2, 20);
        kv.upsert(1, 11);

        let snapshot = kv.snapshot();
        assert_eq!(snapshot.len(), 2);
        // Key 2 now precedes key 1 in address order.
        assert_eq!(snapshot[0].1, 2);
        assert_eq!(snapshot[1], (2, 1, 11));
    }

    #[test]
    fn delete_removes_outright() {
        let mut kv = TempKv::<u64, u64>::new();
        kv.upsert(1, 10);
        kv.delete(&1);

        assert_eq!(kv.len(), 0);
        assert_eq!(kv.contains_key_in_memory(&1), None);
        assert!(kv.snapshot().is_empty());
    }

    #[test]
    fn contains_reports_latest_address() {
        let mut kv = TempKv::<u64, u64>::new();
        kv.upsert(1, 10);
        let first = kv.contains_key_in_memory(&1).unwrap();
        kv.upsert(1, 11);
        let second = kv.contains_key_in_memory(&1).unwrap();
        assert!(second > first);
    }

    #[test]
    fn delete_of_absent_key_is_a_no_op() {
        let mut kv = TempKv::<u64, u64>::new();
        kv.delete(&42);
        assert_eq!(kv.len(), 0);
    }
}
