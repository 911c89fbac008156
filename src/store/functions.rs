//! Capability record for store write paths.
//!
//! A plain struct of function slots rather than a trait hierarchy: default
//! behaviors are default slot values, and callers override only the slots
//! they care about.

use crate::record::{Key, Value};

/// Function slots invoked on the store's write paths.
#[derive(Clone, Copy)]
pub struct StoreFunctions<K: Key, V: Value> {
    /// Installs a value into a freshly allocated record (no concurrency:
    /// the record is not yet published).
    pub single_writer: fn(&K, &V, &mut V),
    /// Updates a value in place inside the mutable region. Returning `false`
    /// declines the in-place update and forces a new record at the tail.
    pub concurrent_writer: fn(&K, &V, &mut V) -> bool,
}

impl<K: Key, V: Value> Default for StoreFunctions<K, V> {
    fn default() -> Self {
        Self {
            single_writer: |_key, src, dst| *dst = *src,
            concurrent_writer: |_key, src, dst| {
                *dst = *src;
                true
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_slots_copy_the_source() {
        let fns = StoreFunctions::<u64, u64>::default();

        let mut dst = 0u64;
        (fns.single_writer)(&1, &42, &mut dst);
        assert_eq!(dst, 42);

        let mut dst = 0u64;
        assert!((fns.concurrent_writer)(&1, &7, &mut dst));
        assert_eq!(dst, 7);
    }

    #[test]
    fn slots_can_be_overridden() {
        let fns = StoreFunctions::<u64, u64> {
            concurrent_writer: |_, _, _| false,
            ..Default::default()
        };

        let mut dst = 5u64;
        assert!(!(fns.concurrent_writer)(&1, &7, &mut dst));
        assert_eq!(dst, 5);
    }
}
