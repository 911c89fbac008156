//! A fixed-size array of atomic bucket entries.
//!
//! Each bucket holds the address of the newest log record whose key hashes
//! into it; older records are reached through the `previous_address` links in
//! record headers. Publication is a CAS against the observed head, so a
//! racing writer detects interleaved updates and retries with the new chain.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::address::Address;
use crate::status::Status;

/// Bucket value meaning "no chain"
const EMPTY: u64 = 0;

/// The hash index.
pub struct HashIndex {
    buckets: Box<[AtomicU64]>,
    mask: u64,
}

impl HashIndex {
    /// Create an index with at least `table_size` buckets (rounded up to a
    /// power of two).
    pub fn new(table_size: u64) -> Result<Self, Status> {
        if table_size == 0 {
            return Err(Status::InvalidArgument);
        }
        let size = table_size.next_power_of_two();
        let buckets = (0..size).map(|_| AtomicU64::new(EMPTY)).collect::<Vec<_>>().into_boxed_slice();
        Ok(Self {
            buckets,
            mask: size - 1,
        })
    }

    /// Number of buckets
    pub fn table_size(&self) -> u64 {
        self.buckets.len() as u64
    }

    #[inline]
    fn bucket(&self, hash: u64) -> &AtomicU64 {
        &self.buckets[(hash & self.mask) as usize]
    }

    /// Chain head for `hash`, or `None` if the bucket is empty.
    #[inline]
    pub fn entry(&self, hash: u64) -> Option<Address> {
        match self.bucket(hash).load(Ordering::Acquire) {
            EMPTY => None,
            control => Some(Address::from_control(control)),
        }
    }

    /// Publish `new` as the chain head for `hash`, expecting the current
    /// head to be `expected`. Returns the observed head on failure.
    pub fn try_update(
        &self,
        hash: u64,
        expected: Option<Address>,
        new: Address,
    ) -> Result<(), Option<Address>> {
        let expected_control = expected.map_or(EMPTY, |a| a.control());
        match self.bucket(hash).compare_exchange(
            expected_control,
            new.control(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(EMPTY) => Err(None),
            Err(actual) => Err(Some(Address::from_control(actual))),
        }
    }

    /// Empty every bucket whose chain head sits below `begin_address`.
    ///
    /// A head below the begin address means the entire chain has been
    /// retired (any surviving record would have been re-published at the
    /// tail). Returns the number of buckets cleared.
    pub fn garbage_collect(&self, begin_address: Address) -> u64 {
        let mut cleared = 0;
        for bucket in self.buckets.iter() {
            loop {
                let current = bucket.load(Ordering::Acquire);
                if current == EMPTY || Address::from_control(current) >= begin_address {
                    break;
                }
                if bucket
                    .compare_exchange(current, EMPTY, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    cleared += 1;
                    break;
                }
            }
        }
        cleared
    }

    /// Number of non-empty buckets
    pub fn used_buckets(&self) -> u64 {
        self.buckets
            .iter()
            .filter(|b| b.load(Ordering::Relaxed) != EMPTY)
            .count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_size_rounds_up() {
        let index = HashIndex::new(1000).unwrap();
        assert_eq!(index.table_size(), 1024);
    }

    #[test]
    fn empty_bucket_reads_none() {
        let index = HashIndex::new(16).unwrap();
        assert_eq!(index.entry(42), None);
    }

    #[test]
    fn publish_and_replace() {
        let index = HashIndex::new(16).unwrap();
        let a1 = Address::new(0, 64);
        let a2 = Address::new(0, 128);

        index.try_update(7, None, a1).unwrap();
        assert_eq!(index.entry(7), Some(a1));

        index.try_update(7, Some(a1), a2).unwrap();
        assert_eq!(index.entry(7), Some(a2));
    }

    #[test]
    fn stale_publish_fails_with_observed_head() {
        let index = HashIndex::new(16).unwrap();
        let a1 = Address::new(0, 64);
        let a2 = Address::new(0, 128);

        index.try_update(7, None, a1).unwrap();
        let err = index.try_update(7, None, a2).unwrap_err();
        assert_eq!(err, Some(a1));
    }

    #[test]
    fn garbage_collect_clears_retired_chains() {
        let index = HashIndex::new(16).unwrap();
        index.try_update(1, None, Address::new(0, 64)).unwrap();
        index.try_update(2, None, Address::new(5, 64)).unwrap();

        let cleared = index.garbage_collect(Address::new(3, 0));
        assert_eq!(cleared, 1);
        assert_eq!(index.entry(1), None);
        assert_eq!(index.entry(2), Some(Address::new(5, 64)));
    }
}
