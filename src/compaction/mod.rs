//! Log compaction.
//!
//! Both strategies relocate the live records of `[BeginAddress, until)` to
//! the tail and then retire the prefix by shifting the begin address:
//!
//! - **Lookup** trusts the hash index: a single pass re-appends every record
//!   that is live and not superseded by a chain entry at a higher address.
//! - **Scan** reconstructs per-key latest-version knowledge itself, using a
//!   transient in-memory buffer, for callers who want survivor selection
//!   independent of index state.

mod compact;
mod temp_kv;

pub use compact::{compact_lookup, compact_scan, CompactionStats};
pub(crate) use temp_kv::TempKv;

use crate::record::{Key, Value};
use crate::status::Status;

/// Which compaction strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionType {
    /// Use the hash index to detect superseding versions
    Lookup,
    /// Reconstruct latest-version knowledge with a second pass
    Scan,
}

impl CompactionType {
    /// Parse a strategy name (`"lookup"` or `"scan"`).
    pub fn parse(name: &str) -> Result<Self, Status> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lookup" => Ok(Self::Lookup),
            "scan" => Ok(Self::Scan),
            _ => Err(Status::InvalidCompactionType),
        }
    }
}

/// Liveness capability record for compaction.
///
/// `is_deleted` lets callers declare records dead beyond tombstoning; the
/// default considers every non-tombstone record live.
#[derive(Clone, Copy)]
pub struct CompactionFunctions<K: Key, V: Value> {
    /// Returns `true` if the record should be dropped during compaction.
    pub is_deleted: fn(&K, &V) -> bool,
}

impl<K: Key, V: Value> Default for CompactionFunctions<K, V> {
    fn default() -> Self {
        Self {
            is_deleted: |_key, _value| false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_compaction_type() {
        assert_eq!(CompactionType::parse("lookup").unwrap(), CompactionType::Lookup);
        assert_eq!(CompactionType::parse(" Scan ").unwrap(), CompactionType::Scan);
        assert_eq!(
            CompactionType::parse("merge").unwrap_err(),
            Status::InvalidCompactionType
        );
    }

    #[test]
    fn default_liveness_keeps_everything() {
        let cf = CompactionFunctions::<u64, u64>::default();
        assert!(!(cf.is_deleted)(&1, &2));
    }
}
