//! The two compaction strategies.

use tracing::debug;

use crate::address::Address;
use crate::compaction::{CompactionFunctions, TempKv};
use crate::constants::PENDING_DRAIN_THRESHOLD;
use crate::device::StorageDevice;
use crate::log::LogAccessor;
use crate::record::{Key, Value};
use crate::scan::ScanBufferingMode;
use crate::status::Status;
use crate::store::Session;

/// Counters accumulated during a compaction run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactionStats {
    /// Records examined in the compacted range
    pub records_scanned: u64,
    /// Live records re-appended at the tail
    pub records_copied: u64,
    /// Records dropped as dead or superseded
    pub records_skipped: u64,
    /// Tombstones encountered
    pub tombstones_seen: u64,
}

/// Validate `until` against the safe read-only boundary and fetch the scan
/// base. `Ok(None)` means there is nothing to compact.
fn compaction_range<K: Key, V: Value, D: StorageDevice>(
    log: &LogAccessor<K, V, D>,
    until: Address,
) -> Result<Option<Address>, Status> {
    if until > log.safe_read_only_address() {
        return Err(Status::CompactionBoundary);
    }
    let begin = log.begin_address();
    if until <= begin {
        return Ok(None);
    }
    Ok(Some(begin))
}

/// Lookup compaction: one pass over `[BeginAddress, until)`, consulting the
/// hash index to detect superseding versions.
///
/// For each live record the copy-to-tail boundary is the record's own next
/// address: any record of the same key at or past it supersedes the
/// candidate. Returns the boundary the begin address was shifted to.
pub fn compact_lookup<K: Key, V: Value, D: StorageDevice>(
    session: &mut Session<'_, K, V, D>,
    cf: &CompactionFunctions<K, V>,
    until: Address,
) -> Result<Address, Status> {
    let store = session.store();
    let log = store.log();

    let Some(begin) = compaction_range(log, until)? else {
        return Ok(log.begin_address());
    };

    let mut stats = CompactionStats::default();
    let mut boundary = until;
    let mut since_drain: u32 = 0;

    let mut iter = log.scan(begin, until, ScanBufferingMode::DoublePage, false);
    while let Some(entry) = iter.get_next() {
        stats.records_scanned += 1;
        let key = *entry.key;
        let value = *entry.value;
        let next_address = entry.next_address;
        let tombstone = entry.info.is_tombstone();

        if tombstone {
            stats.tombstones_seen += 1;
        }

        if !tombstone && !(cf.is_deleted)(&key, &value) {
            if session.compaction_copy_to_tail(&key, &value, next_address)? {
                stats.records_copied += 1;
            } else {
                stats.records_skipped += 1;
            }
        } else {
            stats.records_skipped += 1;
        }

        // Keep the shift boundary on a record edge.
        boundary = next_address;

        since_drain += 1;
        if since_drain >= PENDING_DRAIN_THRESHOLD || session.pending_count() >= PENDING_DRAIN_THRESHOLD
        {
            session.complete_pending();
            since_drain = 0;
        }
    }
    drop(iter);
    session.complete_pending();

    log.shift_begin_address(boundary, false, false)?;
    store.index().garbage_collect(log.begin_address());
    session.refresh();

    debug!(?stats, %boundary, "lookup compaction finished");
    Ok(boundary)
}

/// Scan compaction: reconstruct per-key latest-version knowledge in a
/// transient buffer, then re-append the survivors.
///
/// The catch-up passes delete from the buffer every key seen in the newer
/// immutable region: a later version there means the buffered version is
/// stale and must not be resurrected. Returns the boundary the begin address
/// was shifted to.
pub fn compact_scan<K: Key, V: Value, D: StorageDevice>(
    session: &mut Session<'_, K, V, D>,
    cf: &CompactionFunctions<K, V>,
    until: Address,
) -> Result<Address, Status> {
    let store = session.store();
    let log = store.log();

    let Some(begin) = compaction_range(log, until)? else {
        return Ok(log.begin_address());
    };

    let mut stats = CompactionStats::default();
    let mut temp = TempKv::<K, V>::new();

    // Pass 1: fold the compacted range into the buffer.
    let mut original_until = until;
    {
        let mut iter = log.scan(begin, until, ScanBufferingMode::DoublePage, false);
        while let Some(entry) = iter.get_next() {
            stats.records_scanned += 1;
            let key = *entry.key;
            let value = *entry.value;
            if entry.info.is_tombstone() {
                stats.tombstones_seen += 1;
                temp.delete(&key);
            } else if (cf.is_deleted)(&key, &value) {
                temp.delete(&key);
            } else {
                temp.upsert(key, value);
            }
            original_until = entry.next_address;
        }
    }

    // Pass 2: any later version in the newer immutable region invalidates
    // the buffered one.
    let mut scanned_until = original_until;
    catch_up_immutable_tail(log, &mut temp, &mut scanned_until);

    // Pass 3: re-append the survivors, re-checking the immutable tail as it
    // grows.
    let survivors = temp.snapshot();
    let mut since_drain: u32 = 0;
    for (temp_address, key, value) in survivors {
        catch_up_immutable_tail(log, &mut temp, &mut scanned_until);

        if temp.contains_key_in_memory(&key) != Some(temp_address) {
            stats.records_skipped += 1;
            continue;
        }

        // No record of this key below `scanned_until` can invalidate the
        // survivor; anything at or above it would have removed the entry in
        // the catch-up pass.
        let min_address = Address::from_control(scanned_until.control() - 1);
        if session.compaction_copy_to_tail(&key, &value, min_address)? {
            stats.records_copied += 1;
        } else {
            stats.records_skipped += 1;
        }

        since_drain += 1;
        if since_drain >= PENDING_DRAIN_THRESHOLD || session.pending_count() >= PENDING_DRAIN_THRESHOLD
        {
            session.complete_pending();
            since_drain = 0;
        }
    }
    session.complete_pending();

    log.shift_begin_address(original_until, false, false)?;
    store.index().garbage_collect(log.begin_address());
    session.refresh();

    debug!(?stats, %original_until, remaining = temp.len(), "scan compaction finished");
    Ok(original_until)
}

/// Delete from `temp` every key recorded in `[scanned_until, SafeReadOnlyAddress)`.
fn catch_up_immutable_tail<K: Key, V: Value, D: StorageDevice>(
    log: &LogAccessor<K, V, D>,
    temp: &mut TempKv<K, V>,
    scanned_until: &mut Address,
) {
    loop {
        let scan_until = log.safe_read_only_address();
        if *scanned_until >= scan_until {
            return;
        }

        let mut iter = log.scan(*scanned_until, scan_until, ScanBufferingMode::DoublePage, false);
        while let Some(entry) = iter.get_next() {
            temp.delete(entry.key);
            *scanned_until = entry.next_address;
        }
        *scanned_until = std::cmp::max(*scanned_until, scan_until);
    }
}
