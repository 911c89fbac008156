//! Iterator contract tests across buffering modes and storage tiers.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;

use tidelog::allocator::HybridLogConfig;
use tidelog::device::MemoryDevice;
use tidelog::scan::ScanBufferingMode;
use tidelog::store::{StoreConfig, TideKv};
use tidelog::Address;

fn test_config() -> StoreConfig {
    StoreConfig {
        table_size: 4096,
        log: HybridLogConfig {
            page_size_bits: 12,
            buffer_size: 16,
            empty_page_count: 1,
            mutable_fraction: 0.5,
        },
    }
}

fn new_store() -> TideKv<u64, u64, Arc<MemoryDevice>> {
    TideKv::new(test_config(), Arc::new(MemoryDevice::new())).unwrap()
}

#[test]
fn all_buffering_modes_agree_on_evicted_data() {
    let store = new_store();
    let mut session = store.start_session().unwrap();

    for i in 0..500u64 {
        session.upsert(i, i * 2).unwrap();
    }
    drop(session);

    store.log().flush_and_evict(true).unwrap();

    for mode in [
        ScanBufferingMode::NoBuffering,
        ScanBufferingMode::SinglePage,
        ScanBufferingMode::DoublePage,
    ] {
        let mut iter = store.log().scan(
            store.log().begin_address(),
            store.log().safe_read_only_address(),
            mode,
            false,
        );

        let mut expected = 0u64;
        let mut last = Address::INVALID;
        while let Some(entry) = iter.get_next() {
            let address = entry.address;
            let next_address = entry.next_address;
            assert_eq!(*entry.key, expected, "{mode:?}");
            assert_eq!(*entry.value, expected * 2, "{mode:?}");
            assert!(last == Address::INVALID || address > last);
            last = address;
            assert_eq!(next_address, iter.next_address());
            expected += 1;
        }
        assert_eq!(expected, 500, "{mode:?}");
    }
}

#[test]
fn scan_spans_memory_and_device() {
    let store = new_store();
    let mut session = store.start_session().unwrap();

    for i in 0..300u64 {
        session.upsert(i, i).unwrap();
    }
    drop(session);
    store.log().flush_and_evict(true).unwrap();

    // A second wave stays in memory.
    let mut session = store.start_session().unwrap();
    for i in 300..600u64 {
        session.upsert(i, i).unwrap();
    }
    drop(session);

    let mut iter = store.log().scan(
        store.log().begin_address(),
        store.log().tail_address(),
        ScanBufferingMode::DoublePage,
        true,
    );

    let mut expected = 0u64;
    while let Some(entry) = iter.get_next() {
        assert_eq!(*entry.key, expected);
        expected += 1;
    }
    assert_eq!(expected, 600);
}

#[test]
fn tombstones_are_produced_not_filtered() {
    let store = new_store();
    let mut session = store.start_session().unwrap();

    for i in 0..100u64 {
        session.upsert(i, i).unwrap();
    }
    for i in (0..100u64).step_by(5) {
        session.delete(&i).unwrap();
    }
    drop(session);
    store.log().flush(true).unwrap();

    let mut iter = store.log().scan(
        store.log().begin_address(),
        store.log().safe_read_only_address(),
        ScanBufferingMode::SinglePage,
        false,
    );

    let mut live = 0u64;
    let mut tombstones = 0u64;
    while let Some(entry) = iter.get_next() {
        if entry.info.is_tombstone() {
            tombstones += 1;
        } else {
            live += 1;
        }
    }
    assert_eq!(live, 100);
    assert_eq!(tombstones, 20);
}

#[test]
fn iteration_is_non_restartable_and_finite() {
    let store = new_store();
    let mut session = store.start_session().unwrap();

    for i in 0..50u64 {
        session.upsert(i, i).unwrap();
    }
    drop(session);
    store.log().flush(true).unwrap();

    let mut iter = store.log().scan(
        store.log().begin_address(),
        store.log().safe_read_only_address(),
        ScanBufferingMode::SinglePage,
        false,
    );

    while iter.get_next().is_some() {}
    // Exhaustion is sticky.
    assert!(iter.get_next().is_none());
    assert!(iter.get_next().is_none());
    assert_eq!(iter.records_returned(), 50);
}

#[test]
fn randomized_workload_scan_matches_point_reads() {
    let store = new_store();
    let mut session = store.start_session().unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x7464_6c67);

    let mut keys: Vec<u64> = (0..400).collect();
    keys.shuffle(&mut rng);

    // Several overwrite rounds in random order.
    for round in 0..3u64 {
        keys.shuffle(&mut rng);
        for &k in &keys {
            session.upsert(k, k + round * 1000).unwrap();
        }
    }
    drop(session);
    store.log().flush(true).unwrap();

    // The last record for each key in scan order equals the point-read value.
    let mut latest = std::collections::HashMap::new();
    let mut iter = store.log().scan(
        store.log().begin_address(),
        store.log().safe_read_only_address(),
        ScanBufferingMode::DoublePage,
        false,
    );
    while let Some(entry) = iter.get_next() {
        latest.insert(*entry.key, *entry.value);
    }

    let mut session = store.start_session().unwrap();
    for &k in &keys {
        assert_eq!(session.read(&k).unwrap(), latest.get(&k).copied(), "key {k}");
    }
}
