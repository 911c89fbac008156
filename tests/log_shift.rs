//! Shift, wait and observer integration tests for the log accessor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use tidelog::allocator::HybridLogConfig;
use tidelog::device::MemoryDevice;
use tidelog::log::LogAccessor;
use tidelog::scan::{LogIterator, ScanBufferingMode};
use tidelog::store::{StoreConfig, TideKv};
use tidelog::Address;

fn log_config() -> HybridLogConfig {
    HybridLogConfig {
        page_size_bits: 12,
        buffer_size: 16,
        empty_page_count: 1,
        mutable_fraction: 0.5,
    }
}

fn store_config() -> StoreConfig {
    StoreConfig {
        table_size: 4096,
        log: log_config(),
    }
}

#[test]
fn cursor_chain_stays_monotone_under_concurrent_inserts() {
    let store = TideKv::<u64, u64, _>::new(store_config(), MemoryDevice::new()).unwrap();
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for t in 0..4u64 {
            let store = &store;
            scope.spawn(move || {
                let mut session = store.start_session().unwrap();
                for i in 0..1500u64 {
                    session.upsert(t * 10_000 + i, i).unwrap();
                }
            });
        }

        let store = &store;
        let done = &done;
        scope.spawn(move || {
            while !done.load(Ordering::Acquire) {
                let stats = store.log().stats();
                assert!(stats.is_chain_monotone(), "cursor chain inverted: {stats}");
                std::thread::yield_now();
            }
        });

        // Scope joins the writers; then stop the checker.
        for _ in 0..50 {
            let stats = store.log().stats();
            assert!(stats.is_chain_monotone(), "cursor chain inverted: {stats}");
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        done.store(true, Ordering::Release);
    });

    let stats = store.log().stats();
    assert!(stats.is_chain_monotone(), "cursor chain inverted at rest: {stats}");
}

#[test]
fn flush_precedes_close() {
    let store = TideKv::<u64, u64, _>::new(store_config(), MemoryDevice::new()).unwrap();
    let mut session = store.start_session().unwrap();

    for round in 0..10u64 {
        for i in 0..300u64 {
            session.upsert(round * 1000 + i, i).unwrap();
        }
        store.log().flush_and_evict(true).unwrap();

        let stats = store.log().stats();
        assert!(
            stats.flushed_until_address >= stats.safe_head_address,
            "eviction outran durability: {stats}"
        );
    }
}

#[test]
fn shift_read_only_wait_reaches_durability() {
    let log: LogAccessor<u64, u64, _> =
        LogAccessor::create(log_config(), Arc::new(MemoryDevice::new())).unwrap();

    log.hybrid_log().allocate(3000).unwrap();
    let target = log.tail_address();

    log.shift_read_only_address(target, true).unwrap();
    assert!(log.flushed_until_address() >= target);
    assert!(log.safe_read_only_address() >= target);
}

#[test]
fn shift_head_wait_reaches_safe_head() {
    let log: LogAccessor<u64, u64, _> =
        LogAccessor::create(log_config(), Arc::new(MemoryDevice::new())).unwrap();

    for _ in 0..40 {
        log.hybrid_log().allocate(500).unwrap();
    }
    let target = log.tail_address();

    log.shift_head_address(target, true).unwrap();
    assert!(log.safe_head_address() >= target);
    assert!(log.stats().is_chain_monotone());
}

#[test]
fn set_empty_page_count_shrinks_the_resident_window() {
    let store = TideKv::<u64, u64, _>::new(store_config(), MemoryDevice::new()).unwrap();
    let mut session = store.start_session().unwrap();

    // Spread records across many pages.
    for i in 0..3000u64 {
        session.upsert(i, i).unwrap();
    }
    drop(session);

    store.log().set_empty_page_count(12, true).unwrap();

    let stats = store.log().stats();
    let resident_pages = stats.tail_address.page() - stats.head_address.page();
    assert!(resident_pages <= 4, "still {resident_pages} resident pages: {stats}");

    // All data remains readable through the device.
    let mut session = store.start_session().unwrap();
    for i in 0..3000u64 {
        assert_eq!(session.read(&i).unwrap(), Some(i), "key {i}");
    }
}

type Ranges = Arc<Mutex<Vec<(Address, Address)>>>;

#[test]
fn read_only_observer_sees_contiguous_disjoint_ranges() {
    let store = TideKv::<u64, u64, _>::new(store_config(), MemoryDevice::new()).unwrap();

    let ranges: Ranges = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ranges);
    let observer = move |iter: &mut LogIterator<u64, u64, MemoryDevice>| {
        let start = iter.next_address();
        let end = iter.end_address();
        let mut records = 0u64;
        while iter.get_next().is_some() {
            records += 1;
        }
        assert!(records > 0, "empty observer batch [{start}, {end})");
        sink.lock().push((start, end));
    };

    // Subscription starts at the current safe read-only address.
    let subscribe_point = store.log().safe_read_only_address();
    let _handle = store.log().subscribe(Arc::new(observer));

    let mut session = store.start_session().unwrap();
    for batch in 0..3u64 {
        for i in 0..40u64 {
            session.upsert(batch * 100 + i, i).unwrap();
        }
        drop(session);
        store.log().flush(true).unwrap();
        session = store.start_session().unwrap();
    }

    let final_safe_ro = store.log().safe_read_only_address();
    let ranges = ranges.lock();

    assert!(ranges.len() >= 3, "expected at least three batches, got {}", ranges.len());
    assert_eq!(ranges[0].0, subscribe_point);
    for window in ranges.windows(2) {
        assert_eq!(window[0].1, window[1].0, "gap or overlap between batches");
    }
    assert_eq!(ranges.last().unwrap().1, final_safe_ro);
}

#[test]
fn eviction_observer_sees_the_evicted_range() {
    let store = TideKv::<u64, u64, _>::new(store_config(), MemoryDevice::new()).unwrap();

    let ranges: Ranges = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ranges);
    let observer = move |iter: &mut LogIterator<u64, u64, MemoryDevice>| {
        sink.lock().push((iter.next_address(), iter.end_address()));
    };

    let start = store.log().safe_head_address();
    let _handle = store.log().subscribe_evictions(Arc::new(observer));

    let mut session = store.start_session().unwrap();
    for i in 0..200u64 {
        session.upsert(i, i).unwrap();
    }
    drop(session);

    store.log().flush_and_evict(true).unwrap();
    let end = store.log().safe_head_address();

    let ranges = ranges.lock();
    assert!(!ranges.is_empty());
    assert_eq!(ranges.first().unwrap().0, start);
    assert_eq!(ranges.last().unwrap().1, end);
}

#[test]
fn shifted_boundaries_sit_on_record_edges() {
    let store = TideKv::<u64, u64, _>::new(store_config(), MemoryDevice::new()).unwrap();
    let mut session = store.start_session().unwrap();

    for i in 0..500u64 {
        session.upsert(i, i).unwrap();
    }
    let until = store.log().tail_address();
    store.log().flush_and_evict(true).unwrap();

    let reached = session.compact(until, tidelog::CompactionType::Lookup).unwrap();
    assert_eq!(reached, until);
    assert_eq!(store.log().begin_address(), reached);

    // A scan starting exactly at the shifted boundary parses cleanly and
    // finds every relocated record.
    let mut iter = store.log().scan(
        store.log().begin_address(),
        store.log().tail_address(),
        ScanBufferingMode::SinglePage,
        true,
    );
    let mut seen = 0;
    while let Some(entry) = iter.get_next() {
        assert!(entry.address >= reached);
        seen += 1;
    }
    assert_eq!(seen, 500);
}
