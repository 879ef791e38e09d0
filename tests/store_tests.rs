//! Integration tests for Store
//!
//! These tests verify:
//! - Record round trips across block boundaries
//! - On-disk chain layout
//! - Free-block reuse and truncation
//! - SET / DEL semantics, including forced creation
//! - Ordering of conflicting operations issued without waiting
//! - Lifecycle (close, reopen, drop)

use std::fs;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use rastore::storage::{BLOCK_SIZE, DATA_HEADER_SIZE};
use rastore::{Config, Lifecycle, Store, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open(path: &Path) -> Store {
    Store::open_path(path).unwrap()
}

fn open_with(path: &Path, boundary: usize) -> Store {
    Store::open(
        Config::builder()
            .data_dir(path)
            .truncate_boundary(boundary)
            .build(),
    )
    .unwrap()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn data_len(blocks: u32) -> u64 {
    DATA_HEADER_SIZE + blocks as u64 * BLOCK_SIZE as u64
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_round_trip_lengths() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());

    for len in [0usize, 1, 255, 256, 510, 511, 1000] {
        let data = pattern(len);
        let id = store.put(data.clone()).wait().unwrap();
        let read = store.get(id).wait().unwrap().unwrap();
        assert_eq!(read, Bytes::from(data), "length {}", len);
    }
}

#[test]
fn test_empty_record_is_not_missing() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());

    let id = store.put(Vec::new()).wait().unwrap();

    assert_eq!(store.get(id).wait().unwrap(), Some(Bytes::new()));
    assert_eq!(store.get(id + 1).wait().unwrap(), None);
}

#[test]
fn test_example_scenario() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());

    assert_eq!(store.put(vec![1u8, 2, 3]).wait().unwrap(), 1);
    assert_eq!(store.put(vec![4u8, 5]).wait().unwrap(), 2);
    store.del(1).wait().unwrap();
    assert_eq!(store.put(vec![9u8]).wait().unwrap(), 1);

    assert_eq!(store.get(1).wait().unwrap().unwrap(), Bytes::from_static(&[9]));
    assert_eq!(store.get(2).wait().unwrap().unwrap(), Bytes::from_static(&[4, 5]));
}

#[test]
fn test_get_non_leading_block_is_none() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());

    let id = store.put(pattern(300)).wait().unwrap();

    assert_eq!(store.get(id + 1).wait().unwrap(), None);
    assert_eq!(store.get(1000).wait().unwrap(), None);
}

// =============================================================================
// On-Disk Layout Tests
// =============================================================================

#[test]
fn test_chain_layout_on_disk() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());
    store.put(pattern(600)).wait().unwrap();
    store.close().wait().unwrap();

    let raw = fs::read(temp.path().join("storage.blst")).unwrap();
    assert_eq!(raw.len() as u64, data_len(3));
    assert_eq!(raw[0], 0x01);
    assert_eq!(&raw[1..5], &3u32.to_le_bytes());

    let header = DATA_HEADER_SIZE as usize;
    let block = |id: usize| &raw[header + (id - 1) * BLOCK_SIZE..][..BLOCK_SIZE];
    assert_eq!(block(1)[0], 0xC0);
    assert_eq!(&block(1)[1..5], &2u32.to_le_bytes());
    assert_eq!(block(1)[5], 255);
    assert_eq!(block(2)[0], 0x80);
    assert_eq!(&block(2)[1..5], &3u32.to_le_bytes());
    assert_eq!(block(3)[0], 0x80);
    assert_eq!(&block(3)[1..5], &0u32.to_le_bytes());
    assert_eq!(block(3)[5], 90);
}

#[test]
fn test_freed_blocks_reused_without_growth() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());

    let first = store.put(pattern(600)).wait().unwrap();
    store.put(b"tail".to_vec()).wait().unwrap();
    store.del(first).wait().unwrap();

    let before = store.stats().wait().unwrap();
    assert_eq!(before.free_blocks, 3);

    let id = store.put(pattern(500)).wait().unwrap();
    let after = store.stats().wait().unwrap();

    assert_eq!(id, first);
    assert_eq!(after.total_blocks, before.total_blocks);
    assert_eq!(after.free_blocks, 1);
}

#[test]
fn test_trailing_free_blocks_truncated() {
    let temp = TempDir::new().unwrap();
    let store = open_with(temp.path(), 2);

    store.put(b"a".to_vec()).wait().unwrap();
    let tail = store.put(pattern(600)).wait().unwrap();
    assert_eq!(store.stats().wait().unwrap().data_file_len, data_len(4));

    store.del(tail).wait().unwrap();

    let stats = store.stats().wait().unwrap();
    assert_eq!(stats.total_blocks, 1);
    assert_eq!(stats.free_blocks, 0);
    assert_eq!(stats.data_file_len, data_len(1));
    assert_eq!(fs::metadata(temp.path().join("storage.blst")).unwrap().len(), data_len(1));
}

// =============================================================================
// SET Tests
// =============================================================================

#[test]
fn test_set_shrinks_and_grows() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());
    let id = store.put(pattern(600)).wait().unwrap();
    store.put(b"z".to_vec()).wait().unwrap();

    store.set(id, b"small".to_vec()).wait().unwrap();
    assert_eq!(store.get(id).wait().unwrap().unwrap(), Bytes::from_static(b"small"));
    let stats = store.stats().wait().unwrap();
    assert_eq!((stats.total_blocks, stats.free_blocks), (4, 2));

    let big = pattern(800);
    store.set(id, big.clone()).wait().unwrap();
    assert_eq!(store.get(id).wait().unwrap().unwrap(), Bytes::from(big));
    let stats = store.stats().wait().unwrap();
    assert_eq!((stats.total_blocks, stats.free_blocks), (5, 0));
}

#[test]
fn test_set_rejects_non_leading_and_unallocated() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());
    let id = store.put(pattern(300)).wait().unwrap();

    let err = store.set(id + 1, b"x".to_vec()).wait().unwrap_err();
    assert!(matches!(err, StoreError::Range(_)));

    let err = store.set(id + 2, b"x".to_vec()).wait().unwrap_err();
    assert!(matches!(err, StoreError::Range(_)));

    // Forcing never takes a block from another record.
    let err = store.set_with(id + 1, b"x".to_vec(), true).wait().unwrap_err();
    assert!(matches!(err, StoreError::Range(_)));
    assert_eq!(store.get(id).wait().unwrap().unwrap(), Bytes::from(pattern(300)));
}

#[test]
fn test_forced_set_beyond_end() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());

    store.set_with(5, b"five".to_vec(), true).wait().unwrap();

    assert_eq!(store.get(5).wait().unwrap().unwrap(), Bytes::from_static(b"five"));
    let stats = store.stats().wait().unwrap();
    assert_eq!((stats.total_blocks, stats.free_blocks), (5, 4));

    // Skipped ids are handed out first.
    assert_eq!(store.put(b"one".to_vec()).wait().unwrap(), 1);
}

#[test]
fn test_forced_set_on_freed_id() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());
    let id = store.put(b"old".to_vec()).wait().unwrap();
    store.put(b"keep".to_vec()).wait().unwrap();
    store.del(id).wait().unwrap();

    store.set_with(id, pattern(300), true).wait().unwrap();

    assert_eq!(store.get(id).wait().unwrap().unwrap(), Bytes::from(pattern(300)));
}

#[test]
fn test_set_invalidates_cache() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());
    let id = store.put(b"before".to_vec()).wait().unwrap();

    store.get(id).wait().unwrap();
    assert_eq!(store.stats().wait().unwrap().cached_entries, 1);

    store.set(id, b"after".to_vec()).wait().unwrap();
    assert_eq!(store.get(id).wait().unwrap().unwrap(), Bytes::from_static(b"after"));
}

// =============================================================================
// DEL Tests
// =============================================================================

#[test]
fn test_del_free_id_is_noop() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());

    store.del(1).wait().unwrap();
    store.del(42).wait().unwrap();

    assert_eq!(store.stats().wait().unwrap().total_blocks, 0);
}

#[test]
fn test_del_non_leading_rejected() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());
    let id = store.put(pattern(300)).wait().unwrap();

    let err = store.del(id + 1).wait().unwrap_err();
    assert!(matches!(err, StoreError::Range(_)));
    assert!(store.get(id).wait().unwrap().is_some());
}

#[test]
fn test_del_then_get_is_none() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());
    let id = store.put(b"gone".to_vec()).wait().unwrap();
    store.get(id).wait().unwrap();

    store.del(id).wait().unwrap();

    assert_eq!(store.get(id).wait().unwrap(), None);
}

// =============================================================================
// Id Validation Tests
// =============================================================================

#[test]
fn test_invalid_ids_rejected_immediately() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());

    for id in [0u64, u32::MAX as u64 + 1] {
        assert!(matches!(store.get(id).try_wait(), Some(Err(StoreError::Range(_)))));
        assert!(matches!(store.del(id).wait(), Err(StoreError::Range(_))));
        assert!(matches!(
            store.set_with(id, b"x".to_vec(), true).wait(),
            Err(StoreError::Range(_))
        ));
    }
}

#[test]
fn test_ids_beyond_max_blocks_rejected() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());

    // Far-off forced creation is refused before it is queued.
    let pending = store.set_with(u32::MAX as u64, b"x".to_vec(), true);
    assert!(matches!(pending.try_wait(), Some(Err(StoreError::Range(_)))));

    let stats = store.stats().wait().unwrap();
    assert_eq!((stats.total_blocks, stats.free_blocks), (0, 0));
    assert_eq!(fs::metadata(temp.path().join("storage.segd")).unwrap().len(), 4);
}

#[test]
fn test_max_blocks_caps_the_container() {
    let temp = TempDir::new().unwrap();
    let store = Store::open(
        Config::builder()
            .data_dir(temp.path())
            .max_blocks(8)
            .build(),
    )
    .unwrap();

    assert!(matches!(
        store.set_with(9, b"x".to_vec(), true).wait(),
        Err(StoreError::Range(_))
    ));
    assert!(matches!(store.get(9).wait(), Err(StoreError::Range(_))));

    store.set_with(8, b"last".to_vec(), true).wait().unwrap();
    for _ in 0..7 {
        store.put(b"fill".to_vec()).wait().unwrap();
    }

    let err = store.put(b"full".to_vec()).wait().unwrap_err();
    assert!(matches!(err, StoreError::Range(_)));
    assert_eq!(store.stats().wait().unwrap().total_blocks, 8);
}

#[test]
fn test_failed_forced_set_releases_claimed_id() {
    let temp = TempDir::new().unwrap();
    let store = Store::open(
        Config::builder()
            .data_dir(temp.path())
            .max_blocks(2)
            .build(),
    )
    .unwrap();

    // Claiming id 2 fits, but the chain needs a block past the cap.
    let err = store.set_with(2, pattern(700), true).wait().unwrap_err();
    assert!(matches!(err, StoreError::Range(_)));

    let stats = store.stats().wait().unwrap();
    assert_eq!((stats.total_blocks, stats.free_blocks), (2, 2));
    assert_eq!(store.get(2).wait().unwrap(), None);
    assert_eq!(store.put(b"fits".to_vec()).wait().unwrap(), 1);
}

// =============================================================================
// Scheduling Tests
// =============================================================================

#[test]
fn test_get_issued_after_set_sees_new_value() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());
    let id = store.put(b"old".to_vec()).wait().unwrap();

    for round in 0..20u8 {
        let before = store.get(id);
        let set = store.set(id, vec![round]);
        let after = store.get(id);

        set.wait().unwrap();
        let before = before.wait().unwrap().unwrap();
        let after = after.wait().unwrap().unwrap();

        assert_ne!(before, Bytes::from(vec![round]));
        assert_eq!(after, Bytes::from(vec![round]));
    }
}

#[test]
fn test_conflicting_writes_apply_in_order() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());
    let id = store.put(b"0".to_vec()).wait().unwrap();

    let handles: Vec<_> = (1..=50u8).map(|i| store.set(id, vec![i])).collect();
    for handle in handles {
        handle.wait().unwrap();
    }

    assert_eq!(store.get(id).wait().unwrap().unwrap(), Bytes::from_static(&[50]));
}

#[test]
fn test_many_puts_in_flight() {
    let temp = TempDir::new().unwrap();
    let store = Store::open(
        Config::builder()
            .data_dir(temp.path())
            .batch_size(1)
            .build(),
    )
    .unwrap();

    let handles: Vec<_> = (0..200u32)
        .map(|i| store.put(i.to_le_bytes().to_vec()))
        .collect();
    let mut ids: Vec<u64> = handles.into_iter().map(|h| h.wait().unwrap()).collect();

    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids, (1..=200).collect::<Vec<u64>>());
}

#[test]
fn test_concurrent_submitters() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());

    let threads: Vec<_> = (0..4u8)
        .map(|t| {
            let store = store.clone();
            std::thread::spawn(move || {
                (0..25u8)
                    .map(|i| {
                        let data = vec![t, i];
                        let id = store.put(data.clone()).wait().unwrap();
                        (id, data)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for thread in threads {
        for (id, data) in thread.join().unwrap() {
            assert_eq!(store.get(id).wait().unwrap().unwrap(), Bytes::from(data));
        }
    }
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_close_runs_after_queued_operations() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());

    let puts: Vec<_> = (0..50u8).map(|i| store.put(vec![i])).collect();
    let close = store.close();

    for put in puts {
        put.wait().unwrap();
    }
    close.wait().unwrap();
    assert_eq!(store.lifecycle(), Lifecycle::Closed);
}

#[test]
fn test_operations_after_close_rejected() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());
    let close = store.close();

    // Rejected whether CLOSE is still queued or already done.
    assert!(matches!(store.get(1).wait(), Err(StoreError::Closed)));
    assert!(matches!(store.put(b"x".to_vec()).wait(), Err(StoreError::Closed)));

    close.wait().unwrap();
    assert!(store.is_closed());
    assert!(matches!(store.del(1).wait(), Err(StoreError::Closed)));
    assert!(matches!(store.stats().wait(), Err(StoreError::Closed)));
}

#[test]
fn test_close_twice() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());

    let first = store.close();
    let second = store.close().wait();
    // The first CLOSE may already have run by now.
    assert!(matches!(second, Err(StoreError::Closing) | Ok(())));

    first.wait().unwrap();
    store.close().wait().unwrap();
}

#[test]
fn test_persistence_across_reopen() {
    let temp = TempDir::new().unwrap();
    let (a, b) = {
        let store = open(temp.path());
        let a = store.put(pattern(700)).wait().unwrap();
        let b = store.put(b"second".to_vec()).wait().unwrap();
        let gone = store.put(b"gone".to_vec()).wait().unwrap();
        store.put(b"pin".to_vec()).wait().unwrap();
        store.del(gone).wait().unwrap();
        store.close().wait().unwrap();
        (a, b)
    };

    let store = open(temp.path());
    assert_eq!(store.get(a).wait().unwrap().unwrap(), Bytes::from(pattern(700)));
    assert_eq!(store.get(b).wait().unwrap().unwrap(), Bytes::from_static(b"second"));

    let stats = store.stats().wait().unwrap();
    assert_eq!((stats.total_blocks, stats.free_blocks), (6, 1));
    assert_eq!(store.put(b"reuse".to_vec()).wait().unwrap(), 5);
}

#[test]
fn test_drop_without_close_persists() {
    let temp = TempDir::new().unwrap();
    {
        let store = open(temp.path());
        let id = store.put(b"x".to_vec()).wait().unwrap();
        store.put(b"y".to_vec()).wait().unwrap();
        let _ = store.del(id);
    }

    let store = open(temp.path());
    let stats = store.stats().wait().unwrap();
    assert_eq!((stats.total_blocks, stats.free_blocks), (2, 1));
    assert_eq!(store.get(1).wait().unwrap(), None);
}

#[test]
fn test_pending_polling() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());

    let handle = store.put(b"poll".to_vec());
    let id = loop {
        if let Some(result) = handle.wait_timeout(Duration::from_millis(50)) {
            break result.unwrap();
        }
    };

    assert_eq!(id, 1);
    assert!(matches!(handle.try_wait(), Some(Err(StoreError::WorkerStopped))));
}

#[test]
fn test_stats_reports_cache() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());
    let id = store.put(pattern(100)).wait().unwrap();

    store.get(id).wait().unwrap();
    let stats = store.stats().wait().unwrap();

    assert_eq!(stats.total_blocks, 1);
    assert_eq!(stats.cached_entries, 1);
    assert_eq!(stats.cached_bytes, 100);
    assert_eq!(stats.data_file_len, data_len(1));
}

#[test]
fn test_disabled_cache() {
    let temp = TempDir::new().unwrap();
    let store = Store::open(
        Config::builder()
            .data_dir(temp.path())
            .cache_enabled(false)
            .build(),
    )
    .unwrap();
    let id = store.put(b"uncached".to_vec()).wait().unwrap();

    assert!(store.get(id).wait().unwrap().is_some());
    assert_eq!(store.stats().wait().unwrap().cached_entries, 0);
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_invalid_config_rejected() {
    let temp = TempDir::new().unwrap();

    let configs = [
        Config::builder().data_dir(temp.path()).batch_size(0).build(),
        Config::builder().data_dir(temp.path()).truncate_boundary(0).build(),
        Config::builder().data_dir(temp.path()).max_blocks(0).build(),
        Config::builder()
            .data_dir(temp.path())
            .cache_item_cap(100)
            .cache_total_cap(10)
            .build(),
    ];

    for config in configs {
        assert!(matches!(Store::open(config), Err(StoreError::Config(_))));
    }
}

#[test]
fn test_data_dir_must_be_directory() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("plain");
    fs::write(&file, b"").unwrap();

    assert!(matches!(Store::open_path(&file), Err(StoreError::Config(_))));
}

#[test]
fn test_store_path() {
    let temp = TempDir::new().unwrap();
    let store = open(temp.path());

    assert_eq!(store.path(), temp.path());
    assert!(temp.path().join("storage.blst").exists());
    assert!(temp.path().join("storage.segd").exists());
}
