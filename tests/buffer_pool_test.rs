use std::sync::Arc;

use latchkey::buffer::BufferPoolManager;
use latchkey::common::{PageId, PAGE_SIZE};
use latchkey::storage::disk::DiskManager;

use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    (BufferPoolManager::new(pool_size, dm), temp_file)
}

#[test]
fn test_new_pool_is_all_free() {
    let (bpm, _temp) = create_bpm(10);
    assert_eq!(bpm.pool_size(), 10);
    assert_eq!(bpm.free_frame_count(), 10);
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_new_page_pins_until_guard_drops() {
    let (bpm, _temp) = create_bpm(10);

    let (page_id, guard) = bpm.new_page().unwrap().unwrap();
    assert_eq!(page_id, PageId::new(1)); // page 0 is the header page
    assert_eq!(bpm.pin_count(page_id), Some(1));
    assert!(!bpm.check_all_unpinned());

    drop(guard);
    assert_eq!(bpm.pin_count(page_id), Some(0));
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_read_back_what_was_written() {
    let (bpm, _temp) = create_bpm(10);

    let (page_id, mut guard) = bpm.new_page().unwrap().unwrap();
    guard.data_mut()[0] = 42;
    guard.data_mut()[100] = 255;
    drop(guard);

    let guard = bpm.fetch_page_read(page_id).unwrap().unwrap();
    assert_eq!(guard.data()[0], 42);
    assert_eq!(guard.data()[100], 255);
}

#[test]
fn test_shared_latch_allows_two_readers() {
    let (bpm, _temp) = create_bpm(10);
    let (page_id, guard) = bpm.new_page().unwrap().unwrap();
    drop(guard);

    let r1 = bpm.fetch_page_read(page_id).unwrap().unwrap();
    let r2 = bpm.fetch_page_read(page_id).unwrap().unwrap();
    assert_eq!(bpm.pin_count(page_id), Some(2));
    drop(r1);
    drop(r2);
    assert_eq!(bpm.pin_count(page_id), Some(0));
}

#[test]
fn test_unpin_contract() {
    let (bpm, _temp) = create_bpm(10);
    let (page_id, guard) = bpm.new_page().unwrap().unwrap();
    drop(guard);

    // already at zero pins
    assert!(!bpm.unpin_page(page_id, false));
    // never resident
    assert!(!bpm.unpin_page(PageId::new(900), false));
}

#[test]
fn test_flush_writes_dirty_bytes_to_disk() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(10, Arc::clone(&dm));

    let (page_id, mut guard) = bpm.new_page().unwrap().unwrap();
    guard.data_mut()[17] = 99;
    drop(guard);

    assert!(bpm.flush_page(page_id).unwrap());

    let mut on_disk = [0u8; PAGE_SIZE];
    dm.read_page(page_id, &mut on_disk).unwrap();
    assert_eq!(on_disk[17], 99);

    // flushing a page that is not resident reports false
    assert!(!bpm.flush_page(PageId::new(900)).unwrap());
}

#[test]
fn test_eviction_round_trips_through_disk() {
    let (bpm, _temp) = create_bpm(3);

    let mut pages = Vec::new();
    for i in 0..3u8 {
        let (page_id, mut guard) = bpm.new_page().unwrap().unwrap();
        guard.data_mut()[0] = i + 1;
        drop(guard);
        pages.push(page_id);
    }
    assert_eq!(bpm.free_frame_count(), 0);

    // a fourth page forces the least recently unpinned page out
    let (extra, guard) = bpm.new_page().unwrap().unwrap();
    drop(guard);
    assert_eq!(extra, PageId::new(4));

    // the evicted page must come back from disk intact
    for (i, &page_id) in pages.iter().enumerate() {
        let guard = bpm.fetch_page_read(page_id).unwrap().unwrap();
        assert_eq!(guard.data()[0], i as u8 + 1, "page {page_id}");
    }
}

#[test]
fn test_no_frame_available() {
    let (bpm, _temp) = create_bpm(2);

    let (p1, g1) = bpm.new_page().unwrap().unwrap();
    let (p2, g2) = bpm.new_page().unwrap().unwrap();
    drop(g1);
    drop(g2);
    let _r1 = bpm.fetch_page_read(p1).unwrap().unwrap();
    let _r2 = bpm.fetch_page_read(p2).unwrap().unwrap();

    // everything is pinned: no new page, no fetch of a non-resident page
    assert!(bpm.new_page().unwrap().is_none());
    assert!(bpm.fetch_page_read(PageId::new(800)).unwrap().is_none());

    // a resident page can still be fetched
    let extra = bpm.fetch_page_read(p1).unwrap().unwrap();
    assert_eq!(bpm.pin_count(p1), Some(2));
    drop(extra);
}

#[test]
fn test_delete_page() {
    let (bpm, _temp) = create_bpm(10);
    let (page_id, guard) = bpm.new_page().unwrap().unwrap();

    // refused while pinned, disk space untouched
    assert!(!bpm.delete_page(page_id).unwrap());
    drop(guard);

    let free_before = bpm.free_frame_count();
    assert!(bpm.delete_page(page_id).unwrap());
    assert_eq!(bpm.pin_count(page_id), None);
    assert_eq!(bpm.free_frame_count(), free_before + 1);

    // deleting a page that was never resident still succeeds
    assert!(bpm.delete_page(PageId::new(700)).unwrap());
}

#[test]
fn test_deleted_page_id_is_recycled() {
    let (bpm, _temp) = create_bpm(10);
    let (page_id, guard) = bpm.new_page().unwrap().unwrap();
    drop(guard);
    bpm.delete_page(page_id).unwrap();

    let (recycled, guard) = bpm.new_page().unwrap().unwrap();
    assert_eq!(recycled, page_id);
    // recycled pages come back zeroed
    assert!(guard.data().iter().all(|&b| b == 0));
}

#[test]
fn test_fetch_survives_pool_churn() {
    let (bpm, _temp) = create_bpm(5);

    let mut pages = Vec::new();
    for i in 0..20u8 {
        let (page_id, mut guard) = bpm.new_page().unwrap().unwrap();
        guard.data_mut()[0] = i;
        guard.data_mut()[PAGE_SIZE - 1] = i ^ 0xff;
        drop(guard);
        pages.push(page_id);
    }

    for (i, &page_id) in pages.iter().enumerate() {
        let guard = bpm.fetch_page_read(page_id).unwrap().unwrap();
        assert_eq!(guard.data()[0], i as u8);
        assert_eq!(guard.data()[PAGE_SIZE - 1], i as u8 ^ 0xff);
    }
    assert!(bpm.check_all_unpinned());
}
