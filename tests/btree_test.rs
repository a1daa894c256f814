use std::sync::Arc;

use latchkey::buffer::BufferPoolManager;
use latchkey::common::{PageId, RecordId, SlotId};
use latchkey::index::{BPlusTree, BTreePage, IndexKey, IntegerComparator, PageType};
use latchkey::storage::disk::DiskManager;

use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    (
        Arc::new(BufferPoolManager::new(pool_size, disk_manager)),
        temp_file,
    )
}

/// Small tree: leaf and internal fanout of 4, so splits start early.
fn small_tree(bpm: &Arc<BufferPoolManager>) -> BPlusTree {
    BPlusTree::with_max_sizes("test_index", Arc::clone(bpm), Arc::new(IntegerComparator), 4, 4)
        .unwrap()
}

fn key(k: i64) -> IndexKey {
    IndexKey::from_integer(k)
}

fn rid(k: i64) -> RecordId {
    RecordId::new(PageId::new(k as u32), SlotId::new((k % 7) as u16))
}

fn scan_keys(tree: &BPlusTree) -> Vec<i64> {
    tree.begin()
        .unwrap()
        .map(|entry| entry.unwrap().0.to_integer())
        .collect()
}

fn root_page_type(tree: &BPlusTree, bpm: &Arc<BufferPoolManager>) -> PageType {
    let guard = bpm.fetch_page_read(tree.root_page_id()).unwrap().unwrap();
    BTreePage::new(guard.data()).page_type()
}

#[test]
fn test_empty_tree() {
    let (bpm, _temp) = create_bpm(10);
    let tree = small_tree(&bpm);

    assert!(tree.is_empty());
    assert_eq!(tree.get_value(&key(1)).unwrap(), None);
    tree.remove(&key(1)).unwrap();

    let mut iter = tree.begin().unwrap();
    assert!(iter.is_end());
    assert!(iter.next_entry().unwrap().is_none());
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_insert_ascending_then_scan() {
    let (bpm, _temp) = create_bpm(10);
    let tree = small_tree(&bpm);

    for k in 1..=10 {
        assert!(tree.insert(&key(k), rid(k)).unwrap());
    }

    assert_eq!(scan_keys(&tree), (1..=10).collect::<Vec<_>>());
    assert_eq!(root_page_type(&tree, &bpm), PageType::Internal);
    for k in 1..=10 {
        assert_eq!(tree.get_value(&key(k)).unwrap(), Some(rid(k)), "key {k}");
    }
    assert!(tree.check().unwrap());
}

#[test]
fn test_delete_then_lookup_absent() {
    let (bpm, _temp) = create_bpm(10);
    let tree = small_tree(&bpm);

    for k in 1..=5 {
        tree.insert(&key(k), rid(k)).unwrap();
    }
    tree.remove(&key(3)).unwrap();

    assert_eq!(tree.get_value(&key(3)).unwrap(), None);
    assert_eq!(scan_keys(&tree), vec![1, 2, 4, 5]);
    assert!(tree.check().unwrap());
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_duplicate_insert_is_rejected() {
    let (bpm, _temp) = create_bpm(10);
    let tree = small_tree(&bpm);

    let first = rid(70);
    let second = rid(71);
    assert!(tree.insert(&key(7), first).unwrap());
    assert!(!tree.insert(&key(7), second).unwrap());
    assert_eq!(tree.get_value(&key(7)).unwrap(), Some(first));
    assert!(tree.check().unwrap());
}

#[test]
fn test_remove_absent_key_is_a_no_op() {
    let (bpm, _temp) = create_bpm(10);
    let tree = small_tree(&bpm);

    for k in [1, 3, 5] {
        tree.insert(&key(k), rid(k)).unwrap();
    }
    tree.remove(&key(2)).unwrap();
    tree.remove(&key(99)).unwrap();

    assert_eq!(scan_keys(&tree), vec![1, 3, 5]);
    assert!(tree.check().unwrap());
}

#[test]
fn test_underflow_redistributes_from_sibling() {
    let (bpm, _temp) = create_bpm(10);
    let tree = small_tree(&bpm);

    // leaves after the split: [1,2] and [3,4,5,6]
    for k in 1..=6 {
        tree.insert(&key(k), rid(k)).unwrap();
    }
    assert_eq!(root_page_type(&tree, &bpm), PageType::Internal);

    // [2] underflows; its sibling holds four entries, so it lends one
    tree.remove(&key(1)).unwrap();
    assert_eq!(root_page_type(&tree, &bpm), PageType::Internal);
    assert_eq!(scan_keys(&tree), vec![2, 3, 4, 5, 6]);
    assert!(tree.check().unwrap());
}

#[test]
fn test_coalesce_collapses_root() {
    let (bpm, _temp) = create_bpm(10);
    let tree = small_tree(&bpm);

    // leaves after the split: [1,2] and [3,4,5]
    for k in 1..=5 {
        tree.insert(&key(k), rid(k)).unwrap();
    }
    assert_eq!(root_page_type(&tree, &bpm), PageType::Internal);

    // [2] merges with [3,4,5]; the root is left with one child and the
    // tree shrinks back to a single leaf
    tree.remove(&key(1)).unwrap();
    assert_eq!(root_page_type(&tree, &bpm), PageType::Leaf);
    assert_eq!(scan_keys(&tree), vec![2, 3, 4, 5]);
    assert!(tree.check().unwrap());
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_insert_then_remove_everything() {
    let (bpm, _temp) = create_bpm(20);
    let tree = small_tree(&bpm);

    for k in 1..=40 {
        tree.insert(&key(k), rid(k)).unwrap();
    }
    for k in 1..=40 {
        tree.remove(&key(k)).unwrap();
    }

    assert!(tree.is_empty());
    assert!(!tree.root_page_id().is_valid());
    assert_eq!(scan_keys(&tree), Vec::<i64>::new());
    assert!(tree.check().unwrap());

    // the tree grows again after being emptied
    tree.insert(&key(5), rid(5)).unwrap();
    assert_eq!(scan_keys(&tree), vec![5]);
    assert!(tree.check().unwrap());
}

#[test]
fn test_reverse_insert_stays_sorted() {
    let (bpm, _temp) = create_bpm(20);
    let tree = small_tree(&bpm);

    for k in (1..=30).rev() {
        tree.insert(&key(k), rid(k)).unwrap();
    }
    assert_eq!(scan_keys(&tree), (1..=30).collect::<Vec<_>>());
    assert!(tree.check().unwrap());
}

#[test]
fn test_begin_from_mid_key() {
    let (bpm, _temp) = create_bpm(20);
    let tree = small_tree(&bpm);

    for k in 1..=50 {
        tree.insert(&key(k), rid(k)).unwrap();
    }

    let keys: Vec<i64> = tree
        .begin_from(&key(25))
        .unwrap()
        .map(|entry| entry.unwrap().0.to_integer())
        .collect();
    assert_eq!(keys, (25..=50).collect::<Vec<_>>());

    // a probe between stored keys starts at the next larger one
    for k in (2..=50).step_by(2) {
        tree.remove(&key(k)).unwrap();
    }
    let keys: Vec<i64> = tree
        .begin_from(&key(24))
        .unwrap()
        .map(|entry| entry.unwrap().0.to_integer())
        .collect();
    assert_eq!(keys, (25..=49).step_by(2).collect::<Vec<_>>());
    assert!(tree.check().unwrap());
}

#[test]
fn test_default_fanout_tree() {
    let (bpm, _temp) = create_bpm(50);
    let tree = BPlusTree::new("wide_index", Arc::clone(&bpm), Arc::new(IntegerComparator)).unwrap();

    for k in 0..2000 {
        assert!(tree.insert(&key(k), rid(k)).unwrap());
    }
    for k in 0..2000 {
        assert_eq!(tree.get_value(&key(k)).unwrap(), Some(rid(k)), "key {k}");
    }
    assert_eq!(scan_keys(&tree), (0..2000).collect::<Vec<_>>());
    assert!(tree.check().unwrap());
}

#[test]
fn test_randomized_workload_keeps_invariants() {
    use rand::seq::SliceRandom;
    use rand::thread_rng;

    let (bpm, _temp) = create_bpm(50);
    let tree = small_tree(&bpm);

    let mut keys: Vec<i64> = (0..300).collect();
    keys.shuffle(&mut thread_rng());
    for &k in &keys {
        assert!(tree.insert(&key(k), rid(k)).unwrap());
    }
    assert!(tree.check().unwrap());

    let (to_remove, to_keep) = keys.split_at(150);
    let mut to_remove = to_remove.to_vec();
    to_remove.shuffle(&mut thread_rng());
    for &k in &to_remove {
        tree.remove(&key(k)).unwrap();
    }
    assert!(tree.check().unwrap());

    for &k in to_keep {
        assert_eq!(tree.get_value(&key(k)).unwrap(), Some(rid(k)), "kept {k}");
    }
    for &k in &to_remove {
        assert_eq!(tree.get_value(&key(k)).unwrap(), None, "removed {k}");
    }

    let mut expected: Vec<i64> = to_keep.to_vec();
    expected.sort_unstable();
    assert_eq!(scan_keys(&tree), expected);
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_reopen_from_header_page() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    {
        let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(20, disk_manager));
        let tree = BPlusTree::with_max_sizes(
            "persistent_index",
            Arc::clone(&bpm),
            Arc::new(IntegerComparator),
            4,
            4,
        )
        .unwrap();
        for k in 1..=60 {
            tree.insert(&key(k), rid(k)).unwrap();
        }
        bpm.flush_all_pages().unwrap();
    }

    let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(20, disk_manager));
    let tree = BPlusTree::with_max_sizes(
        "persistent_index",
        Arc::clone(&bpm),
        Arc::new(IntegerComparator),
        4,
        4,
    )
    .unwrap();

    assert!(!tree.is_empty());
    for k in 1..=60 {
        assert_eq!(tree.get_value(&key(k)).unwrap(), Some(rid(k)), "key {k}");
    }
    assert!(tree.check().unwrap());
}

#[test]
fn test_two_indexes_share_one_pool() {
    let (bpm, _temp) = create_bpm(30);
    let orders = BPlusTree::with_max_sizes(
        "orders_pk",
        Arc::clone(&bpm),
        Arc::new(IntegerComparator),
        4,
        4,
    )
    .unwrap();
    let users = BPlusTree::with_max_sizes(
        "users_pk",
        Arc::clone(&bpm),
        Arc::new(IntegerComparator),
        4,
        4,
    )
    .unwrap();

    for k in 1..=20 {
        orders.insert(&key(k), rid(k)).unwrap();
        users.insert(&key(1000 + k), rid(k)).unwrap();
    }

    assert_eq!(scan_keys(&orders), (1..=20).collect::<Vec<_>>());
    assert_eq!(scan_keys(&users), (1001..=1020).collect::<Vec<_>>());
    assert!(orders.check().unwrap());
    assert!(users.check().unwrap());
}
