use std::sync::Arc;

use latchkey::buffer::BufferPoolManager;
use latchkey::common::{PageId, RecordId, SlotId};
use latchkey::index::{BPlusTree, IndexKey, IntegerComparator};
use latchkey::storage::disk::DiskManager;

fn main() {
    println!("Latchkey - disk-backed storage engine core");
    println!("==========================================\n");

    let db_path = "demo.db";
    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to open database file"));
    println!("Opened database file: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(16, disk_manager));
    println!("Created buffer pool with 16 frames\n");

    let tree = BPlusTree::with_max_sizes("demo_pk", Arc::clone(&bpm), Arc::new(IntegerComparator), 4, 4)
        .expect("failed to open index");

    for k in [9i64, 3, 27, 1, 14, 6, 21, 11] {
        let value = RecordId::new(PageId::new(100 + k as u32), SlotId::new(0));
        tree.insert(&IndexKey::from_integer(k), value)
            .expect("insert failed");
        println!("Inserted key {}", k);
    }

    println!("\nScanning in key order:");
    for entry in tree.begin().expect("failed to open cursor") {
        let (key, value) = entry.expect("scan failed");
        println!("  {} -> {}", key.to_integer(), value.page_id);
    }

    tree.remove(&IndexKey::from_integer(14)).expect("remove failed");
    println!("\nRemoved key 14");
    println!(
        "Lookup 14 now yields: {:?}",
        tree.get_value(&IndexKey::from_integer(14))
            .expect("lookup failed")
    );

    assert!(tree.check().expect("integrity check failed"));
    println!("\nIntegrity check passed; all pages unpinned.");

    bpm.flush_all_pages().expect("flush failed");
    std::fs::remove_file(db_path).ok();
    println!("Demo completed successfully!");
}
