//! Latchkey - the core of a disk-backed storage engine
//!
//! The crate provides a fixed-memory page cache over a database file and a
//! concurrent B+ tree index built on top of it.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): page-granular disk I/O
//!   - `DiskManager`: reads, writes, allocates and recycles pages
//!   - `HeaderView`/`HeaderViewMut`: the page-0 directory of index roots
//!   - `LogManager`: LSN allocation, optionally handed to the buffer pool
//!
//! - **Buffer Pool** (`buffer`): fixed set of frames caching hot pages
//!   - `BufferPoolManager`: pin-counted page access with LRU eviction
//!   - `ExtendibleHashTable`: the page table, split-on-overflow hashing
//!   - `LruReplacer`: O(1) tracking of eviction candidates
//!   - `ReadPageGuard`/`WritePageGuard`: RAII latches over page bytes
//!
//! - **Index** (`index`): concurrent ordered access
//!   - `BPlusTree`: point lookups, range cursors, insert with recursive
//!     split, delete with redistribution and coalescing, all descending
//!     with latch crabbing
//!   - `IndexIterator`: forward cursor chaining leaves left to right
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use latchkey::buffer::BufferPoolManager;
//! use latchkey::index::{BPlusTree, IndexKey, IntegerComparator};
//! use latchkey::storage::disk::DiskManager;
//! use latchkey::common::{RecordId, PageId, SlotId};
//!
//! let disk = Arc::new(DiskManager::new("demo.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk));
//! let tree = BPlusTree::new("demo_pk", bpm, Arc::new(IntegerComparator)).unwrap();
//!
//! let key = IndexKey::from_integer(42);
//! tree.insert(&key, RecordId::new(PageId::new(7), SlotId::new(0))).unwrap();
//! assert!(tree.get_value(&key).unwrap().is_some());
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{EngineError, PageId, RecordId, Result, SlotId};
