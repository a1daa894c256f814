pub mod btree_index;
pub mod btree_internal_page;
pub mod btree_iterator;
pub mod btree_leaf_page;
pub mod btree_page;
mod context;
pub mod key_comparator;

pub use btree_index::BPlusTree;
pub use btree_internal_page::{InternalView, InternalViewMut, INTERNAL_MAX_SIZE};
pub use btree_iterator::IndexIterator;
pub use btree_leaf_page::{LeafView, LeafViewMut, LEAF_MAX_SIZE};
pub use btree_page::{BTreePage, BTreePageMut, PageType};
pub use key_comparator::{BytewiseComparator, IndexKey, IntegerComparator, KeyComparator};
