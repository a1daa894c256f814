mod buffer_pool_manager;
mod extendible_hash;
mod frame;
mod lru_replacer;
mod page_guard;

pub use buffer_pool_manager::BufferPoolManager;
pub use extendible_hash::ExtendibleHashTable;
pub use frame::Frame;
pub use lru_replacer::LruReplacer;
pub use page_guard::{ReadPageGuard, WritePageGuard};
