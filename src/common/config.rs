/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Invalid frame ID constant
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// Page 0 holds the index-name -> root-page-id directory
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 10;

/// Entry capacity of one extendible-hash bucket
pub const BUCKET_SIZE: usize = 32;

/// Fixed width of an index key in bytes
pub const KEY_SIZE: usize = 8;

use super::types::{FrameId, PageId};
