use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, BUCKET_SIZE, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::DiskManager;
use crate::storage::LogManager;

use super::{ExtendibleHashTable, Frame, LruReplacer, ReadPageGuard, WritePageGuard};

/// State protected by the pool latch. Every public operation locks this for
/// its whole duration, including disk I/O; pin counts, dirty flags, the page
/// table, the free list and replacer membership only change under it.
struct PoolInner {
    free_list: VecDeque<FrameId>,
}

pub(crate) struct PoolState {
    latch: Mutex<PoolInner>,
    frames: Vec<Arc<Frame>>,
    /// Page table: page id -> frame slot
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// Eviction candidates (unpinned frames only)
    replacer: LruReplacer,
    disk_manager: Arc<DiskManager>,
}

/// BufferPoolManager mediates all page access through a fixed set of frames.
/// Pages are pinned while a guard is alive; unpinned frames become eviction
/// candidates. Reads and writes go through RAII guards that hold the page
/// latch for their lifetime.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<PoolState>,
    /// Optional; logging is disabled when absent. The core never emits
    /// records itself.
    log_manager: Option<Arc<LogManager>>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::build(pool_size, disk_manager, None)
    }

    pub fn with_log_manager(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Arc<LogManager>,
    ) -> Self {
        Self::build(pool_size, disk_manager, Some(log_manager))
    }

    fn build(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            state: Arc::new(PoolState {
                latch: Mutex::new(PoolInner { free_list }),
                frames,
                page_table: ExtendibleHashTable::new(BUCKET_SIZE),
                replacer: LruReplacer::new(),
                disk_manager,
            }),
            log_manager,
        }
    }

    /// Pins `page_id` and returns a guard holding its read latch.
    /// Returns None when every frame is pinned.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<Option<ReadPageGuard>> {
        let Some(frame) = self.state.fetch_frame(page_id)? else {
            return Ok(None);
        };
        Ok(Some(ReadPageGuard::latch(
            page_id,
            frame,
            Arc::clone(&self.state),
        )))
    }

    /// Pins `page_id` and returns a guard holding its write latch.
    /// Returns None when every frame is pinned.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<Option<WritePageGuard>> {
        let Some(frame) = self.state.fetch_frame(page_id)? else {
            return Ok(None);
        };
        Ok(Some(WritePageGuard::latch(
            page_id,
            frame,
            Arc::clone(&self.state),
        )))
    }

    /// Allocates a fresh zeroed page, pinned and write-latched.
    /// Returns None when every frame is pinned.
    pub fn new_page(&self) -> Result<Option<(PageId, WritePageGuard)>> {
        let (page_id, frame) = {
            let mut inner = self.state.latch.lock();
            let page_id = self.state.disk_manager.allocate_page()?;
            let Some(frame_id) = self.state.find_unused_frame(&mut inner)? else {
                warn!("buffer pool exhausted: all {} frames pinned", self.pool_size);
                self.state.disk_manager.deallocate_page(page_id);
                return Ok(None);
            };
            let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
            frame.set_page_id(page_id);
            frame.pin();
            self.state.page_table.insert(page_id, frame_id);
            (page_id, frame)
        };
        Ok(Some((
            page_id,
            WritePageGuard::latch(page_id, frame, Arc::clone(&self.state)),
        )))
    }

    /// Drops one pin; with `is_dirty` the frame is additionally marked
    /// modified. Returns false if the page is absent or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.state.unpin_page(page_id, is_dirty)
    }

    /// Writes the page back if it is resident and dirty, clearing the flag.
    /// Returns false if the page is not in the pool.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(crate::common::EngineError::InvalidPageId(page_id));
        }
        let _inner = self.state.latch.lock();
        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            return Ok(false);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        if frame.is_dirty() {
            let mut buf = [0u8; PAGE_SIZE];
            frame.copy_into(&mut buf);
            self.state.disk_manager.write_page(page_id, &buf)?;
            frame.set_dirty(false);
        }
        Ok(true)
    }

    /// Writes back every dirty resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let _inner = self.state.latch.lock();
        for frame in &self.state.frames {
            let page_id = frame.page_id();
            if page_id != INVALID_PAGE_ID && frame.is_dirty() {
                let mut buf = [0u8; PAGE_SIZE];
                frame.copy_into(&mut buf);
                self.state.disk_manager.write_page(page_id, &buf)?;
                frame.set_dirty(false);
            }
        }
        Ok(())
    }

    /// Evicts the page from the pool and deallocates it on disk. A pinned
    /// page is refused (false) and its disk space is left alone; a page that
    /// is not resident is still deallocated.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.state.latch.lock();
        if let Some(frame_id) = self.state.page_table.find(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.pin_count() > 0 {
                debug!("refusing to delete pinned page {page_id}");
                return Ok(false);
            }
            frame.reset();
            self.state.replacer.erase(frame_id);
            self.state.page_table.remove(&page_id);
            inner.free_list.push_back(frame_id);
        }
        self.state.disk_manager.deallocate_page(page_id);
        Ok(true)
    }

    /// Pin count of a resident page, None when not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let _inner = self.state.latch.lock();
        self.state
            .page_table
            .find(&page_id)
            .map(|fid| self.state.frames[fid.as_usize()].pin_count())
    }

    /// True when no resident page holds a pin. Diagnostic; used by the pin
    /// audits in tests.
    pub fn check_all_unpinned(&self) -> bool {
        let _inner = self.state.latch.lock();
        self.state
            .frames
            .iter()
            .all(|frame| frame.page_id() == INVALID_PAGE_ID || frame.pin_count() == 0)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.latch.lock().free_list.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.state.disk_manager
    }

    pub fn log_manager(&self) -> Option<&Arc<LogManager>> {
        self.log_manager.as_ref()
    }
}

impl PoolState {
    /// Pins the frame holding `page_id`, reading it from disk on a miss.
    /// Returns None when no frame is free and nothing is evictable.
    fn fetch_frame(&self, page_id: PageId) -> Result<Option<Arc<Frame>>> {
        if page_id == INVALID_PAGE_ID {
            return Err(crate::common::EngineError::InvalidPageId(page_id));
        }
        let mut inner = self.latch.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id.as_usize()];
            frame.pin();
            self.replacer.erase(frame_id);
            return Ok(Some(Arc::clone(frame)));
        }

        let mut buf = [0u8; PAGE_SIZE];
        self.disk_manager.read_page(page_id, &mut buf)?;

        let Some(frame_id) = self.find_unused_frame(&mut inner)? else {
            return Ok(None);
        };
        let frame = &self.frames[frame_id.as_usize()];
        frame.fill_from(&buf);
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();
        self.page_table.insert(page_id, frame_id);

        Ok(Some(Arc::clone(frame)))
    }

    /// Picks a frame for reuse: the free list first, then an LRU victim.
    /// A dirty victim is written back before its frame is handed out.
    /// The returned frame is reset (no page, no pins).
    fn find_unused_frame(&self, inner: &mut PoolInner) -> Result<Option<FrameId>> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.replacer.victim() else {
            return Ok(None);
        };
        let frame = &self.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();
        if frame.is_dirty() {
            debug!("evicting dirty page {old_page_id} from frame {frame_id}");
            let mut buf = [0u8; PAGE_SIZE];
            frame.copy_into(&mut buf);
            self.disk_manager.write_page(old_page_id, &buf)?;
        }
        self.page_table.remove(&old_page_id);
        frame.reset();
        Ok(Some(frame_id))
    }

    /// Guard-release half of the pin protocol; also the public unpin.
    pub(crate) fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _inner = self.latch.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];
        let Some(remaining) = frame.unpin() else {
            return false;
        };
        if is_dirty {
            frame.set_dirty(true);
        }
        if remaining == 0 {
            self.replacer.insert(frame_id);
        }
        true
    }
}
