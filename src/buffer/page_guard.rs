use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::PoolState;
use super::Frame;

type DataReadGuard = RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>;
type DataWriteGuard = RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>;

/// RAII guard for shared access to a page. Holds the page latch in read mode
/// and one pin; dropping it releases the latch first, then the pin.
pub struct ReadPageGuard {
    page_id: PageId,
    /// Keeps the frame alive for the transmuted latch guard below
    _frame: Arc<Frame>,
    pool: Arc<PoolState>,
    data: Option<DataReadGuard>,
}

impl ReadPageGuard {
    /// The caller must have pinned `frame` already; the guard takes over the
    /// pin and releases it on drop. The latch is acquired here, outside the
    /// pool latch, so waiting on a contended page never blocks the pool.
    pub(crate) fn latch(page_id: PageId, frame: Arc<Frame>, pool: Arc<PoolState>) -> Self {
        let data = frame.data.read();
        // The guard's lifetime is tied to the frame, which the Arc below
        // keeps alive for as long as this struct exists.
        let data: DataReadGuard = unsafe { std::mem::transmute(data) };
        Self {
            page_id,
            _frame: frame,
            pool,
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().expect("latch held")[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Latch before pin: a latched frame must never look evictable.
        self.data.take();
        self.pool.unpin_page(self.page_id, false);
    }
}

/// RAII guard for exclusive access to a page. Marks the page dirty the first
/// time its bytes are borrowed mutably.
pub struct WritePageGuard {
    page_id: PageId,
    _frame: Arc<Frame>,
    pool: Arc<PoolState>,
    data: Option<DataWriteGuard>,
    is_dirty: bool,
}

impl WritePageGuard {
    /// See [`ReadPageGuard::latch`]; same pin-transfer contract.
    pub(crate) fn latch(page_id: PageId, frame: Arc<Frame>, pool: Arc<PoolState>) -> Self {
        let data = frame.data.write();
        let data: DataWriteGuard = unsafe { std::mem::transmute(data) };
        Self {
            page_id,
            _frame: frame,
            pool,
            data: Some(data),
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().expect("latch held")[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data.as_mut().expect("latch held")[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.data.take();
        self.pool.unpin_page(self.page_id, self.is_dirty);
    }
}
