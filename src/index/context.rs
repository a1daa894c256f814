use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::buffer::{ReadPageGuard, WritePageGuard};
use crate::common::PageId;

/// What a tree operation intends to do; decides latch modes and the safety
/// predicate used to release ancestors early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpType {
    Read,
    Insert,
    Delete,
}

impl OpType {
    pub(crate) fn is_exclusive(self) -> bool {
        !matches!(self, OpType::Read)
    }
}

/// A page latched by the current operation.
pub(crate) enum LatchedPage {
    Read(ReadPageGuard),
    Write(WritePageGuard),
}

impl LatchedPage {
    pub(crate) fn page_id(&self) -> PageId {
        match self {
            LatchedPage::Read(g) => g.page_id(),
            LatchedPage::Write(g) => g.page_id(),
        }
    }

    pub(crate) fn data(&self) -> &[u8] {
        match self {
            LatchedPage::Read(g) => g.data(),
            LatchedPage::Write(g) => g.data(),
        }
    }
}

/// Guard over the tree's root page id. Held shared by reads and exclusive by
/// structural operations; an operation releases it once the root node is
/// latched and proven safe.
pub(crate) enum RootLatch<'a> {
    Read(RwLockReadGuard<'a, PageId>),
    Write(RwLockWriteGuard<'a, PageId>),
}

/// Per-operation bookkeeping for the crabbing protocol: the root latch, the
/// ordered set of page latches still held (root side first), and the pages
/// scheduled for deletion. Dropping the context releases every latch and pin
/// it still holds, which keeps early error returns safe.
pub(crate) struct OpContext<'a> {
    pub(crate) op: OpType,
    root: Option<RootLatch<'a>>,
    pages: Vec<LatchedPage>,
    deleted: Vec<PageId>,
}

impl<'a> OpContext<'a> {
    pub(crate) fn new(op: OpType, root: RootLatch<'a>) -> Self {
        debug_assert!(matches!(root, RootLatch::Write(_)) == op.is_exclusive());
        Self {
            op,
            root: Some(root),
            pages: Vec::new(),
            deleted: Vec::new(),
        }
    }

    /// Current root page id. Only valid while the root latch is held.
    pub(crate) fn root_page_id(&self) -> PageId {
        match self.root.as_ref().expect("root latch already released") {
            RootLatch::Read(g) => **g,
            RootLatch::Write(g) => **g,
        }
    }

    /// Rewrites the root page id; requires the exclusive root latch.
    pub(crate) fn set_root_page_id(&mut self, page_id: PageId) {
        match self.root.as_mut().expect("root latch already released") {
            RootLatch::Write(g) => **g = page_id,
            RootLatch::Read(_) => unreachable!("root mutation under shared latch"),
        }
    }

    /// Releases the root latch and every page latched so far. Called when
    /// the newly latched child is safe; the caller pushes the child after.
    pub(crate) fn release_ancestors(&mut self) {
        self.root.take();
        self.pages.clear();
    }

    pub(crate) fn push(&mut self, page: LatchedPage) {
        self.pages.push(page);
    }

    /// Removes and returns the most recently latched page.
    pub(crate) fn pop(&mut self) -> Option<LatchedPage> {
        self.pages.pop()
    }

    pub(crate) fn last(&self) -> &LatchedPage {
        self.pages.last().expect("no page latched")
    }

    pub(crate) fn holds(&self, page_id: PageId) -> bool {
        self.pages.iter().any(|p| p.page_id() == page_id)
    }

    pub(crate) fn data(&self, page_id: PageId) -> &[u8] {
        self.pages
            .iter()
            .find(|p| p.page_id() == page_id)
            .expect("page not latched by this operation")
            .data()
    }

    /// Exclusive access to a page this operation has write-latched.
    pub(crate) fn write_guard_mut(&mut self, page_id: PageId) -> &mut WritePageGuard {
        match self
            .pages
            .iter_mut()
            .find(|p| p.page_id() == page_id)
            .expect("page not latched by this operation")
        {
            LatchedPage::Write(g) => g,
            LatchedPage::Read(_) => unreachable!("write access through a read latch"),
        }
    }

    /// Exclusive access to two distinct write-latched pages at once.
    pub(crate) fn write_pair_mut(
        &mut self,
        a: PageId,
        b: PageId,
    ) -> (&mut WritePageGuard, &mut WritePageGuard) {
        assert_ne!(a, b);
        let ia = self
            .pages
            .iter()
            .position(|p| p.page_id() == a)
            .expect("page not latched by this operation");
        let ib = self
            .pages
            .iter()
            .position(|p| p.page_id() == b)
            .expect("page not latched by this operation");
        let (lo, hi) = if ia < ib { (ia, ib) } else { (ib, ia) };
        let (head, tail) = self.pages.split_at_mut(hi);
        let first = &mut head[lo];
        let second = &mut tail[0];
        let (ga, gb) = if ia < ib { (first, second) } else { (second, first) };
        match (ga, gb) {
            (LatchedPage::Write(ga), LatchedPage::Write(gb)) => (ga, gb),
            _ => unreachable!("write access through a read latch"),
        }
    }

    pub(crate) fn schedule_delete(&mut self, page_id: PageId) {
        if !self.deleted.contains(&page_id) {
            self.deleted.push(page_id);
        }
    }

    /// Hands the deletion list to the caller, releasing everything else.
    /// Latches are dropped root side first, then the pages can be deleted
    /// without this operation pinning them.
    pub(crate) fn finish(&mut self) -> Vec<PageId> {
        self.root.take();
        self.pages.clear();
        std::mem::take(&mut self.deleted)
    }
}
