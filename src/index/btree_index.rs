use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;

use crate::buffer::BufferPoolManager;
use crate::common::{
    EngineError, PageId, RecordId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID,
};
use crate::storage::page::{HeaderView, HeaderViewMut};

use super::btree_internal_page::{InternalView, InternalViewMut, INTERNAL_MAX_SIZE};
use super::btree_iterator::IndexIterator;
use super::btree_leaf_page::{LeafView, LeafViewMut, LEAF_MAX_SIZE};
use super::btree_page::{BTreePage, BTreePageMut, PageType};
use super::context::{LatchedPage, OpContext, OpType, RootLatch};
use super::key_comparator::{IndexKey, KeyComparator};

/// Concurrent B+ tree index over fixed-width keys, backed by the buffer pool.
///
/// Concurrency follows latch crabbing: descents latch a child before giving
/// up its ancestors, and structural operations keep every ancestor that might
/// still change. The root page id lives behind its own reader-writer latch,
/// ordered above all page latches.
pub struct BPlusTree {
    index_name: String,
    root_page_id: RwLock<PageId>,
    bpm: Arc<BufferPoolManager>,
    comparator: Arc<dyn KeyComparator>,
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl BPlusTree {
    /// Opens the index named `index_name`, picking up an existing root from
    /// the header page. Fanout derives from the page size.
    pub fn new(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
    ) -> Result<Self> {
        Self::with_max_sizes(index_name, bpm, comparator, LEAF_MAX_SIZE, INTERNAL_MAX_SIZE)
    }

    /// As [`BPlusTree::new`] but with explicit fanout bounds, for exercising
    /// splits and merges with small trees.
    pub fn with_max_sizes(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let index_name = index_name.into();
        if index_name.len() > 32 || index_name.is_empty() {
            return Err(EngineError::IndexNameTooLong(index_name));
        }
        assert!(leaf_max_size >= 2 && internal_max_size >= 3);

        let root = {
            let guard = bpm
                .fetch_page_read(HEADER_PAGE_ID)?
                .ok_or(EngineError::BufferPoolFull)?;
            HeaderView::new(guard.data())
                .get_root_id(&index_name)
                .unwrap_or(INVALID_PAGE_ID)
        };

        Ok(Self {
            index_name,
            root_page_id: RwLock::new(root),
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
        })
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.read().is_valid()
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    /// Point lookup.
    pub fn get_value(&self, key: &IndexKey) -> Result<Option<RecordId>> {
        let mut ctx = OpContext::new(OpType::Read, RootLatch::Read(self.root_page_id.read()));
        let root_id = ctx.root_page_id();
        if !root_id.is_valid() {
            self.release_all(&mut ctx)?;
            return Ok(None);
        }
        let leaf_pid = self.find_leaf(root_id, key, false, &mut ctx)?;
        let result = LeafView::new(ctx.data(leaf_pid)).lookup(key, &*self.comparator);
        self.release_all(&mut ctx)?;
        Ok(result)
    }

    /// Inserts a unique key. Returns false (and changes nothing) when the
    /// key is already present.
    pub fn insert(&self, key: &IndexKey, value: RecordId) -> Result<bool> {
        let mut ctx = OpContext::new(OpType::Insert, RootLatch::Write(self.root_page_id.write()));
        let root_id = ctx.root_page_id();
        if !root_id.is_valid() {
            self.start_new_tree(key, value, &mut ctx)?;
            self.release_all(&mut ctx)?;
            return Ok(true);
        }

        let leaf_pid = self.find_leaf(root_id, key, false, &mut ctx)?;
        if LeafView::new(ctx.data(leaf_pid))
            .lookup(key, &*self.comparator)
            .is_some()
        {
            self.release_all(&mut ctx)?;
            return Ok(false);
        }

        let (new_size, max_size) = {
            let guard = ctx.write_guard_mut(leaf_pid);
            let mut leaf = LeafViewMut::new(guard.data_mut());
            let new_size = leaf.insert(key, value, &*self.comparator);
            (new_size, leaf.view().header().max_size())
        };
        if new_size > max_size {
            let (separator, new_pid) = self.split(leaf_pid, &mut ctx)?;
            self.insert_into_parent(leaf_pid, separator, new_pid, &mut ctx)?;
        }
        self.release_all(&mut ctx)?;
        Ok(true)
    }

    /// Deletes `key` if present; absent keys are a no-op.
    pub fn remove(&self, key: &IndexKey) -> Result<()> {
        let mut ctx = OpContext::new(OpType::Delete, RootLatch::Write(self.root_page_id.write()));
        let root_id = ctx.root_page_id();
        if !root_id.is_valid() {
            self.release_all(&mut ctx)?;
            return Ok(());
        }

        let leaf_pid = self.find_leaf(root_id, key, false, &mut ctx)?;
        let (new_size, min_size) = {
            let guard = ctx.write_guard_mut(leaf_pid);
            let mut leaf = LeafViewMut::new(guard.data_mut());
            let new_size = leaf.remove_and_delete_record(key, &*self.comparator);
            (new_size, Self::min_size_of(leaf.view().header()))
        };
        if new_size < min_size {
            self.coalesce_or_redistribute(leaf_pid, &mut ctx)?;
        }
        self.release_all(&mut ctx)?;
        Ok(())
    }

    /// Cursor over the whole tree in key order.
    pub fn begin(&self) -> Result<IndexIterator> {
        let mut ctx = OpContext::new(OpType::Read, RootLatch::Read(self.root_page_id.read()));
        let root_id = ctx.root_page_id();
        if !root_id.is_valid() {
            self.release_all(&mut ctx)?;
            return Ok(IndexIterator::empty(Arc::clone(&self.bpm)));
        }
        self.find_leaf(root_id, &IndexKey::default(), true, &mut ctx)?;
        match ctx.pop() {
            Some(LatchedPage::Read(guard)) => {
                Ok(IndexIterator::new(Arc::clone(&self.bpm), guard, 0))
            }
            _ => Err(EngineError::IndexCorrupted(
                "leftmost descent ended without a latched leaf".into(),
            )),
        }
    }

    /// Cursor positioned at the first key >= `key`.
    pub fn begin_from(&self, key: &IndexKey) -> Result<IndexIterator> {
        let mut ctx = OpContext::new(OpType::Read, RootLatch::Read(self.root_page_id.read()));
        let root_id = ctx.root_page_id();
        if !root_id.is_valid() {
            self.release_all(&mut ctx)?;
            return Ok(IndexIterator::empty(Arc::clone(&self.bpm)));
        }
        self.find_leaf(root_id, key, false, &mut ctx)?;
        match ctx.pop() {
            Some(LatchedPage::Read(guard)) => {
                let index = LeafView::new(guard.data()).key_index(key, &*self.comparator);
                Ok(IndexIterator::new(Arc::clone(&self.bpm), guard, index))
            }
            _ => Err(EngineError::IndexCorrupted(
                "descent ended without a latched leaf".into(),
            )),
        }
    }

    /// Descends from `root_id` to the leaf responsible for `key` (or the
    /// leftmost leaf), latching with the crabbing protocol. The leaf's guard
    /// is the last entry of the context when this returns.
    fn find_leaf(
        &self,
        root_id: PageId,
        key: &IndexKey,
        left_most: bool,
        ctx: &mut OpContext,
    ) -> Result<PageId> {
        let mut page_id = root_id;
        loop {
            self.crabbing_fetch_page(page_id, ctx)?;
            let next = {
                let data = ctx.last().data();
                match BTreePage::new(data).page_type() {
                    PageType::Leaf => return Ok(page_id),
                    PageType::Internal => {
                        let internal = InternalView::new(data);
                        if left_most {
                            internal.value_at(0)
                        } else {
                            internal.lookup(key, &*self.comparator)
                        }
                    }
                    PageType::Invalid => {
                        return Err(EngineError::IndexCorrupted(format!(
                            "page {page_id} has no tree layout"
                        )))
                    }
                }
            };
            page_id = next;
        }
    }

    /// Latches `page_id` in the mode the operation needs, then releases
    /// every ancestor (and the root latch) if the page cannot propagate a
    /// structural change upward.
    fn crabbing_fetch_page(&self, page_id: PageId, ctx: &mut OpContext) -> Result<()> {
        let page = if ctx.op.is_exclusive() {
            LatchedPage::Write(
                self.bpm
                    .fetch_page_write(page_id)?
                    .ok_or(EngineError::BufferPoolFull)?,
            )
        } else {
            LatchedPage::Read(
                self.bpm
                    .fetch_page_read(page_id)?
                    .ok_or(EngineError::BufferPoolFull)?,
            )
        };
        if Self::is_safe(BTreePage::new(page.data()), ctx.op) {
            ctx.release_ancestors();
        }
        ctx.push(page);
        Ok(())
    }

    /// A node is safe when the operation cannot change its parent: inserts
    /// need spare room, deletes need spare entries.
    fn is_safe(header: BTreePage<'_>, op: OpType) -> bool {
        match op {
            OpType::Read => true,
            OpType::Insert => header.size() < header.max_size(),
            OpType::Delete => header.size() > Self::min_size_of(header),
        }
    }

    /// Minimum occupancy. The root is exempt from half-full: a root leaf
    /// only underflows when empty, a root internal page when one child is
    /// left.
    fn min_size_of(header: BTreePage<'_>) -> usize {
        match (header.is_leaf(), header.is_root()) {
            (true, true) => 1,
            (false, true) => 2,
            (true, false) => header.max_size() / 2,
            (false, false) => (header.max_size() + 1) / 2,
        }
    }

    /// Creates the first leaf and makes it the root. Requires the exclusive
    /// root latch.
    fn start_new_tree(&self, key: &IndexKey, value: RecordId, ctx: &mut OpContext) -> Result<()> {
        let (page_id, mut guard) = self
            .bpm
            .new_page()?
            .ok_or(EngineError::BufferPoolFull)?;
        {
            let mut leaf =
                LeafViewMut::init(guard.data_mut(), page_id, INVALID_PAGE_ID, self.leaf_max_size);
            leaf.insert(key, value, &*self.comparator);
        }
        drop(guard);
        ctx.set_root_page_id(page_id);
        self.set_root_record(page_id)?;
        debug!("index {}: new root leaf {page_id}", self.index_name);
        Ok(())
    }

    /// Splits the overflowing page, moving its upper half into a fresh page
    /// that joins the operation's latch set. Returns the separator to insert
    /// into the parent and the new page's id.
    fn split(&self, page_id: PageId, ctx: &mut OpContext) -> Result<(IndexKey, PageId)> {
        let (new_pid, mut new_guard) = self
            .bpm
            .new_page()?
            .ok_or(EngineError::BufferPoolFull)?;

        let page_type = BTreePage::new(ctx.data(page_id)).page_type();
        let (separator, moved) = {
            let old_guard = ctx.write_guard_mut(page_id);
            let (parent, max_size) = {
                let header = BTreePage::new(old_guard.data());
                (header.parent_page_id(), header.max_size())
            };
            match page_type {
                PageType::Leaf => {
                    let mut old = LeafViewMut::new(old_guard.data_mut());
                    let mut new =
                        LeafViewMut::init(new_guard.data_mut(), new_pid, parent, max_size);
                    old.move_half_to(&mut new);
                    (new.view().key_at(0), Vec::new())
                }
                PageType::Internal => {
                    let mut old = InternalViewMut::new(old_guard.data_mut());
                    let mut new =
                        InternalViewMut::init(new_guard.data_mut(), new_pid, parent, max_size);
                    let (separator, moved) = old.move_half_to(&mut new);
                    (separator, moved)
                }
                PageType::Invalid => {
                    return Err(EngineError::IndexCorrupted(format!(
                        "split of non-tree page {page_id}"
                    )))
                }
            }
        };
        ctx.push(LatchedPage::Write(new_guard));
        if !moved.is_empty() {
            self.reparent(&moved, new_pid, ctx)?;
        }
        debug!(
            "index {}: split page {page_id}, upper half now in {new_pid}",
            self.index_name
        );
        Ok((separator, new_pid))
    }

    /// Wires a freshly split page into the tree, growing a new root when the
    /// old page was the root and recursing when the parent overflows too.
    fn insert_into_parent(
        &self,
        old_pid: PageId,
        key: IndexKey,
        new_pid: PageId,
        ctx: &mut OpContext,
    ) -> Result<()> {
        let parent_pid = BTreePage::new(ctx.data(old_pid)).parent_page_id();

        if !parent_pid.is_valid() {
            let (root_pid, mut root_guard) = self
                .bpm
                .new_page()?
                .ok_or(EngineError::BufferPoolFull)?;
            {
                let mut root = InternalViewMut::init(
                    root_guard.data_mut(),
                    root_pid,
                    INVALID_PAGE_ID,
                    self.internal_max_size,
                );
                root.populate_new_root(old_pid, &key, new_pid);
            }
            drop(root_guard);
            self.reparent(&[old_pid, new_pid], root_pid, ctx)?;
            ctx.set_root_page_id(root_pid);
            self.set_root_record(root_pid)?;
            debug!("index {}: root grew into {root_pid}", self.index_name);
            return Ok(());
        }

        // The parent was unsafe during descent (the split proves it), so it
        // is still latched by this operation. The new page's parent pointer
        // was set when it was initialized.
        let (new_size, max_size) = {
            let guard = ctx.write_guard_mut(parent_pid);
            let mut parent = InternalViewMut::new(guard.data_mut());
            let new_size = parent.insert_node_after(old_pid, &key, new_pid);
            (new_size, parent.view().header().max_size())
        };
        if new_size > max_size {
            let (separator, split_pid) = self.split(parent_pid, ctx)?;
            self.insert_into_parent(parent_pid, separator, split_pid, ctx)?;
        }
        Ok(())
    }

    /// Rebalances an underflowing page against a sibling: merge when both
    /// fit in one page, borrow one entry otherwise.
    fn coalesce_or_redistribute(&self, page_id: PageId, ctx: &mut OpContext) -> Result<()> {
        let parent_pid = BTreePage::new(ctx.data(page_id)).parent_page_id();
        if !parent_pid.is_valid() {
            return self.adjust_root(page_id, ctx);
        }

        let (index, sibling_pid) = {
            let parent = InternalView::new(ctx.data(parent_pid));
            if parent.size() < 2 {
                return Err(EngineError::IndexCorrupted(format!(
                    "page {page_id} has no sibling under parent {parent_pid}"
                )));
            }
            let index = parent.value_index(page_id).ok_or_else(|| {
                EngineError::IndexCorrupted(format!(
                    "page {page_id} missing from parent {parent_pid}"
                ))
            })?;
            let sibling_index = if index == 0 { 1 } else { index - 1 };
            (index, parent.value_at(sibling_index))
        };

        // The sibling is not on the descent path; latch it for the rest of
        // the operation without releasing anything.
        let sibling_guard = self
            .bpm
            .fetch_page_write(sibling_pid)?
            .ok_or(EngineError::BufferPoolFull)?;
        ctx.push(LatchedPage::Write(sibling_guard));

        let node_size = BTreePage::new(ctx.data(page_id)).size();
        let sibling_size = BTreePage::new(ctx.data(sibling_pid)).size();
        let max_size = BTreePage::new(ctx.data(page_id)).max_size();

        if node_size + sibling_size <= max_size {
            // Merge right into left; with no left sibling the roles swap.
            let (left_pid, right_pid) = if index == 0 {
                (page_id, sibling_pid)
            } else {
                (sibling_pid, page_id)
            };
            self.coalesce(left_pid, right_pid, parent_pid, ctx)
        } else {
            self.redistribute(page_id, sibling_pid, parent_pid, index, ctx)
        }
    }

    /// Empties `right_pid` into `left_pid`, drops the separator from the
    /// parent, and recurses if the parent underflows in turn.
    fn coalesce(
        &self,
        left_pid: PageId,
        right_pid: PageId,
        parent_pid: PageId,
        ctx: &mut OpContext,
    ) -> Result<()> {
        let (sep_index, middle_key) = {
            let parent = InternalView::new(ctx.data(parent_pid));
            let sep_index = parent.value_index(right_pid).ok_or_else(|| {
                EngineError::IndexCorrupted(format!(
                    "page {right_pid} missing from parent {parent_pid}"
                ))
            })?;
            (sep_index, parent.key_at(sep_index))
        };

        let page_type = BTreePage::new(ctx.data(left_pid)).page_type();
        let moved = {
            let (left_guard, right_guard) = ctx.write_pair_mut(left_pid, right_pid);
            match page_type {
                PageType::Leaf => {
                    let mut right = LeafViewMut::new(right_guard.data_mut());
                    let mut left = LeafViewMut::new(left_guard.data_mut());
                    right.move_all_to(&mut left);
                    Vec::new()
                }
                PageType::Internal => {
                    let mut right = InternalViewMut::new(right_guard.data_mut());
                    let mut left = InternalViewMut::new(left_guard.data_mut());
                    right.move_all_to(&mut left, &middle_key)
                }
                PageType::Invalid => {
                    return Err(EngineError::IndexCorrupted(format!(
                        "coalesce of non-tree page {left_pid}"
                    )))
                }
            }
        };
        if !moved.is_empty() {
            self.reparent(&moved, left_pid, ctx)?;
        }
        ctx.schedule_delete(right_pid);
        debug!(
            "index {}: coalesced {right_pid} into {left_pid}",
            self.index_name
        );

        let (parent_size, parent_min) = {
            let guard = ctx.write_guard_mut(parent_pid);
            let mut parent = InternalViewMut::new(guard.data_mut());
            parent.remove(sep_index);
            (parent.view().size(), Self::min_size_of(parent.view().header()))
        };
        if parent_size < parent_min {
            self.coalesce_or_redistribute(parent_pid, ctx)?;
        }
        Ok(())
    }

    /// Borrows one entry from the sibling. With a left sibling its last
    /// entry moves to the node's front; the leftmost node borrows the right
    /// sibling's first entry instead. The parent separator is rewritten to
    /// the promoted key.
    fn redistribute(
        &self,
        node_pid: PageId,
        sibling_pid: PageId,
        parent_pid: PageId,
        index: usize,
        ctx: &mut OpContext,
    ) -> Result<()> {
        let page_type = BTreePage::new(ctx.data(node_pid)).page_type();
        // Parent slot whose key separates the borrowing pair.
        let sep_index = if index == 0 { 1 } else { index };
        let separator = InternalView::new(ctx.data(parent_pid)).key_at(sep_index);

        let (promoted, moved_child) = {
            let (node_guard, sibling_guard) = ctx.write_pair_mut(node_pid, sibling_pid);
            match page_type {
                PageType::Leaf => {
                    let mut node = LeafViewMut::new(node_guard.data_mut());
                    let mut sibling = LeafViewMut::new(sibling_guard.data_mut());
                    let promoted = if index == 0 {
                        sibling.move_first_to_end_of(&mut node)
                    } else {
                        sibling.move_last_to_front_of(&mut node)
                    };
                    (promoted, None)
                }
                PageType::Internal => {
                    let mut node = InternalViewMut::new(node_guard.data_mut());
                    let mut sibling = InternalViewMut::new(sibling_guard.data_mut());
                    let (promoted, child) = if index == 0 {
                        sibling.move_first_to_end_of(&mut node, &separator)
                    } else {
                        sibling.move_last_to_front_of(&mut node, &separator)
                    };
                    (promoted, Some(child))
                }
                PageType::Invalid => {
                    return Err(EngineError::IndexCorrupted(format!(
                        "redistribute of non-tree page {node_pid}"
                    )))
                }
            }
        };

        {
            let guard = ctx.write_guard_mut(parent_pid);
            let mut parent = InternalViewMut::new(guard.data_mut());
            parent.set_key_at(sep_index, &promoted);
        }
        if let Some(child) = moved_child {
            self.reparent(&[child], node_pid, ctx)?;
        }
        debug!(
            "index {}: redistributed between {node_pid} and {sibling_pid}",
            self.index_name
        );
        Ok(())
    }

    /// Shrinks the root: an empty root leaf empties the tree; a root with a
    /// single child hands the root over to that child.
    fn adjust_root(&self, page_id: PageId, ctx: &mut OpContext) -> Result<()> {
        let (page_type, size) = {
            let header = BTreePage::new(ctx.data(page_id));
            (header.page_type(), header.size())
        };
        match page_type {
            PageType::Leaf => {
                if size == 0 {
                    ctx.set_root_page_id(INVALID_PAGE_ID);
                    self.set_root_record(INVALID_PAGE_ID)?;
                    ctx.schedule_delete(page_id);
                    debug!("index {}: tree is now empty", self.index_name);
                }
                Ok(())
            }
            PageType::Internal => {
                if size == 1 {
                    let child = {
                        let guard = ctx.write_guard_mut(page_id);
                        InternalViewMut::new(guard.data_mut()).remove_and_return_only_child()
                    };
                    self.reparent(&[child], INVALID_PAGE_ID, ctx)?;
                    ctx.set_root_page_id(child);
                    self.set_root_record(child)?;
                    ctx.schedule_delete(page_id);
                    debug!(
                        "index {}: root collapsed into child {child}",
                        self.index_name
                    );
                }
                Ok(())
            }
            PageType::Invalid => Err(EngineError::IndexCorrupted(format!(
                "root page {page_id} has no tree layout"
            ))),
        }
    }

    /// Rewrites the parent pointer of each child. Pages latched by this
    /// operation are updated through their held guards; everything else is
    /// fetched for the moment it takes.
    fn reparent(&self, children: &[PageId], new_parent: PageId, ctx: &mut OpContext) -> Result<()> {
        for &child in children {
            if ctx.holds(child) {
                let guard = ctx.write_guard_mut(child);
                BTreePageMut::new(guard.data_mut()).set_parent_page_id(new_parent);
            } else {
                let mut guard = self
                    .bpm
                    .fetch_page_write(child)?
                    .ok_or(EngineError::BufferPoolFull)?;
                BTreePageMut::new(guard.data_mut()).set_parent_page_id(new_parent);
            }
        }
        Ok(())
    }

    /// Records the root page id for this index on the header page.
    fn set_root_record(&self, root: PageId) -> Result<()> {
        let mut guard = self
            .bpm
            .fetch_page_write(HEADER_PAGE_ID)?
            .ok_or(EngineError::BufferPoolFull)?;
        let mut header = HeaderViewMut::new(guard.data_mut());
        if !header.update_record(&self.index_name, root) && !header.insert_record(&self.index_name, root)
        {
            return Err(EngineError::HeaderFull);
        }
        Ok(())
    }

    /// Releases the operation's latches and pins, then deletes the pages it
    /// scheduled. A page an iterator still pins is skipped and reclaimed
    /// whenever its pin goes away.
    fn release_all(&self, ctx: &mut OpContext) -> Result<()> {
        for page_id in ctx.finish() {
            if !self.bpm.delete_page(page_id)? {
                warn!(
                    "index {}: page {page_id} still pinned, delete deferred",
                    self.index_name
                );
            }
        }
        Ok(())
    }
}

/// Integrity checks. These walk the tree without crabbing and must not run
/// concurrently with writers; they back the invariant assertions in tests.
impl BPlusTree {
    /// True when the tree is balanced, ordered, within size bounds, its leaf
    /// chain visits every key in ascending order, and no frame is left
    /// pinned.
    pub fn check(&self) -> Result<bool> {
        let root = *self.root_page_id.read();
        if !root.is_valid() {
            return Ok(self.bpm.check_all_unpinned());
        }
        let balanced = self.depth_of(root)?.is_some();
        let ordered = self.verify_subtree(root, None, None, true)?;
        let chained = self.verify_leaf_chain(root)?;
        let unpinned = self.bpm.check_all_unpinned();
        if !balanced {
            warn!("index {}: leaves at unequal depths", self.index_name);
        }
        if !ordered {
            warn!("index {}: ordering or size bound violated", self.index_name);
        }
        if !chained {
            warn!("index {}: leaf chain out of order", self.index_name);
        }
        if !unpinned {
            warn!("index {}: leaked pins detected", self.index_name);
        }
        Ok(balanced && ordered && chained && unpinned)
    }

    fn node_summary(&self, page_id: PageId) -> Result<(PageType, usize, usize, Vec<IndexKey>, Vec<PageId>, PageId)> {
        let guard = self
            .bpm
            .fetch_page_read(page_id)?
            .ok_or(EngineError::BufferPoolFull)?;
        let data = guard.data();
        let header = BTreePage::new(data);
        let (page_type, size, max_size) = (header.page_type(), header.size(), header.max_size());
        match page_type {
            PageType::Leaf => {
                let leaf = LeafView::new(data);
                let keys = (0..size).map(|i| leaf.key_at(i)).collect();
                Ok((page_type, size, max_size, keys, Vec::new(), leaf.next_page_id()))
            }
            PageType::Internal => {
                let internal = InternalView::new(data);
                let keys = (1..size).map(|i| internal.key_at(i)).collect();
                Ok((page_type, size, max_size, keys, internal.children(), INVALID_PAGE_ID))
            }
            PageType::Invalid => Err(EngineError::IndexCorrupted(format!(
                "page {page_id} has no tree layout"
            ))),
        }
    }

    /// Depth of the subtree when all leaves sit at the same level.
    fn depth_of(&self, page_id: PageId) -> Result<Option<usize>> {
        let (page_type, _, _, _, children, _) = self.node_summary(page_id)?;
        if page_type == PageType::Leaf {
            return Ok(Some(0));
        }
        let mut depth = None;
        for child in children {
            match (self.depth_of(child)?, depth) {
                (None, _) => return Ok(None),
                (Some(d), None) => depth = Some(d + 1),
                (Some(d), Some(expect)) if d + 1 != expect => return Ok(None),
                _ => {}
            }
        }
        Ok(depth)
    }

    /// Checks key order, separator bounds `low <= k < high`, and occupancy.
    fn verify_subtree(
        &self,
        page_id: PageId,
        low: Option<IndexKey>,
        high: Option<IndexKey>,
        is_root: bool,
    ) -> Result<bool> {
        let cmp = &*self.comparator;
        let (page_type, size, max_size, keys, children, _) = self.node_summary(page_id)?;

        let min_size = match (page_type == PageType::Leaf, is_root) {
            (true, true) => 1,
            (false, true) => 2,
            (true, false) => max_size / 2,
            (false, false) => (max_size + 1) / 2,
        };
        if size < min_size || size > max_size {
            return Ok(false);
        }
        for pair in keys.windows(2) {
            if cmp.compare(&pair[0], &pair[1]) != std::cmp::Ordering::Less {
                return Ok(false);
            }
        }
        for key in &keys {
            if let Some(low) = &low {
                if cmp.compare(key, low) == std::cmp::Ordering::Less {
                    return Ok(false);
                }
            }
            if let Some(high) = &high {
                if cmp.compare(key, high) != std::cmp::Ordering::Less {
                    return Ok(false);
                }
            }
        }
        if page_type == PageType::Leaf {
            return Ok(true);
        }
        for (i, child) in children.iter().enumerate() {
            let child_low = if i == 0 { low } else { Some(keys[i - 1]) };
            let child_high = if i < keys.len() { Some(keys[i]) } else { high };
            if !self.verify_subtree(*child, child_low, child_high, false)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Walks the leaf chain from the leftmost leaf, checking ascending keys.
    fn verify_leaf_chain(&self, root: PageId) -> Result<bool> {
        let mut page_id = root;
        loop {
            let (page_type, _, _, _, children, _) = self.node_summary(page_id)?;
            if page_type == PageType::Leaf {
                break;
            }
            match children.first() {
                Some(first) => page_id = *first,
                None => return Ok(false),
            }
        }

        let cmp = &*self.comparator;
        let mut previous: Option<IndexKey> = None;
        loop {
            let (_, _, _, keys, _, next) = self.node_summary(page_id)?;
            for key in keys {
                if let Some(previous) = &previous {
                    if cmp.compare(previous, &key) != std::cmp::Ordering::Less {
                        return Ok(false);
                    }
                }
                previous = Some(key);
            }
            if !next.is_valid() {
                return Ok(true);
            }
            page_id = next;
        }
    }
}
