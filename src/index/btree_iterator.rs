use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{EngineError, RecordId, Result};

use super::btree_leaf_page::LeafView;
use super::key_comparator::IndexKey;

/// Forward cursor over the leaf chain. Holds the current leaf pinned and
/// read-latched for its whole stay; stepping to the next leaf latches the
/// successor before the current leaf is released, so a concurrent split
/// cannot orphan the cursor. Dropping the iterator releases the leaf.
pub struct IndexIterator {
    bpm: Arc<BufferPoolManager>,
    leaf: Option<ReadPageGuard>,
    index: usize,
}

impl IndexIterator {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, leaf: ReadPageGuard, index: usize) -> Self {
        Self {
            bpm,
            leaf: Some(leaf),
            index,
        }
    }

    pub(crate) fn empty(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            leaf: None,
            index: 0,
        }
    }

    /// True when no entries remain.
    pub fn is_end(&self) -> bool {
        match &self.leaf {
            None => true,
            Some(guard) => {
                let leaf = LeafView::new(guard.data());
                self.index >= leaf.size() && !leaf.next_page_id().is_valid()
            }
        }
    }

    /// Yields the next entry, chaining into the right sibling when the
    /// current leaf is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<(IndexKey, RecordId)>> {
        loop {
            let Some(guard) = &self.leaf else {
                return Ok(None);
            };
            let next_page_id = {
                let leaf = LeafView::new(guard.data());
                if self.index < leaf.size() {
                    let item = leaf.item(self.index);
                    self.index += 1;
                    return Ok(Some(item));
                }
                leaf.next_page_id()
            };
            if !next_page_id.is_valid() {
                self.leaf = None;
                return Ok(None);
            }
            // Latch the successor before giving up the current leaf.
            let next_guard = self
                .bpm
                .fetch_page_read(next_page_id)?
                .ok_or(EngineError::BufferPoolFull)?;
            self.leaf = Some(next_guard);
            self.index = 0;
        }
    }
}

impl Iterator for IndexIterator {
    type Item = Result<(IndexKey, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
