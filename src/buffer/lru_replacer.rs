use std::collections::HashMap;

use parking_lot::Mutex;

use crate::common::FrameId;

/// Doubly linked list node, slab-allocated inside `LruInner::nodes`.
struct Node {
    frame_id: FrameId,
    prev: Option<usize>,
    next: Option<usize>,
}

struct LruInner {
    nodes: Vec<Node>,
    /// Recycled slots in `nodes`
    free: Vec<usize>,
    /// Most recent insertion
    head: Option<usize>,
    /// Eviction victim
    tail: Option<usize>,
    /// FrameId -> slot in `nodes`, for O(1) erase
    index: HashMap<FrameId, usize>,
}

/// LRU replacement policy over eviction candidates.
///
/// The replacer tracks frames that are allowed to be evicted, not all frames:
/// the buffer pool inserts a frame when its pin count drops to zero and
/// erases it when the frame is pinned again. `insert` promotes to the head,
/// `victim` removes from the tail. All operations are O(1) under one mutex.
pub struct LruReplacer {
    inner: Mutex<LruInner>,
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LruInner {
                nodes: Vec::new(),
                free: Vec::new(),
                head: None,
                tail: None,
                index: HashMap::new(),
            }),
        }
    }

    /// Makes `frame_id` the most recent candidate, removing any prior
    /// position it held.
    pub fn insert(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        inner.detach(frame_id);

        let old_head = inner.head;
        let node = Node {
            frame_id,
            prev: None,
            next: old_head,
        };
        let slot = match inner.free.pop() {
            Some(slot) => {
                inner.nodes[slot] = node;
                slot
            }
            None => {
                inner.nodes.push(node);
                inner.nodes.len() - 1
            }
        };

        if let Some(old_head) = old_head {
            inner.nodes[old_head].prev = Some(slot);
        }
        inner.head = Some(slot);
        if inner.tail.is_none() {
            inner.tail = Some(slot);
        }
        inner.index.insert(frame_id, slot);
    }

    /// Removes and returns the least recent candidate, if any.
    pub fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        let slot = inner.tail?;
        let frame_id = inner.nodes[slot].frame_id;
        inner.detach(frame_id);
        Some(frame_id)
    }

    /// Removes `frame_id` from the candidate set. Returns false if it was
    /// not a member.
    pub fn erase(&self, frame_id: FrameId) -> bool {
        self.inner.lock().detach(frame_id)
    }

    pub fn size(&self) -> usize {
        self.inner.lock().index.len()
    }
}

impl LruInner {
    fn detach(&mut self, frame_id: FrameId) -> bool {
        let Some(slot) = self.index.remove(&frame_id) else {
            return false;
        };
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.free.push(slot);
        true
    }
}
