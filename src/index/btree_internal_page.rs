use std::cmp::Ordering;

use crate::common::{PageId, KEY_SIZE, PAGE_SIZE};

use super::btree_page::{
    read_u16, read_u32, write_u32, BTreePage, BTreePageMut, PageType, PAGE_HEADER_SIZE,
    SIZE_OFFSET,
};
use super::key_comparator::{IndexKey, KeyComparator};

/// key (8) + child page id (4), packed
const INTERNAL_ENTRY_SIZE: usize = KEY_SIZE + 4;

/// Default internal fanout; one slot reserved for transient overflow,
/// as with leaves.
pub const INTERNAL_MAX_SIZE: usize = (PAGE_SIZE - PAGE_HEADER_SIZE) / INTERNAL_ENTRY_SIZE - 1;

fn entry_offset(index: usize) -> usize {
    PAGE_HEADER_SIZE + index * INTERNAL_ENTRY_SIZE
}

/// Read-only view of an internal page.
///
/// Entry 0's key slot is unused; its child holds everything below the key at
/// entry 1. Keys at entries `1..size` are strictly increasing, and the child
/// at entry `i` holds keys in `[key(i), key(i+1))`.
#[derive(Clone, Copy)]
pub struct InternalView<'a> {
    data: &'a [u8],
}

impl<'a> InternalView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        debug_assert_eq!(BTreePage::new(data).page_type(), PageType::Internal);
        Self { data }
    }

    pub fn header(&self) -> BTreePage<'a> {
        BTreePage::new(self.data)
    }

    pub fn size(&self) -> usize {
        read_u16(self.data, SIZE_OFFSET) as usize
    }

    pub fn key_at(&self, index: usize) -> IndexKey {
        debug_assert!(index >= 1 && index < self.size());
        let offset = entry_offset(index);
        IndexKey::from_bytes(self.data[offset..offset + KEY_SIZE].try_into().unwrap())
    }

    pub fn value_at(&self, index: usize) -> PageId {
        debug_assert!(index < self.size());
        PageId::new(read_u32(self.data, entry_offset(index) + KEY_SIZE))
    }

    /// Index of the entry whose child is `value`; None if absent.
    pub fn value_index(&self, value: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == value)
    }

    /// Child to descend into for `key`: the child of the greatest separator
    /// not exceeding it.
    pub fn lookup(&self, key: &IndexKey, cmp: &dyn KeyComparator) -> PageId {
        debug_assert!(self.size() > 1);
        let mut lo = 1;
        let mut hi = self.size() - 1;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            if cmp.compare(&self.key_at(mid), key) != Ordering::Greater {
                lo = mid + 1;
            } else {
                hi = mid - 1;
            }
        }
        self.value_at(lo - 1)
    }

    pub fn children(&self) -> Vec<PageId> {
        (0..self.size()).map(|i| self.value_at(i)).collect()
    }
}

/// Mutable view of an internal page.
pub struct InternalViewMut<'a> {
    data: &'a mut [u8],
}

impl<'a> InternalViewMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        debug_assert_eq!(BTreePage::new(data).page_type(), PageType::Internal);
        Self { data }
    }

    /// Formats a fresh page as an empty internal page.
    pub fn init(data: &'a mut [u8], page_id: PageId, parent: PageId, max_size: usize) -> Self {
        let mut header = BTreePageMut::new(data);
        header.set_page_type(PageType::Internal);
        header.set_size(0);
        header.set_max_size(max_size);
        header.set_page_id(page_id);
        header.set_parent_page_id(parent);
        Self { data }
    }

    pub fn view(&self) -> InternalView<'_> {
        InternalView::new(self.data)
    }

    fn set_size(&mut self, size: usize) {
        BTreePageMut::new(self.data).set_size(size);
    }

    pub fn set_key_at(&mut self, index: usize, key: &IndexKey) {
        debug_assert!(index >= 1 && index < self.view().size());
        let offset = entry_offset(index);
        self.data[offset..offset + KEY_SIZE].copy_from_slice(key.as_bytes());
    }

    fn write_entry(&mut self, index: usize, key: &IndexKey, child: PageId) {
        let offset = entry_offset(index);
        self.data[offset..offset + KEY_SIZE].copy_from_slice(key.as_bytes());
        write_u32(self.data, offset + KEY_SIZE, child.as_u32());
    }

    /// Turns an empty page into a root with two children separated by
    /// `new_key`.
    pub fn populate_new_root(&mut self, old_child: PageId, new_key: &IndexKey, new_child: PageId) {
        self.write_entry(0, &IndexKey::default(), old_child);
        self.write_entry(1, new_key, new_child);
        self.set_size(2);
    }

    /// Inserts `(new_key, new_child)` immediately after the entry whose
    /// child is `old_child`. Returns the new size.
    pub fn insert_node_after(
        &mut self,
        old_child: PageId,
        new_key: &IndexKey,
        new_child: PageId,
    ) -> usize {
        let size = self.view().size();
        let index = self
            .view()
            .value_index(old_child)
            .expect("old child must be present")
            + 1;
        self.data
            .copy_within(entry_offset(index)..entry_offset(size), entry_offset(index + 1));
        self.write_entry(index, new_key, new_child);
        self.set_size(size + 1);
        size + 1
    }

    /// Removes the entry at `index`, shifting the rest down.
    pub fn remove(&mut self, index: usize) {
        let size = self.view().size();
        debug_assert!(index < size);
        self.data
            .copy_within(entry_offset(index + 1)..entry_offset(size), entry_offset(index));
        self.set_size(size - 1);
    }

    /// Collapses a single-child root, returning that child.
    pub fn remove_and_return_only_child(&mut self) -> PageId {
        debug_assert_eq!(self.view().size(), 1);
        let child = self.view().value_at(0);
        self.set_size(0);
        child
    }

    /// Moves the upper half of the entries into the fresh `recipient`.
    /// Returns the separator to push into the parent (the first moved key)
    /// and the moved children, which the caller reparents.
    pub fn move_half_to(&mut self, recipient: &mut InternalViewMut<'_>) -> (IndexKey, Vec<PageId>) {
        let size = self.view().size();
        let split_at = size / 2;
        let separator = self.view().key_at(split_at);
        let mut moved = Vec::with_capacity(size - split_at);
        for i in split_at..size {
            let key = self.view().key_at(i);
            let child = self.view().value_at(i);
            recipient.write_entry(i - split_at, &key, child);
            moved.push(child);
        }
        recipient.set_size(size - split_at);
        self.set_size(split_at);
        (separator, moved)
    }

    /// Moves every entry into the tail of the left sibling `recipient`,
    /// pulling `middle_key` (the parent separator) down as the key of this
    /// page's first entry. Returns the moved children for reparenting.
    pub fn move_all_to(
        &mut self,
        recipient: &mut InternalViewMut<'_>,
        middle_key: &IndexKey,
    ) -> Vec<PageId> {
        let size = self.view().size();
        let start = recipient.view().size();
        let mut moved = Vec::with_capacity(size);
        for i in 0..size {
            let key = if i == 0 {
                *middle_key
            } else {
                self.view().key_at(i)
            };
            let child = self.view().value_at(i);
            recipient.write_entry(start + i, &key, child);
            moved.push(child);
        }
        recipient.set_size(start + size);
        self.set_size(0);
        moved
    }

    /// Moves this page's first child to the tail of the left sibling
    /// `recipient`, keyed by `separator` (the parent key for this page).
    /// Returns the key promoted to the parent and the moved child.
    pub fn move_first_to_end_of(
        &mut self,
        recipient: &mut InternalViewMut<'_>,
        separator: &IndexKey,
    ) -> (IndexKey, PageId) {
        let size = self.view().size();
        debug_assert!(size > 1);
        let child = self.view().value_at(0);
        let promoted = self.view().key_at(1);

        let tail = recipient.view().size();
        recipient.write_entry(tail, separator, child);
        recipient.set_size(tail + 1);

        self.data
            .copy_within(entry_offset(1)..entry_offset(size), entry_offset(0));
        self.set_size(size - 1);
        (promoted, child)
    }

    /// Moves this page's last child to the front of the right sibling
    /// `recipient`; `separator` is the parent key for `recipient`, which is
    /// pushed down next to the old first child. Returns the key promoted to
    /// the parent and the moved child.
    pub fn move_last_to_front_of(
        &mut self,
        recipient: &mut InternalViewMut<'_>,
        separator: &IndexKey,
    ) -> (IndexKey, PageId) {
        let size = self.view().size();
        debug_assert!(size > 1);
        let promoted = self.view().key_at(size - 1);
        let child = self.view().value_at(size - 1);
        self.set_size(size - 1);

        let recipient_size = recipient.view().size();
        recipient.data.copy_within(
            entry_offset(0)..entry_offset(recipient_size),
            entry_offset(1),
        );
        recipient.write_entry(0, &IndexKey::default(), child);
        recipient.set_size(recipient_size + 1);
        recipient.set_key_at(1, separator);
        (promoted, child)
    }
}
