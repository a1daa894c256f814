use crate::common::{PageId, PAGE_SIZE};

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4;

/// Most records that fit on the header page
pub const MAX_HEADER_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// Read-only view of the header page: a packed sequence of
/// (index name, root page id) records on page 0.
pub struct HeaderView<'a> {
    data: &'a [u8],
}

impl<'a> HeaderView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        let bytes: [u8; 4] = self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes) as usize
    }

    fn name_at(&self, index: usize) -> &[u8] {
        let offset = RECORDS_OFFSET + index * RECORD_SIZE;
        let name = &self.data[offset..offset + NAME_SIZE];
        let end = name.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE);
        &name[..end]
    }

    fn root_at(&self, index: usize) -> PageId {
        let offset = RECORDS_OFFSET + index * RECORD_SIZE + NAME_SIZE;
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        PageId::new(u32::from_le_bytes(bytes))
    }

    fn find(&self, name: &str) -> Option<usize> {
        (0..self.record_count()).find(|&i| self.name_at(i) == name.as_bytes())
    }

    /// Root page id recorded for `name`; None if no record exists.
    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        self.find(name).map(|i| self.root_at(i))
    }
}

/// Mutable view of the header page.
pub struct HeaderViewMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderViewMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn view(&self) -> HeaderView<'_> {
        HeaderView::new(self.data)
    }

    fn set_record_count(&mut self, count: usize) {
        self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn write_record(&mut self, index: usize, name: &str, root: PageId) {
        let offset = RECORDS_OFFSET + index * RECORD_SIZE;
        let name_slot = &mut self.data[offset..offset + NAME_SIZE];
        name_slot.fill(0);
        name_slot[..name.len()].copy_from_slice(name.as_bytes());
        self.data[offset + NAME_SIZE..offset + RECORD_SIZE]
            .copy_from_slice(&root.as_u32().to_le_bytes());
    }

    /// Appends a record. Returns false when the name already exists, does
    /// not fit, or the page is full.
    pub fn insert_record(&mut self, name: &str, root: PageId) -> bool {
        if name.len() > NAME_SIZE || name.is_empty() {
            return false;
        }
        let count = self.view().record_count();
        if count >= MAX_HEADER_RECORDS || self.view().find(name).is_some() {
            return false;
        }
        self.write_record(count, name, root);
        self.set_record_count(count + 1);
        true
    }

    /// Rewrites the root id of an existing record. Returns false when the
    /// name has no record.
    pub fn update_record(&mut self, name: &str, root: PageId) -> bool {
        let Some(index) = self.view().find(name) else {
            return false;
        };
        self.write_record(index, name, root);
        true
    }
}
