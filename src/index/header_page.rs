use crate::common::{PageId, PAGE_SIZE};

use super::btree_page::{get_i32, get_u32, put_i32, put_u32};

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4;
const MAX_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

fn record_offset(index: usize) -> usize {
    RECORDS_OFFSET + index * RECORD_SIZE
}

fn name_matches(data: &[u8], index: usize, name: &[u8]) -> bool {
    let off = record_offset(index);
    let stored = &data[off..off + NAME_SIZE];
    stored[..name.len()] == *name && stored[name.len()..].iter().all(|&b| b == 0)
}

/// Read-only view of the header page: a count followed by fixed-size
/// (index name, root page id) records. Lives at HEADER_PAGE_ID and survives
/// restarts, so every root change is written through the buffer pool.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        get_u32(self.data, RECORD_COUNT_OFFSET) as usize
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        let name = name.as_bytes();
        assert!(name.len() <= NAME_SIZE, "index name too long");
        (0..self.record_count())
            .find(|&i| name_matches(self.data, i, name))
            .map(|i| PageId::new(get_i32(self.data, record_offset(i) + NAME_SIZE)))
    }
}

/// Mutable view of the header page.
pub struct HeaderPageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPageMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
    }

    pub fn record_count(&self) -> usize {
        get_u32(self.data, RECORD_COUNT_OFFSET) as usize
    }

    fn set_record_count(&mut self, count: usize) {
        put_u32(self.data, RECORD_COUNT_OFFSET, count as u32);
    }

    fn find(&self, name: &[u8]) -> Option<usize> {
        (0..self.record_count()).find(|&i| name_matches(self.data, i, name))
    }

    /// Appends a record; false if the name already exists or the page is full.
    pub fn insert_record(&mut self, name: &str, root_id: PageId) -> bool {
        let name = name.as_bytes();
        assert!(name.len() <= NAME_SIZE, "index name too long");
        if self.find(name).is_some() {
            return false;
        }
        let count = self.record_count();
        if count >= MAX_RECORDS {
            return false;
        }
        let off = record_offset(count);
        self.data[off..off + NAME_SIZE].fill(0);
        self.data[off..off + name.len()].copy_from_slice(name);
        put_i32(self.data, off + NAME_SIZE, root_id.as_i32());
        self.set_record_count(count + 1);
        true
    }

    /// Rewrites an existing record; false if the name is absent.
    pub fn update_record(&mut self, name: &str, root_id: PageId) -> bool {
        let name = name.as_bytes();
        assert!(name.len() <= NAME_SIZE, "index name too long");
        match self.find(name) {
            Some(i) => {
                put_i32(self.data, record_offset(i) + NAME_SIZE, root_id.as_i32());
                true
            }
            None => false,
        }
    }

    /// Drops a record; false if the name is absent.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let name = name.as_bytes();
        assert!(name.len() <= NAME_SIZE, "index name too long");
        match self.find(name) {
            Some(i) => {
                let count = self.record_count();
                for j in i..count - 1 {
                    let (src, dst) = (record_offset(j + 1), record_offset(j));
                    self.data.copy_within(src..src + RECORD_SIZE, dst);
                }
                self.set_record_count(count - 1);
                true
            }
            None => false,
        }
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        let name = name.as_bytes();
        assert!(name.len() <= NAME_SIZE, "index name too long");
        self.find(name)
            .map(|i| PageId::new(get_i32(self.data, record_offset(i) + NAME_SIZE)))
    }
}
