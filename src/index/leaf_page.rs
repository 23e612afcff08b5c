use std::cmp::Ordering;

use crate::common::{PageId, Rid, INVALID_PAGE_ID, PAGE_SIZE};

use super::btree_page::{
    get_i32, get_u32, leaf_min_size, put_i32, put_u32, MAX_SIZE_OFFSET, PAGE_ID_OFFSET,
    PAGE_TYPE_LEAF, PAGE_TYPE_OFFSET, PARENT_PAGE_ID_OFFSET, SIZE_OFFSET,
};
use super::{IndexKey, KeyComparator};

const NEXT_PAGE_ID_OFFSET: usize = 20;
pub(crate) const LEAF_HEADER_SIZE: usize = 24;

const RID_SIZE: usize = 8;

/// Number of (key, rid) slots that physically fit in a leaf page.
pub(crate) fn leaf_capacity<K: IndexKey>() -> usize {
    (PAGE_SIZE - LEAF_HEADER_SIZE) / (K::SIZE + RID_SIZE)
}

fn slot_offset<K: IndexKey>(index: usize) -> usize {
    LEAF_HEADER_SIZE + index * (K::SIZE + RID_SIZE)
}

fn read_entry<K: IndexKey>(data: &[u8], index: usize) -> (K, Rid) {
    let off = slot_offset::<K>(index);
    let key = K::read_from(&data[off..off + K::SIZE]);
    let rid = Rid::new(
        get_i32(data, off + K::SIZE),
        get_u32(data, off + K::SIZE + 4),
    );
    (key, rid)
}

fn write_entry<K: IndexKey>(data: &mut [u8], index: usize, key: &K, rid: Rid) {
    let off = slot_offset::<K>(index);
    key.write_to(&mut data[off..off + K::SIZE]);
    put_i32(data, off + K::SIZE, rid.page_id);
    put_u32(data, off + K::SIZE + 4, rid.slot_num);
}

/// First slot whose key is >= the probe (lower bound, binary search).
fn key_index<K: IndexKey, C: KeyComparator<K>>(
    data: &[u8],
    size: usize,
    key: &K,
    comparator: &C,
) -> usize {
    let mut left = 0;
    let mut right = size;
    while left < right {
        let mid = left + (right - left) / 2;
        let (mid_key, _) = read_entry::<K>(data, mid);
        if comparator.compare(&mid_key, key) == Ordering::Less {
            left = mid + 1;
        } else {
            right = mid;
        }
    }
    left
}

/// Read-only view of a leaf page: a sorted run of (key, rid) slots threaded
/// into the leaf linked list by `next_page_id`.
pub struct LeafPageRef<'a, K> {
    data: &'a [u8],
    _marker: std::marker::PhantomData<K>,
}

impl<'a, K: IndexKey> LeafPageRef<'a, K> {
    pub fn new(data: &'a [u8]) -> Self {
        debug_assert_eq!(get_u32(data, PAGE_TYPE_OFFSET), PAGE_TYPE_LEAF);
        Self {
            data,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn size(&self) -> usize {
        get_u32(self.data, SIZE_OFFSET) as usize
    }

    pub fn max_size(&self) -> usize {
        get_u32(self.data, MAX_SIZE_OFFSET) as usize
    }

    pub fn min_size(&self) -> usize {
        leaf_min_size(self.max_size())
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(get_i32(self.data, PAGE_ID_OFFSET))
    }

    pub fn parent_page_id(&self) -> PageId {
        PageId::new(get_i32(self.data, PARENT_PAGE_ID_OFFSET))
    }

    pub fn is_root(&self) -> bool {
        self.parent_page_id() == INVALID_PAGE_ID
    }

    pub fn next_page_id(&self) -> PageId {
        PageId::new(get_i32(self.data, NEXT_PAGE_ID_OFFSET))
    }

    pub fn key_at(&self, index: usize) -> K {
        assert!(index < self.size());
        read_entry::<K>(self.data, index).0
    }

    pub fn value_at(&self, index: usize) -> Rid {
        assert!(index < self.size());
        read_entry::<K>(self.data, index).1
    }

    pub fn lookup<C: KeyComparator<K>>(&self, key: &K, comparator: &C) -> Option<Rid> {
        let size = self.size();
        let index = key_index(self.data, size, key, comparator);
        if index < size {
            let (found, rid) = read_entry::<K>(self.data, index);
            if comparator.compare(&found, key) == Ordering::Equal {
                return Some(rid);
            }
        }
        None
    }
}

/// Mutable view of a leaf page.
pub struct LeafPageMut<'a, K> {
    data: &'a mut [u8],
    _marker: std::marker::PhantomData<K>,
}

impl<'a, K: IndexKey> LeafPageMut<'a, K> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self {
            data,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn init(&mut self, page_id: PageId, parent_id: PageId, max_size: usize) {
        assert!(max_size + 1 <= leaf_capacity::<K>(), "max size exceeds page");
        self.data.fill(0);
        put_u32(self.data, PAGE_TYPE_OFFSET, PAGE_TYPE_LEAF);
        put_u32(self.data, SIZE_OFFSET, 0);
        put_u32(self.data, MAX_SIZE_OFFSET, max_size as u32);
        put_i32(self.data, PAGE_ID_OFFSET, page_id.as_i32());
        put_i32(self.data, PARENT_PAGE_ID_OFFSET, parent_id.as_i32());
        put_i32(self.data, NEXT_PAGE_ID_OFFSET, INVALID_PAGE_ID.as_i32());
    }

    pub fn size(&self) -> usize {
        get_u32(self.data, SIZE_OFFSET) as usize
    }

    fn set_size(&mut self, size: usize) {
        put_u32(self.data, SIZE_OFFSET, size as u32);
    }

    pub fn max_size(&self) -> usize {
        get_u32(self.data, MAX_SIZE_OFFSET) as usize
    }

    pub fn min_size(&self) -> usize {
        leaf_min_size(self.max_size())
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(get_i32(self.data, PAGE_ID_OFFSET))
    }

    pub fn parent_page_id(&self) -> PageId {
        PageId::new(get_i32(self.data, PARENT_PAGE_ID_OFFSET))
    }

    pub fn set_parent_page_id(&mut self, parent: PageId) {
        put_i32(self.data, PARENT_PAGE_ID_OFFSET, parent.as_i32());
    }

    pub fn is_root(&self) -> bool {
        self.parent_page_id() == INVALID_PAGE_ID
    }

    pub fn next_page_id(&self) -> PageId {
        PageId::new(get_i32(self.data, NEXT_PAGE_ID_OFFSET))
    }

    pub fn set_next_page_id(&mut self, next: PageId) {
        put_i32(self.data, NEXT_PAGE_ID_OFFSET, next.as_i32());
    }

    pub fn key_at(&self, index: usize) -> K {
        assert!(index < self.size());
        read_entry::<K>(self.data, index).0
    }

    pub fn value_at(&self, index: usize) -> Rid {
        assert!(index < self.size());
        read_entry::<K>(self.data, index).1
    }

    pub fn lookup<C: KeyComparator<K>>(&self, key: &K, comparator: &C) -> Option<Rid> {
        let size = self.size();
        let index = key_index(self.data, size, key, comparator);
        if index < size {
            let (found, rid) = read_entry::<K>(self.data, index);
            if comparator.compare(&found, key) == Ordering::Equal {
                return Some(rid);
            }
        }
        None
    }

    /// Sorted insertion. The caller is responsible for rejecting duplicates
    /// and for splitting once the size reaches max_size.
    pub fn insert<C: KeyComparator<K>>(&mut self, key: &K, rid: Rid, comparator: &C) -> usize {
        let size = self.size();
        assert!(size < leaf_capacity::<K>(), "leaf page overflow");
        let index = key_index(self.data, size, key, comparator);
        let mut i = size;
        while i > index {
            let (k, v) = read_entry::<K>(self.data, i - 1);
            write_entry::<K>(self.data, i, &k, v);
            i -= 1;
        }
        write_entry::<K>(self.data, index, key, rid);
        self.set_size(size + 1);
        size + 1
    }

    pub fn remove(&mut self, index: usize) {
        let size = self.size();
        assert!(index < size);
        for i in index..size - 1 {
            let (k, v) = read_entry::<K>(self.data, i + 1);
            write_entry::<K>(self.data, i, &k, v);
        }
        self.set_size(size - 1);
    }

    /// Removes the record with the given key if present; returns the new size.
    pub fn remove_record<C: KeyComparator<K>>(&mut self, key: &K, comparator: &C) -> usize {
        let size = self.size();
        let index = key_index(self.data, size, key, comparator);
        if index < size {
            let (found, _) = read_entry::<K>(self.data, index);
            if comparator.compare(&found, key) == Ordering::Equal {
                self.remove(index);
            }
        }
        self.size()
    }

    /// Split support: the upper half moves to the (empty) recipient. The
    /// caller wires the leaf linked list.
    pub fn move_half_to(&mut self, recipient: &mut LeafPageMut<'_, K>) {
        let size = self.size();
        let split = size / 2;
        let moved: Vec<(K, Rid)> = (split..size).map(|i| read_entry::<K>(self.data, i)).collect();
        self.set_size(split);
        recipient.copy_n_from(&moved);
    }

    /// Merge support: every entry appends to the recipient. The caller
    /// bypasses this page in the linked list afterwards.
    pub fn move_all_to(&mut self, recipient: &mut LeafPageMut<'_, K>) {
        let size = self.size();
        let moved: Vec<(K, Rid)> = (0..size).map(|i| read_entry::<K>(self.data, i)).collect();
        self.set_size(0);
        recipient.copy_n_from(&moved);
    }

    /// Borrow support: this page's first entry moves to the recipient's end
    /// (recipient is the left sibling).
    pub fn move_first_to_end_of(&mut self, recipient: &mut LeafPageMut<'_, K>) {
        let (k, v) = read_entry::<K>(self.data, 0);
        recipient.copy_last_from(&k, v);
        self.remove(0);
    }

    /// Borrow support: this page's last entry moves to the recipient's front
    /// (recipient is the right sibling).
    pub fn move_last_to_front_of(&mut self, recipient: &mut LeafPageMut<'_, K>) {
        let size = self.size();
        let (k, v) = read_entry::<K>(self.data, size - 1);
        self.set_size(size - 1);
        recipient.copy_first_from(&k, v);
    }

    /// Appends a run of entries that already sort after everything here.
    fn copy_n_from(&mut self, entries: &[(K, Rid)]) {
        for (k, v) in entries {
            self.copy_last_from(k, *v);
        }
    }

    fn copy_last_from(&mut self, key: &K, rid: Rid) {
        let size = self.size();
        assert!(size < leaf_capacity::<K>(), "leaf page overflow");
        write_entry::<K>(self.data, size, key, rid);
        self.set_size(size + 1);
    }

    fn copy_first_from(&mut self, key: &K, rid: Rid) {
        let size = self.size();
        assert!(size < leaf_capacity::<K>(), "leaf page overflow");
        let mut i = size;
        while i > 0 {
            let (k, v) = read_entry::<K>(self.data, i - 1);
            write_entry::<K>(self.data, i, &k, v);
            i -= 1;
        }
        write_entry::<K>(self.data, 0, key, rid);
        self.set_size(size + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{GenericKey, IntegerComparator};

    type Key = GenericKey<8>;

    fn make_leaf(data: &mut [u8]) -> LeafPageMut<'_, Key> {
        let mut leaf = LeafPageMut::new(data);
        leaf.init(PageId::new(1), INVALID_PAGE_ID, 32);
        leaf
    }

    #[test]
    fn test_sorted_insert_and_lookup() {
        let cmp = IntegerComparator;
        let mut data = [0u8; PAGE_SIZE];
        let mut leaf = make_leaf(&mut data);

        for v in [30i64, 10, 20, 40] {
            leaf.insert(&Key::from_integer(v), Rid::from_integer(v), &cmp);
        }

        assert_eq!(leaf.size(), 4);
        let keys: Vec<i64> = (0..4).map(|i| leaf.key_at(i).as_integer()).collect();
        assert_eq!(keys, vec![10, 20, 30, 40]);

        assert_eq!(
            leaf.lookup(&Key::from_integer(20), &cmp),
            Some(Rid::from_integer(20))
        );
        assert_eq!(leaf.lookup(&Key::from_integer(25), &cmp), None);
    }

    #[test]
    fn test_remove_record() {
        let cmp = IntegerComparator;
        let mut data = [0u8; PAGE_SIZE];
        let mut leaf = make_leaf(&mut data);

        for v in 1..=5i64 {
            leaf.insert(&Key::from_integer(v), Rid::from_integer(v), &cmp);
        }
        assert_eq!(leaf.remove_record(&Key::from_integer(3), &cmp), 4);
        // Removing a missing key leaves the size unchanged.
        assert_eq!(leaf.remove_record(&Key::from_integer(3), &cmp), 4);
        let keys: Vec<i64> = (0..4).map(|i| leaf.key_at(i).as_integer()).collect();
        assert_eq!(keys, vec![1, 2, 4, 5]);
    }

    #[test]
    fn test_move_half_to() {
        let cmp = IntegerComparator;
        let mut left_data = [0u8; PAGE_SIZE];
        let mut right_data = [0u8; PAGE_SIZE];
        let mut left = make_leaf(&mut left_data);

        for v in 1..=6i64 {
            left.insert(&Key::from_integer(v), Rid::from_integer(v), &cmp);
        }

        let mut right = LeafPageMut::new(&mut right_data);
        right.init(PageId::new(2), INVALID_PAGE_ID, 32);
        left.move_half_to(&mut right);

        assert_eq!(left.size(), 3);
        assert_eq!(right.size(), 3);
        assert_eq!(right.key_at(0).as_integer(), 4);
        assert_eq!(right.key_at(2).as_integer(), 6);
    }

    #[test]
    fn test_borrow_moves() {
        let cmp = IntegerComparator;
        let mut left_data = [0u8; PAGE_SIZE];
        let mut right_data = [0u8; PAGE_SIZE];
        let mut left = make_leaf(&mut left_data);
        let mut right = LeafPageMut::new(&mut right_data);
        right.init(PageId::new(2), INVALID_PAGE_ID, 32);

        for v in [1i64, 2, 3] {
            left.insert(&Key::from_integer(v), Rid::from_integer(v), &cmp);
        }
        for v in [10i64, 11] {
            right.insert(&Key::from_integer(v), Rid::from_integer(v), &cmp);
        }

        left.move_last_to_front_of(&mut right);
        assert_eq!(right.key_at(0).as_integer(), 3);
        assert_eq!(left.size(), 2);

        right.move_first_to_end_of(&mut left);
        assert_eq!(left.key_at(2).as_integer(), 3);
        assert_eq!(right.key_at(0).as_integer(), 10);
    }
}
