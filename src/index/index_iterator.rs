use std::sync::Arc;

use log::warn;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::Rid;

use super::leaf_page::LeafPageRef;
use super::IndexKey;

/// Ordered scan over the leaf linked list.
///
/// The iterator owns exactly one pinned, read-latched leaf at a time. When a
/// leaf is exhausted it releases the guard *before* fetching the successor,
/// so a scan never holds a latch while waiting for another - which is what
/// lets delete rebalancing write-latch siblings without deadlock. Empty
/// leaves are skipped.
pub struct IndexIterator<K> {
    bpm: Arc<BufferPoolManager>,
    leaf_guard: Option<ReadPageGuard>,
    index: usize,
    _marker: std::marker::PhantomData<K>,
}

impl<K: IndexKey> IndexIterator<K> {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, leaf_guard: Option<ReadPageGuard>) -> Self {
        Self {
            bpm,
            leaf_guard,
            index: 0,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn is_end(&self) -> bool {
        self.leaf_guard.is_none()
    }
}

impl<K: IndexKey> Iterator for IndexIterator<K> {
    type Item = (K, Rid);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let guard = self.leaf_guard.as_ref()?;
            let leaf = LeafPageRef::<K>::new(guard.data());

            if self.index < leaf.size() {
                let item = (leaf.key_at(self.index), leaf.value_at(self.index));
                self.index += 1;
                return Some(item);
            }

            let next_id = leaf.next_page_id();
            self.leaf_guard = None;
            if !next_id.is_valid() {
                return None;
            }
            match self.bpm.fetch_page_read(next_id) {
                Ok(next_guard) => {
                    self.leaf_guard = Some(next_guard);
                    self.index = 0;
                }
                Err(e) => {
                    warn!("iterator stopped: failed to fetch leaf {}: {}", next_id, e);
                    return None;
                }
            }
        }
    }
}
