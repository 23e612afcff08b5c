use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::{RwLock, RwLockWriteGuard};

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{PageId, Result, Rid, SiltError, HEADER_PAGE_ID, INVALID_PAGE_ID};

use super::btree_page::{BTreePageMut, BTreePageRef};
use super::header_page::{HeaderPageMut, HeaderPageRef};
use super::index_iterator::IndexIterator;
use super::internal_page::{internal_capacity, InternalPageMut, InternalPageRef};
use super::leaf_page::{leaf_capacity, LeafPageMut, LeafPageRef};
use super::{IndexKey, KeyComparator};

/// Traversal tag: determines the latch mode and the "safe child" predicate
/// used while crabbing down the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Search,
    Insert,
    Delete,
}

/// Operation-scoped page set. Write descents collect their ancestor chain
/// here; the guards (and the root-id lock standing in for a "virtual parent"
/// of the root) are released in bulk when the operation finishes, or early
/// as soon as a safe child truncates the chain.
struct Context<'a> {
    root_guard: Option<RwLockWriteGuard<'a, PageId>>,
    write_set: Vec<WritePageGuard>,
}

impl<'a> Context<'a> {
    fn read_only() -> Self {
        Self {
            root_guard: None,
            write_set: Vec::new(),
        }
    }
}

/// A concurrent B+ tree index mapping fixed-width keys to record ids.
///
/// All structural state lives in pages owned by the buffer pool; the tree
/// itself only tracks the root page id (persisted in the header page under
/// the index name) and its size configuration. Writers descend with latch
/// crabbing: a contiguous top-down chain of write latches that shrinks as
/// soon as a child is known not to split or merge.
pub struct BPlusTree<K, C> {
    index_name: String,
    bpm: Arc<BufferPoolManager>,
    root_page_id: RwLock<PageId>,
    comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
    _marker: std::marker::PhantomData<K>,
}

impl<K: IndexKey, C: KeyComparator<K>> BPlusTree<K, C> {
    /// Opens the named index, recovering its root from the header page if it
    /// was created before. Max sizes are clamped to the physical slot
    /// capacity of a page (keeping one spare slot for transient overflow).
    pub fn new(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let leaf_max_size = leaf_max_size.min(leaf_capacity::<K>() - 1);
        let internal_max_size = internal_max_size.min(internal_capacity::<K>() - 2);
        assert!(leaf_max_size >= 2, "leaf max size too small");
        assert!(internal_max_size >= 3, "internal max size too small");

        let index_name = index_name.into();
        let root_page_id = {
            let guard = bpm.fetch_page_read(HEADER_PAGE_ID)?;
            HeaderPageRef::new(guard.data())
                .get_root_id(&index_name)
                .unwrap_or(INVALID_PAGE_ID)
        };

        Ok(Self {
            index_name,
            bpm,
            root_page_id: RwLock::new(root_page_id),
            comparator,
            leaf_max_size,
            internal_max_size,
            _marker: std::marker::PhantomData,
        })
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.read().is_valid()
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    /// Point lookup. Returns the record id stored under the key, if any.
    pub fn get_value(&self, key: &K) -> Result<Option<Rid>> {
        let mut ctx = Context::read_only();
        let guard = match self.find_leaf(Some(key), Operation::Search, &mut ctx)? {
            Some(guard) => guard,
            None => return Ok(None),
        };
        let leaf = LeafPageRef::<K>::new(guard.data());
        Ok(leaf.lookup(key, &self.comparator))
    }

    /// Inserts the pair; returns false (leaving the tree untouched) if the
    /// key already exists.
    pub fn insert(&self, key: &K, rid: Rid) -> Result<bool> {
        let mut ctx = Context {
            root_guard: Some(self.root_page_id.write()),
            write_set: Vec::new(),
        };
        let root_id = **ctx.root_guard.as_ref().unwrap();
        if !root_id.is_valid() {
            self.start_new_tree(&mut ctx, key, rid)?;
            return Ok(true);
        }

        self.find_leaf(Some(key), Operation::Insert, &mut ctx)?;

        {
            let leaf_guard = ctx.write_set.last().unwrap();
            let leaf = LeafPageRef::<K>::new(leaf_guard.data());
            if leaf.lookup(key, &self.comparator).is_some() {
                return Ok(false);
            }
        }

        let needs_split = {
            let leaf_guard = ctx.write_set.last_mut().unwrap();
            let mut leaf = LeafPageMut::<K>::new(leaf_guard.data_mut());
            let new_size = leaf.insert(key, rid, &self.comparator);
            new_size >= leaf.max_size()
        };
        if needs_split {
            self.split_leaf(&mut ctx)?;
        }
        Ok(true)
    }

    /// Removes the key; returns false if it was not present. Underflowing
    /// pages are rebalanced by borrowing from or merging with a sibling, and
    /// the root collapses when it runs out of entries.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let mut ctx = Context {
            root_guard: Some(self.root_page_id.write()),
            write_set: Vec::new(),
        };
        let root_id = **ctx.root_guard.as_ref().unwrap();
        if !root_id.is_valid() {
            return Ok(false);
        }

        self.find_leaf(Some(key), Operation::Delete, &mut ctx)?;

        {
            let leaf_guard = ctx.write_set.last().unwrap();
            let leaf = LeafPageRef::<K>::new(leaf_guard.data());
            if leaf.lookup(key, &self.comparator).is_none() {
                return Ok(false);
            }
        }

        let (is_root, new_size, min_size) = {
            let leaf_guard = ctx.write_set.last_mut().unwrap();
            let mut leaf = LeafPageMut::<K>::new(leaf_guard.data_mut());
            let new_size = leaf.remove_record(key, &self.comparator);
            (leaf.is_root(), new_size, leaf.min_size())
        };

        if is_root {
            if new_size == 0 {
                let root_guard = ctx.write_set.pop().unwrap();
                self.adjust_root(&mut ctx, root_guard)?;
            }
        } else if new_size < min_size {
            self.coalesce_or_redistribute(&mut ctx)?;
        }
        Ok(true)
    }

    /// Ordered scan from the smallest key.
    pub fn iter(&self) -> Result<IndexIterator<K>> {
        let mut ctx = Context::read_only();
        let guard = self.find_leaf(None, Operation::Search, &mut ctx)?;
        Ok(IndexIterator::new(Arc::clone(&self.bpm), guard))
    }

    /// Full-scan semantics: scanning "from" a key starts at the leftmost
    /// leaf, preserving the historical behavior of this interface.
    pub fn iter_from(&self, _key: &K) -> Result<IndexIterator<K>> {
        self.iter()
    }

    /// Bulk load: reads whitespace-separated 64-bit integers; each becomes
    /// the key and (packed) the record id.
    pub fn insert_from_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = std::fs::read_to_string(path)?;
        for token in contents.split_whitespace() {
            let value: i64 = match token.parse() {
                Ok(value) => value,
                Err(_) => break,
            };
            let mut key = K::default();
            key.set_from_integer(value);
            self.insert(&key, Rid::from_integer(value))?;
        }
        Ok(())
    }

    /// Bulk removal companion to [`Self::insert_from_file`].
    pub fn remove_from_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = std::fs::read_to_string(path)?;
        for token in contents.split_whitespace() {
            let value: i64 = match token.parse() {
                Ok(value) => value,
                Err(_) => break,
            };
            let mut key = K::default();
            key.set_from_integer(value);
            self.remove(&key)?;
        }
        Ok(())
    }

    /// Logs every page breadth-first: id, size and kind.
    pub fn print(&self) -> Result<()> {
        let root_id = self.root_page_id();
        if !root_id.is_valid() {
            info!("empty tree");
            return Ok(());
        }
        let mut queue = VecDeque::from([root_id]);
        while let Some(page_id) = queue.pop_front() {
            let guard = self.bpm.fetch_page_read(page_id)?;
            let page = BTreePageRef::new(guard.data());
            info!(
                "page {} size={} {}",
                page_id,
                page.size(),
                if page.is_leaf() { "leaf" } else { "internal" }
            );
            if !page.is_leaf() {
                let internal = InternalPageRef::<K>::new(guard.data());
                for i in 0..internal.size() {
                    queue.push_back(internal.value_at(i));
                }
            }
        }
        Ok(())
    }

    /// Writes a placeholder DOT graph.
    pub fn draw<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, "digraph BPlusTree {\n  // Visualization placeholder.\n}\n")?;
        Ok(())
    }

    /// Safe-child predicate for latch crabbing. A child is safe when this
    /// operation cannot propagate a structural change above it.
    fn is_safe(guard: &WritePageGuard, op: Operation) -> bool {
        let page = BTreePageRef::new(guard.data());
        let size = page.size();
        let max_size = page.max_size();
        match op {
            Operation::Search => true,
            Operation::Insert => {
                // A leaf must split already upon *reaching* max_size.
                if page.is_leaf() {
                    size + 1 < max_size
                } else {
                    size < max_size
                }
            }
            Operation::Delete => {
                if page.is_root() {
                    if page.is_leaf() {
                        size > 1
                    } else {
                        size > 2
                    }
                } else {
                    size > page.min_size()
                }
            }
        }
    }

    /// Tagged descent to the leaf responsible for `key` (or the leftmost
    /// leaf when `key` is None).
    ///
    /// Search: read-crabs parent to child and returns the still-latched leaf.
    /// Insert/Delete: write-latches top-down into `ctx.write_set`, releasing
    /// every ancestor (the root-id lock included) whenever the freshly
    /// latched child is safe; returns None with the leaf on top of the set.
    fn find_leaf(
        &self,
        key: Option<&K>,
        op: Operation,
        ctx: &mut Context<'_>,
    ) -> Result<Option<ReadPageGuard>> {
        if op == Operation::Search {
            let root_lock = self.root_page_id.read();
            let root_id = *root_lock;
            if !root_id.is_valid() {
                return Ok(None);
            }
            let mut guard = self.bpm.fetch_page_read(root_id)?;
            drop(root_lock);

            loop {
                let child_id = {
                    let page = BTreePageRef::new(guard.data());
                    if page.is_leaf() {
                        break;
                    }
                    let internal = InternalPageRef::<K>::new(guard.data());
                    match key {
                        Some(key) => internal.lookup(key, &self.comparator),
                        None => internal.value_at(0),
                    }
                };
                // Latch the child before the parent guard is dropped by the
                // reassignment.
                let child_guard = self.bpm.fetch_page_read(child_id)?;
                guard = child_guard;
            }
            return Ok(Some(guard));
        }

        let root_id = **ctx
            .root_guard
            .as_ref()
            .expect("write descent requires the root lock");
        let guard = self.bpm.fetch_page_write(root_id)?;
        if Self::is_safe(&guard, op) {
            ctx.root_guard = None;
        }
        ctx.write_set.push(guard);

        loop {
            let (is_leaf, child_id) = {
                let top = ctx.write_set.last().unwrap();
                let page = BTreePageRef::new(top.data());
                if page.is_leaf() {
                    (true, INVALID_PAGE_ID)
                } else {
                    let internal = InternalPageRef::<K>::new(top.data());
                    let child_id = match key {
                        Some(key) => internal.lookup(key, &self.comparator),
                        None => internal.value_at(0),
                    };
                    (false, child_id)
                }
            };
            if is_leaf {
                break;
            }
            let child_guard = self.bpm.fetch_page_write(child_id)?;
            if Self::is_safe(&child_guard, op) {
                ctx.root_guard = None;
                ctx.write_set.clear();
            }
            ctx.write_set.push(child_guard);
        }
        Ok(None)
    }

    /// First insertion into an empty tree: a fresh leaf becomes the root.
    fn start_new_tree(&self, ctx: &mut Context<'_>, key: &K, rid: Rid) -> Result<()> {
        let (root_id, mut guard) = self.bpm.new_page()?;
        {
            let mut leaf = LeafPageMut::<K>::new(guard.data_mut());
            leaf.init(root_id, INVALID_PAGE_ID, self.leaf_max_size);
            leaf.insert(key, rid, &self.comparator);
        }
        drop(guard);
        **ctx.root_guard.as_mut().unwrap() = root_id;
        self.update_root_page_id(root_id, true)
    }

    /// Splits the leaf on top of the page set: the upper half moves to a new
    /// leaf spliced into the linked list, and the first key of the new leaf
    /// propagates into the parent. Leaf latches are released before the
    /// ascent; the retained ancestor chain makes that safe.
    fn split_leaf(&self, ctx: &mut Context<'_>) -> Result<()> {
        let mut leaf_guard = ctx.write_set.pop().unwrap();
        let leaf_id = leaf_guard.page_id();

        let (new_leaf_id, mut new_guard) = match self.bpm.new_page() {
            Ok(pair) => pair,
            Err(SiltError::BufferPoolFull) => {
                // Soft failure: the overfull leaf is tolerated and the next
                // insert into it retries the split.
                debug!("leaf split of {} skipped: buffer pool exhausted", leaf_id);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let split_key = {
            let mut leaf = LeafPageMut::<K>::new(leaf_guard.data_mut());
            let mut new_leaf = LeafPageMut::<K>::new(new_guard.data_mut());
            new_leaf.init(new_leaf_id, leaf.parent_page_id(), self.leaf_max_size);
            leaf.move_half_to(&mut new_leaf);
            new_leaf.set_next_page_id(leaf.next_page_id());
            leaf.set_next_page_id(new_leaf_id);
            new_leaf.key_at(0)
        };
        drop(new_guard);
        drop(leaf_guard);

        self.insert_into_parent(ctx, leaf_id, split_key, new_leaf_id)
    }

    /// Inserts `(key, right_id)` after `left_id` in the parent on top of the
    /// page set, splitting overflowing internal pages on the way up. An empty
    /// set means `left_id` was the root and a fresh internal root is built.
    fn insert_into_parent(
        &self,
        ctx: &mut Context<'_>,
        mut left_id: PageId,
        mut key: K,
        mut right_id: PageId,
    ) -> Result<()> {
        loop {
            if ctx.write_set.is_empty() {
                let (new_root_id, mut guard) = self.bpm.new_page()?;
                {
                    let mut root = InternalPageMut::<K>::new(guard.data_mut());
                    root.init(new_root_id, INVALID_PAGE_ID, self.internal_max_size);
                    root.populate_new_root(left_id, &key, right_id);
                }
                drop(guard);
                for child_id in [left_id, right_id] {
                    let mut guard = self.bpm.fetch_page_write(child_id)?;
                    BTreePageMut::new(guard.data_mut()).set_parent_page_id(new_root_id);
                }
                **ctx
                    .root_guard
                    .as_mut()
                    .expect("root split requires the root lock") = new_root_id;
                self.update_root_page_id(new_root_id, false)?;
                debug!("root split: new root {}", new_root_id);
                return Ok(());
            }

            let (parent_id, overflow) = {
                let parent_guard = ctx.write_set.last_mut().unwrap();
                let parent_id = parent_guard.page_id();
                let mut parent = InternalPageMut::<K>::new(parent_guard.data_mut());
                parent.insert_node_after(left_id, &key, right_id);
                (parent_id, parent.size() > parent.max_size())
            };
            if !overflow {
                return Ok(());
            }

            let mut parent_guard = ctx.write_set.pop().unwrap();
            let (new_internal_id, mut new_guard) = match self.bpm.new_page() {
                Ok(pair) => pair,
                Err(SiltError::BufferPoolFull) => {
                    debug!(
                        "internal split of {} skipped: buffer pool exhausted",
                        parent_id
                    );
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let split_key = {
                let mut old = InternalPageMut::<K>::new(parent_guard.data_mut());
                let mut new_internal = InternalPageMut::<K>::new(new_guard.data_mut());
                new_internal.init(
                    new_internal_id,
                    old.parent_page_id(),
                    self.internal_max_size,
                );
                old.move_half_to(&mut new_internal, &self.bpm)?;
                new_internal.key_at(0)
            };
            drop(new_guard);
            drop(parent_guard);

            left_id = parent_id;
            key = split_key;
            right_id = new_internal_id;
        }
    }

    /// Rebalances the underflowing page on top of the page set against a
    /// sibling: merge when both runs fit in one page, otherwise move a single
    /// boundary entry and rewrite the parent separator. Merges recurse on a
    /// parent that underflows in turn.
    fn coalesce_or_redistribute(&self, ctx: &mut Context<'_>) -> Result<()> {
        let mut node_guard = ctx.write_set.pop().expect("underflow without page set");
        if ctx.write_set.is_empty() {
            return self.adjust_root(ctx, node_guard);
        }

        let node_id = node_guard.page_id();
        let node_is_leaf = BTreePageRef::new(node_guard.data()).is_leaf();

        // Prefer the left sibling; the leftmost child borrows from the right.
        let (node_index, sibling_index, sibling_id) = {
            let parent_guard = ctx.write_set.last().unwrap();
            let parent = InternalPageRef::<K>::new(parent_guard.data());
            let node_index = parent
                .value_index(node_id)
                .expect("node missing from its parent");
            let sibling_index = if node_index == 0 { 1 } else { node_index - 1 };
            (node_index, sibling_index, parent.value_at(sibling_index))
        };

        let mut sibling_guard = self.bpm.fetch_page_write(sibling_id)?;

        let (node_size, sibling_size, max_size) = {
            let node = BTreePageRef::new(node_guard.data());
            let sibling = BTreePageRef::new(sibling_guard.data());
            (node.size(), sibling.size(), node.max_size())
        };

        if node_size + sibling_size <= max_size {
            // Coalesce: the right page drains into the left and disappears.
            let (mut left_guard, mut right_guard, right_slot) = if sibling_index < node_index {
                (sibling_guard, node_guard, node_index)
            } else {
                (node_guard, sibling_guard, sibling_index)
            };
            let middle_key = {
                let parent_guard = ctx.write_set.last().unwrap();
                InternalPageRef::<K>::new(parent_guard.data()).key_at(right_slot)
            };

            if node_is_leaf {
                let mut left = LeafPageMut::<K>::new(left_guard.data_mut());
                let mut right = LeafPageMut::<K>::new(right_guard.data_mut());
                right.move_all_to(&mut left);
                left.set_next_page_id(right.next_page_id());
            } else {
                let mut left = InternalPageMut::<K>::new(left_guard.data_mut());
                let mut right = InternalPageMut::<K>::new(right_guard.data_mut());
                right.move_all_to(&mut left, &middle_key, &self.bpm)?;
            }

            let right_id = right_guard.page_id();
            drop(right_guard);
            drop(left_guard);
            self.delete_page_soft(right_id)?;

            let (parent_is_root, parent_size, parent_min) = {
                let parent_guard = ctx.write_set.last_mut().unwrap();
                let mut parent = InternalPageMut::<K>::new(parent_guard.data_mut());
                parent.remove(right_slot);
                (parent.is_root(), parent.size(), parent.min_size())
            };
            if parent_is_root {
                if parent_size == 1 {
                    let parent_guard = ctx.write_set.pop().unwrap();
                    return self.adjust_root(ctx, parent_guard);
                }
            } else if parent_size < parent_min {
                return self.coalesce_or_redistribute(ctx);
            }
            return Ok(());
        }

        // Redistribute one boundary entry through the parent separator.
        if node_is_leaf {
            let parent_guard = ctx.write_set.last_mut().unwrap();
            let mut parent = InternalPageMut::<K>::new(parent_guard.data_mut());
            let mut node = LeafPageMut::<K>::new(node_guard.data_mut());
            let mut sibling = LeafPageMut::<K>::new(sibling_guard.data_mut());
            if sibling_index < node_index {
                sibling.move_last_to_front_of(&mut node);
                parent.set_key_at(node_index, &node.key_at(0));
            } else {
                sibling.move_first_to_end_of(&mut node);
                parent.set_key_at(sibling_index, &sibling.key_at(0));
            }
        } else {
            let parent_guard = ctx.write_set.last_mut().unwrap();
            let mut parent = InternalPageMut::<K>::new(parent_guard.data_mut());
            let mut node = InternalPageMut::<K>::new(node_guard.data_mut());
            let mut sibling = InternalPageMut::<K>::new(sibling_guard.data_mut());
            if sibling_index < node_index {
                let middle_key = parent.key_at(node_index);
                let pushed_up = sibling.move_last_to_front_of(&mut node, &middle_key, &self.bpm)?;
                parent.set_key_at(node_index, &pushed_up);
            } else {
                let middle_key = parent.key_at(sibling_index);
                let pushed_up = sibling.move_first_to_end_of(&mut node, &middle_key, &self.bpm)?;
                parent.set_key_at(sibling_index, &pushed_up);
            }
        }
        Ok(())
    }

    /// Root rules: an empty root leaf empties the tree; a root internal page
    /// down to a single child hands the root to that child.
    fn adjust_root(&self, ctx: &mut Context<'_>, mut root_guard: WritePageGuard) -> Result<()> {
        let root_id = root_guard.page_id();
        let (is_leaf, size) = {
            let page = BTreePageRef::new(root_guard.data());
            (page.is_leaf(), page.size())
        };

        if is_leaf {
            if size == 0 {
                drop(root_guard);
                self.delete_page_soft(root_id)?;
                **ctx
                    .root_guard
                    .as_mut()
                    .expect("root change requires the root lock") = INVALID_PAGE_ID;
                self.update_root_page_id(INVALID_PAGE_ID, false)?;
                debug!("tree emptied, root {} freed", root_id);
            }
            return Ok(());
        }

        if size == 1 {
            let child_id = {
                let mut root = InternalPageMut::<K>::new(root_guard.data_mut());
                root.remove_and_return_only_child()
            };
            drop(root_guard);
            self.delete_page_soft(root_id)?;
            {
                let mut guard = self.bpm.fetch_page_write(child_id)?;
                BTreePageMut::new(guard.data_mut()).set_parent_page_id(INVALID_PAGE_ID);
            }
            **ctx
                .root_guard
                .as_mut()
                .expect("root change requires the root lock") = child_id;
            self.update_root_page_id(child_id, false)?;
            debug!("root collapsed: {} -> {}", root_id, child_id);
        }
        Ok(())
    }

    /// Persists the current root id in the header page under the index name.
    fn update_root_page_id(&self, root_id: PageId, insert_record: bool) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPageMut::new(guard.data_mut());
        if insert_record {
            // The record survives an emptied tree, so re-creation updates.
            if !header.insert_record(&self.index_name, root_id) {
                header.update_record(&self.index_name, root_id);
            }
        } else {
            let updated = header.update_record(&self.index_name, root_id);
            debug_assert!(updated, "root record missing from header page");
        }
        Ok(())
    }

    /// Page deletion that tolerates a concurrent scanner still pinning the
    /// page: the page stays unreferenced by the tree and simply is not
    /// reclaimed.
    fn delete_page_soft(&self, page_id: PageId) -> Result<()> {
        match self.bpm.delete_page(page_id) {
            Ok(_) => Ok(()),
            Err(SiltError::PagePinned(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
