//! Integration tests for the B+ tree index

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;

use silt::buffer::BufferPoolManager;
use silt::common::{PageId, Rid, INVALID_PAGE_ID};
use silt::index::{
    BPlusTree, BTreePageRef, GenericKey, IndexKey, IntegerComparator, InternalPageRef,
};
use silt::storage::disk::DiskManager;
use tempfile::NamedTempFile;

type Key = GenericKey<8>;
type Tree = BPlusTree<Key, IntegerComparator>;

fn create_tree(
    pool_size: usize,
    leaf_max: usize,
    internal_max: usize,
) -> (Arc<BufferPoolManager>, Tree, NamedTempFile) {
    let temp = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, 2, dm));
    let tree = Tree::new(
        "test_index",
        Arc::clone(&bpm),
        IntegerComparator,
        leaf_max,
        internal_max,
    )
    .unwrap();
    (bpm, tree, temp)
}

/// Walks the whole tree checking parent back-pointers and occupancy bounds.
fn check_invariants(bpm: &Arc<BufferPoolManager>, root: PageId) {
    if !root.is_valid() {
        return;
    }
    let mut queue = VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        let children = {
            let guard = bpm.fetch_page_read(pid).unwrap();
            let page = BTreePageRef::new(guard.data());
            assert!(page.size() <= page.max_size(), "page {} overfull", pid);
            if !page.is_root() {
                assert!(
                    page.size() >= page.min_size(),
                    "page {} below min occupancy",
                    pid
                );
            }
            if page.is_leaf() {
                Vec::new()
            } else {
                let internal = InternalPageRef::<Key>::new(guard.data());
                (0..internal.size()).map(|i| internal.value_at(i)).collect()
            }
        };
        for child in children {
            let guard = bpm.fetch_page_read(child).unwrap();
            assert_eq!(
                BTreePageRef::new(guard.data()).parent_page_id(),
                pid,
                "bad parent pointer on {}",
                child
            );
            queue.push_back(child);
        }
    }
}

/// Every frame's pin count must return to zero once operations finish.
fn check_pins_released(bpm: &Arc<BufferPoolManager>) {
    for raw in 0..512 {
        if let Some(pins) = bpm.pin_count(PageId::new(raw)) {
            assert_eq!(pins, 0, "page {} leaked pins", raw);
        }
    }
}

#[test]
fn test_small_tree_lifecycle() {
    // leaf_max_size = 3, internal_max_size = 3: inserting 1..=8 forces leaf
    // and internal splits; removing everything collapses back to empty.
    let (bpm, tree, _temp) = create_tree(20, 3, 3);
    assert!(tree.is_empty());

    for i in 1..=8i64 {
        assert!(tree.insert(&Key::from_integer(i), Rid::from_integer(i)).unwrap());
    }

    for i in 1..=8i64 {
        assert_eq!(
            tree.get_value(&Key::from_integer(i)).unwrap(),
            Some(Rid::from_integer(i)),
            "missing key {}",
            i
        );
    }
    assert_eq!(tree.get_value(&Key::from_integer(9)).unwrap(), None);

    let scanned: Vec<i64> = tree.iter().unwrap().map(|(k, _)| k.as_integer()).collect();
    assert_eq!(scanned, (1..=8).collect::<Vec<_>>());

    check_invariants(&bpm, tree.root_page_id());
    check_pins_released(&bpm);

    for i in 1..=8i64 {
        assert!(tree.remove(&Key::from_integer(i)).unwrap(), "remove {}", i);
        check_invariants(&bpm, tree.root_page_id());
    }

    assert!(tree.is_empty());
    assert_eq!(tree.root_page_id(), INVALID_PAGE_ID);
    assert_eq!(tree.iter().unwrap().count(), 0);
    check_pins_released(&bpm);
}

#[test]
fn test_duplicate_insert_rejected() {
    let (_bpm, tree, _temp) = create_tree(10, 3, 3);

    assert!(tree.insert(&Key::from_integer(7), Rid::new(1, 0)).unwrap());
    assert!(!tree.insert(&Key::from_integer(7), Rid::new(2, 0)).unwrap());
    // The original record is untouched.
    assert_eq!(
        tree.get_value(&Key::from_integer(7)).unwrap(),
        Some(Rid::new(1, 0))
    );
}

#[test]
fn test_remove_absent_key() {
    let (_bpm, tree, _temp) = create_tree(10, 3, 3);
    assert!(!tree.remove(&Key::from_integer(1)).unwrap());

    tree.insert(&Key::from_integer(1), Rid::from_integer(1)).unwrap();
    assert!(!tree.remove(&Key::from_integer(2)).unwrap());
    assert!(tree.remove(&Key::from_integer(1)).unwrap());
    assert!(!tree.remove(&Key::from_integer(1)).unwrap());
}

#[test]
fn test_sequential_inserts_scale() {
    let (bpm, tree, _temp) = create_tree(64, 4, 4);

    for i in 0..1000i64 {
        assert!(tree.insert(&Key::from_integer(i), Rid::from_integer(i)).unwrap());
    }
    for i in 0..1000i64 {
        assert_eq!(
            tree.get_value(&Key::from_integer(i)).unwrap(),
            Some(Rid::from_integer(i))
        );
    }
    let scanned: Vec<i64> = tree.iter().unwrap().map(|(k, _)| k.as_integer()).collect();
    assert_eq!(scanned, (0..1000).collect::<Vec<_>>());

    check_invariants(&bpm, tree.root_page_id());
    check_pins_released(&bpm);
}

#[test]
fn test_reverse_order_inserts() {
    let (bpm, tree, _temp) = create_tree(64, 3, 3);

    for i in (0..300i64).rev() {
        tree.insert(&Key::from_integer(i), Rid::from_integer(i)).unwrap();
    }
    let scanned: Vec<i64> = tree.iter().unwrap().map(|(k, _)| k.as_integer()).collect();
    assert_eq!(scanned, (0..300).collect::<Vec<_>>());
    check_invariants(&bpm, tree.root_page_id());
}

#[test]
fn test_shuffled_insert_and_partial_delete() {
    let (bpm, tree, _temp) = create_tree(64, 4, 4);
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5117);

    let mut keys: Vec<i64> = (0..500).collect();
    keys.shuffle(&mut rng);
    for &k in &keys {
        tree.insert(&Key::from_integer(k), Rid::from_integer(k)).unwrap();
    }

    // Delete a shuffled half, keep the rest.
    keys.shuffle(&mut rng);
    let (gone, kept) = keys.split_at(250);
    for &k in gone {
        assert!(tree.remove(&Key::from_integer(k)).unwrap(), "remove {}", k);
        check_invariants(&bpm, tree.root_page_id());
    }

    for &k in gone {
        assert_eq!(tree.get_value(&Key::from_integer(k)).unwrap(), None);
    }
    for &k in kept {
        assert_eq!(
            tree.get_value(&Key::from_integer(k)).unwrap(),
            Some(Rid::from_integer(k)),
            "lost key {}",
            k
        );
    }

    let mut expected: Vec<i64> = kept.to_vec();
    expected.sort_unstable();
    let scanned: Vec<i64> = tree.iter().unwrap().map(|(k, _)| k.as_integer()).collect();
    assert_eq!(scanned, expected);
    check_pins_released(&bpm);
}

#[test]
fn test_iter_from_matches_full_scan() {
    let (_bpm, tree, _temp) = create_tree(32, 3, 3);
    for i in 0..50i64 {
        tree.insert(&Key::from_integer(i), Rid::from_integer(i)).unwrap();
    }

    // iter_from deliberately keeps full-scan semantics.
    let full: Vec<i64> = tree.iter().unwrap().map(|(k, _)| k.as_integer()).collect();
    let from: Vec<i64> = tree
        .iter_from(&Key::from_integer(25))
        .unwrap()
        .map(|(k, _)| k.as_integer())
        .collect();
    assert_eq!(full, from);
}

#[test]
fn test_root_persisted_across_reopen() {
    let temp = NamedTempFile::new().unwrap();
    let path = temp.path().to_path_buf();

    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(32, 2, dm));
        let tree = Tree::new("orders_pk", Arc::clone(&bpm), IntegerComparator, 4, 4).unwrap();
        for i in 0..100i64 {
            tree.insert(&Key::from_integer(i), Rid::from_integer(i)).unwrap();
        }
        bpm.flush_all_pages().unwrap();
    }

    let dm = Arc::new(DiskManager::new(&path).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(32, 2, dm));
    let tree = Tree::new("orders_pk", Arc::clone(&bpm), IntegerComparator, 4, 4).unwrap();

    assert!(!tree.is_empty());
    for i in 0..100i64 {
        assert_eq!(
            tree.get_value(&Key::from_integer(i)).unwrap(),
            Some(Rid::from_integer(i))
        );
    }
}

#[test]
fn test_two_indexes_share_header_page() {
    let temp = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(32, 2, dm));

    let a = Tree::new("index_a", Arc::clone(&bpm), IntegerComparator, 3, 3).unwrap();
    let b = Tree::new("index_b", Arc::clone(&bpm), IntegerComparator, 3, 3).unwrap();

    for i in 0..20i64 {
        a.insert(&Key::from_integer(i), Rid::from_integer(i)).unwrap();
        b.insert(&Key::from_integer(-i - 1), Rid::from_integer(i)).unwrap();
    }

    assert_ne!(a.root_page_id(), b.root_page_id());
    assert_eq!(a.iter().unwrap().count(), 20);
    assert_eq!(b.iter().unwrap().count(), 20);
    assert_eq!(a.get_value(&Key::from_integer(-1)).unwrap(), None);
}

#[test]
fn test_bulk_load_from_file() {
    let (_bpm, tree, _temp) = create_tree(32, 4, 4);

    let mut input = NamedTempFile::new().unwrap();
    writeln!(input, "5 3 8\n1 9 2").unwrap();
    input.flush().unwrap();

    tree.insert_from_file(input.path()).unwrap();
    let scanned: Vec<i64> = tree.iter().unwrap().map(|(k, _)| k.as_integer()).collect();
    assert_eq!(scanned, vec![1, 2, 3, 5, 8, 9]);

    // Record ids are derived from the packed integer.
    assert_eq!(
        tree.get_value(&Key::from_integer(5)).unwrap(),
        Some(Rid::from_integer(5))
    );

    let mut removals = NamedTempFile::new().unwrap();
    writeln!(removals, "3 9").unwrap();
    removals.flush().unwrap();
    tree.remove_from_file(removals.path()).unwrap();

    let scanned: Vec<i64> = tree.iter().unwrap().map(|(k, _)| k.as_integer()).collect();
    assert_eq!(scanned, vec![1, 2, 5, 8]);
}

#[test]
fn test_draw_writes_dot_file() {
    let (_bpm, tree, _temp) = create_tree(16, 3, 3);
    for i in 0..10i64 {
        tree.insert(&Key::from_integer(i), Rid::from_integer(i)).unwrap();
    }

    let out = NamedTempFile::new().unwrap();
    tree.draw(out.path()).unwrap();
    let contents = std::fs::read_to_string(out.path()).unwrap();
    assert!(contents.starts_with("digraph"));

    tree.print().unwrap();
}

#[test]
fn test_empty_tree_operations() {
    let (_bpm, tree, _temp) = create_tree(10, 3, 3);

    assert!(tree.is_empty());
    assert_eq!(tree.root_page_id(), INVALID_PAGE_ID);
    assert_eq!(tree.get_value(&Key::from_integer(1)).unwrap(), None);
    assert!(!tree.remove(&Key::from_integer(1)).unwrap());
    assert!(tree.iter().unwrap().is_end());
    assert_eq!(tree.iter().unwrap().count(), 0);
    tree.print().unwrap();
}

#[test]
fn test_refill_after_emptying() {
    let (bpm, tree, _temp) = create_tree(32, 3, 3);

    for round in 0..3 {
        for i in 0..50i64 {
            assert!(
                tree.insert(&Key::from_integer(i), Rid::from_integer(i)).unwrap(),
                "round {} insert {}",
                round,
                i
            );
        }
        for i in 0..50i64 {
            assert!(tree.remove(&Key::from_integer(i)).unwrap());
        }
        assert!(tree.is_empty());
    }
    check_pins_released(&bpm);
}
