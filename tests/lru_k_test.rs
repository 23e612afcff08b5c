//! Integration tests for the LRU-K replacer

use silt::buffer::LruKReplacer;
use silt::common::FrameId;

#[test]
fn test_eviction_trace() {
    let replacer = LruKReplacer::new(7, 2);

    // Access frames 1..=6 once each, make everything evictable, then touch
    // frame 1 a second time. Frames 2..=6 keep infinite backward distance,
    // frame 1 becomes finite, so the eviction order is 2,3,4,5,6 then 1.
    for i in 1..=6 {
        replacer.record_access(FrameId::new(i));
    }
    for i in 1..=6 {
        replacer.set_evictable(FrameId::new(i), true);
    }
    assert_eq!(replacer.size(), 6);

    replacer.record_access(FrameId::new(1));

    for expected in [2, 3, 4, 5, 6, 1] {
        assert_eq!(replacer.evict(), Some(FrameId::new(expected)));
    }
    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_infinite_distance_beats_finite() {
    let replacer = LruKReplacer::new(10, 2);

    // Frames 1, 2, 3 accessed in order, then frame 1 again: frame 2 has
    // infinite distance and the earliest first access, so it goes first.
    for i in 1..=3 {
        replacer.record_access(FrameId::new(i));
        replacer.set_evictable(FrameId::new(i), true);
    }
    replacer.record_access(FrameId::new(1));

    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
}

#[test]
fn test_non_evictable_frames_are_skipped() {
    let replacer = LruKReplacer::new(10, 2);

    for i in 0..3 {
        replacer.record_access(FrameId::new(i));
    }
    replacer.set_evictable(FrameId::new(1), true);
    replacer.set_evictable(FrameId::new(2), true);

    assert_eq!(replacer.size(), 2);
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    // Frame 0 was never made evictable.
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_toggling_evictable_adjusts_size_once() {
    let replacer = LruKReplacer::new(10, 2);

    replacer.record_access(FrameId::new(0));
    replacer.set_evictable(FrameId::new(0), true);
    replacer.set_evictable(FrameId::new(0), true);
    assert_eq!(replacer.size(), 1);

    replacer.set_evictable(FrameId::new(0), false);
    replacer.set_evictable(FrameId::new(0), false);
    assert_eq!(replacer.size(), 0);

    replacer.set_evictable(FrameId::new(0), true);
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
}

#[test]
fn test_history_truncated_to_k() {
    let replacer = LruKReplacer::new(10, 2);

    // Frame 0 accessed many times early, frame 1 twice late. With only the
    // last k=2 accesses retained, frame 0's distance is computed from its
    // recent accesses, so frame 0 (older pair) still evicts first.
    for _ in 0..5 {
        replacer.record_access(FrameId::new(0));
    }
    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(1));

    replacer.set_evictable(FrameId::new(0), true);
    replacer.set_evictable(FrameId::new(1), true);

    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
}

#[test]
fn test_evicted_frame_forgets_history() {
    let replacer = LruKReplacer::new(10, 2);

    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(0));
    replacer.set_evictable(FrameId::new(0), true);
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));

    // The frame is untracked again: marking it evictable is a no-op.
    replacer.set_evictable(FrameId::new(0), true);
    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_remove_untracked_is_noop() {
    let replacer = LruKReplacer::new(10, 2);
    replacer.remove(FrameId::new(5));
    assert_eq!(replacer.size(), 0);
}
