use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Access history for a single tracked frame.
#[derive(Debug)]
struct FrameAccessInfo {
    /// Last up to k access timestamps, most recent at the back.
    history: VecDeque<Timestamp>,
    is_evictable: bool,
}

impl FrameAccessInfo {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Backward k-distance at `current_timestamp`; None means +inf (fewer
    /// than k recorded accesses).
    fn k_distance(&self, current_timestamp: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(current_timestamp - self.history[self.history.len() - k])
        }
    }

    fn earliest_timestamp(&self) -> Timestamp {
        *self.history.front().expect("tracked frame has no accesses")
    }
}

/// LRU-K replacement policy.
///
/// The victim is the evictable frame with the largest backward k-distance,
/// i.e. the difference between the current timestamp and the timestamp of the
/// k-th most recent access. A frame with fewer than k recorded accesses has
/// +inf distance; ties (including among +inf frames) fall back to classical
/// LRU on the earliest recorded access.
pub struct LruKReplacer {
    k: usize,
    /// Maximum number of frames the replacer can track
    replacer_size: usize,
    /// Monotonic logical clock, bumped once per recorded access
    current_timestamp: AtomicU64,
    frame_info: Mutex<HashMap<FrameId, FrameAccessInfo>>,
    num_evictable: Mutex<usize>,
}

impl LruKReplacer {
    pub fn new(replacer_size: usize, k: usize) -> Self {
        assert!(replacer_size > 0, "replacer size must be positive");
        assert!(k >= 1, "k must be at least 1");
        Self {
            k,
            replacer_size,
            current_timestamp: AtomicU64::new(0),
            frame_info: Mutex::new(HashMap::new()),
            num_evictable: Mutex::new(0),
        }
    }

    /// Evicts the evictable frame with the largest backward k-distance,
    /// removing its history. Returns None if no frame is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut frame_info = self.frame_info.lock();
        let mut num_evictable = self.num_evictable.lock();

        if *num_evictable == 0 {
            return None;
        }

        let current_ts = self.current_timestamp.load(Ordering::Relaxed);

        let mut victim: Option<FrameId> = None;
        let mut victim_k_dist: Option<Timestamp> = None;
        let mut victim_earliest_ts: Timestamp = 0;

        for (frame_id, info) in frame_info.iter() {
            if !info.is_evictable {
                continue;
            }

            let k_dist = info.k_distance(current_ts, self.k);
            let earliest_ts = info.earliest_timestamp();

            let should_replace = match (victim_k_dist, k_dist) {
                // Candidate +inf beats a finite victim.
                (Some(_), None) => true,
                (None, Some(_)) => false,
                // Both +inf: earliest first access wins.
                (None, None) => earliest_ts < victim_earliest_ts,
                // Both finite: larger distance wins, earliest access breaks ties.
                (Some(v_dist), Some(c_dist)) => {
                    c_dist > v_dist || (c_dist == v_dist && earliest_ts < victim_earliest_ts)
                }
            };

            if victim.is_none() || should_replace {
                victim = Some(*frame_id);
                victim_k_dist = k_dist;
                victim_earliest_ts = earliest_ts;
            }
        }

        if let Some(frame_id) = victim {
            frame_info.remove(&frame_id);
            *num_evictable -= 1;
        }

        victim
    }

    /// Records an access to the given frame at the next logical timestamp.
    pub fn record_access(&self, frame_id: FrameId) {
        assert!(
            frame_id.as_usize() < self.replacer_size,
            "frame id {} out of range",
            frame_id
        );

        let timestamp = self.current_timestamp.fetch_add(1, Ordering::Relaxed);
        let mut frame_info = self.frame_info.lock();

        frame_info
            .entry(frame_id)
            .or_insert_with(FrameAccessInfo::new)
            .record_access(timestamp, self.k);
    }

    /// Toggles a frame's evictability, adjusting the evictable count only
    /// when the flag actually changes. Untracked frames are left untracked:
    /// creating an entry here would corrupt the size accounting.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        assert!(
            frame_id.as_usize() < self.replacer_size,
            "frame id {} out of range",
            frame_id
        );

        let mut frame_info = self.frame_info.lock();
        let mut num_evictable = self.num_evictable.lock();

        if let Some(info) = frame_info.get_mut(&frame_id) {
            if info.is_evictable != is_evictable {
                if is_evictable {
                    *num_evictable += 1;
                } else {
                    *num_evictable -= 1;
                }
                info.is_evictable = is_evictable;
            }
        }
    }

    /// Drops a frame's history entirely. The frame must be evictable; called
    /// when the buffer pool deletes or reassigns a frame.
    pub fn remove(&self, frame_id: FrameId) {
        assert!(
            frame_id.as_usize() < self.replacer_size,
            "frame id {} out of range",
            frame_id
        );

        let mut frame_info = self.frame_info.lock();
        let mut num_evictable = self.num_evictable.lock();

        if let Some(info) = frame_info.remove(&frame_id) {
            assert!(info.is_evictable, "cannot remove a non-evictable frame");
            *num_evictable -= 1;
        }
    }

    /// Number of evictable tracked frames.
    pub fn size(&self) -> usize {
        *self.num_evictable.lock()
    }

    pub fn k(&self) -> usize {
        self.k
    }
}
