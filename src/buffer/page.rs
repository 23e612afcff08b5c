use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// Owned latch guards handed to page guards. They keep the data lock alive
/// on their own, so a tree descent can hold a child's latch in its page set
/// while the parent's has already been dropped.
pub(crate) type FrameReadGuard = ArcRwLockReadGuard<RawRwLock, Box<[u8; PAGE_SIZE]>>;
pub(crate) type FrameWriteGuard = ArcRwLockWriteGuard<RawRwLock, Box<[u8; PAGE_SIZE]>>;

/// One buffer frame and the lifecycle of the page it holds.
///
/// A frame cycles through three states: empty (on the free list, page id
/// invalid), bound to a freshly allocated page (`allocate`), or bound to a
/// page read from disk (`load`). Both binding operations hand the caller the
/// first pin. The data lock doubles as the per-page read/write latch used by
/// latch crabbing; metadata stays in atomics so the pool can inspect a frame
/// without touching the latch.
pub struct Page {
    frame_id: FrameId,
    /// Id of the resident page, INVALID_PAGE_ID while empty
    page_id: AtomicI32,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    data: Arc<RwLock<Box<[u8; PAGE_SIZE]>>>,
}

impl Page {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicI32::new(INVALID_PAGE_ID.as_i32()),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: Arc::new(RwLock::new(Box::new([0u8; PAGE_SIZE]))),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id.load(Ordering::Acquire))
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Adds a pin and returns the new count. Used when the page is already
    /// resident; `allocate`/`load` hand out the first pin themselves.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drops one pin and returns the new count. Unpinning a frame nobody
    /// pinned is a bookkeeping bug and fails loudly.
    pub fn unpin(&self) -> u32 {
        let previous = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "unpin of unpinned frame {}", self.frame_id);
        previous - 1
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    /// The dirty flag is monotonic within a pin lifetime: releases may only
    /// set it, and nothing but `clear_dirty` (after a write-back) resets it.
    pub fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Release);
    }

    pub fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Release);
    }

    /// Binds this frame to a brand-new page: zeroed content, clean, and
    /// pinned once for the caller.
    pub fn allocate(&self, page_id: PageId) {
        self.page_id.store(page_id.as_i32(), Ordering::Release);
        self.pin_count.store(1, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }

    /// Binds this frame to a page fetched from disk: bytes copied in, clean,
    /// and pinned once for the caller.
    pub fn load(&self, page_id: PageId, bytes: &[u8]) {
        assert_eq!(bytes.len(), PAGE_SIZE);
        self.page_id.store(page_id.as_i32(), Ordering::Release);
        self.pin_count.store(1, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().copy_from_slice(bytes);
    }

    /// Copies the page image out for a write-back, under the shared latch.
    pub fn read_into(&self, buf: &mut [u8]) {
        assert_eq!(buf.len(), PAGE_SIZE);
        buf.copy_from_slice(&**self.data.read());
    }

    /// Returns the frame to the empty state: no page, unpinned, clean,
    /// zeroed.
    pub fn reset(&self) {
        self.page_id
            .store(INVALID_PAGE_ID.as_i32(), Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }

    /// Takes the page latch in shared mode (crabbing read descent).
    pub(crate) fn latch_shared(&self) -> FrameReadGuard {
        self.data.read_arc()
    }

    /// Takes the page latch in exclusive mode (crabbing write descent).
    pub(crate) fn latch_exclusive(&self) -> FrameWriteGuard {
        self.data.write_arc()
    }
}
