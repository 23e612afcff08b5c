use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::common::PageId;

use super::buffer_pool_manager::PoolCore;
use super::page::{FrameReadGuard, FrameWriteGuard, Page};

/// RAII handle for shared access to a page: one pin plus the page's read
/// latch. Dropping it returns both to the pool, which makes the frame
/// evictable again once the last pin is gone.
pub struct ReadPageGuard {
    page_id: PageId,
    pool: Arc<PoolCore>,
    data: FrameReadGuard,
}

impl ReadPageGuard {
    /// Takes the read latch on an already-pinned frame. The pool calls this
    /// after the pool latch is released, so blocking here never stalls other
    /// pool operations.
    pub(crate) fn latch(page_id: PageId, frame: &Page, pool: Arc<PoolCore>) -> Self {
        Self {
            page_id,
            pool,
            data: frame.latch_shared(),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // A reader's latch may still be held while the pool bookkeeping runs;
        // nothing the pool does under its own latch needs this page
        // exclusively.
        self.pool.release(self.page_id, false);
    }
}

/// RAII handle for exclusive access to a page: one pin plus the write latch.
/// The page is reported dirty on release iff `data_mut` was used.
pub struct WritePageGuard {
    page_id: PageId,
    pool: Arc<PoolCore>,
    dirty: bool,
    data: Option<FrameWriteGuard>,
}

impl WritePageGuard {
    /// Takes the write latch on an already-pinned frame; see
    /// [`ReadPageGuard::latch`] for the locking contract.
    pub(crate) fn latch(page_id: PageId, frame: &Page, pool: Arc<PoolCore>) -> Self {
        Self {
            page_id,
            pool,
            dirty: false,
            data: Some(frame.latch_exclusive()),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().unwrap()[..]
    }

    /// Mutable access to the page bytes; the release will mark the page
    /// dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.data.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // The write latch must be gone before the pool can flush this page.
        self.data = None;
        self.pool.release(self.page_id, self.dirty);
    }
}
