use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, MutexGuard};

use crate::common::{FrameId, PageId, Result, SiltError, DEFAULT_BUCKET_SIZE, PAGE_SIZE};
use crate::container::ExtendibleHashTable;
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{LruKReplacer, Page, ReadPageGuard, WritePageGuard};

/// Shared pool state: the frame arena plus the structures every public pool
/// operation serializes over. Page guards hold an `Arc` of this so that
/// dropping a guard can unpin its page without going through the manager.
pub(crate) struct PoolCore {
    frames: Vec<Page>,
    /// The pool latch. Every public operation serializes on it end to end,
    /// disk I/O included; the free list rides inside because it has no lock
    /// of its own.
    latch: Mutex<VecDeque<FrameId>>,
    /// Page table: maps page ids to the frame currently holding them.
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: LruKReplacer,
}

impl PoolCore {
    fn new(pool_size: usize, replacer_k: usize) -> Self {
        let frames = (0..pool_size)
            .map(|i| Page::new(FrameId::new(i as u32)))
            .collect();
        let free_list = (0..pool_size).map(|i| FrameId::new(i as u32)).collect();
        Self {
            frames,
            latch: Mutex::new(free_list),
            page_table: ExtendibleHashTable::new(DEFAULT_BUCKET_SIZE),
            replacer: LruKReplacer::new(pool_size, replacer_k),
        }
    }

    fn frame(&self, frame_id: FrameId) -> &Page {
        &self.frames[frame_id.as_usize()]
    }

    /// Unpin path shared by both guard kinds. The dirty flag is ORed in,
    /// never cleared; the frame becomes evictable when its last pin drops.
    pub(crate) fn release(&self, page_id: PageId, is_dirty: bool) {
        let _latch = self.latch.lock();
        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = self.frame(frame_id);
            if is_dirty {
                frame.mark_dirty();
            }
            if frame.unpin() == 0 {
                self.replacer.set_evictable(frame_id, true);
            }
        }
    }
}

/// BufferPoolManager mediates all access to disk pages. It owns a fixed
/// array of frames and decides which pages stay resident using the LRU-K
/// policy; callers hold pages through RAII read/write guards that pin the
/// frame and take its latch for their lifetime.
pub struct BufferPoolManager {
    pool_size: usize,
    core: Arc<PoolCore>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames backed by `disk_manager`, with
    /// LRU-K history depth `replacer_k`.
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self {
            pool_size,
            core: Arc::new(PoolCore::new(pool_size, replacer_k)),
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a fresh page id and binds it to a zeroed frame, returning
    /// the id and the frame pinned (pin count 1, non-evictable) behind its
    /// write latch. Fails with `BufferPoolFull` when no frame is free and
    /// nothing can be evicted.
    pub fn new_page(&self) -> Result<(PageId, WritePageGuard)> {
        let mut free_list = self.core.latch.lock();
        let frame_id = self.acquire_frame(&mut free_list)?;

        let page_id = match self.disk_scheduler.disk_manager().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                free_list.push_back(frame_id);
                return Err(e);
            }
        };

        let frame = self.core.frame(frame_id);
        frame.allocate(page_id);

        self.core.page_table.insert(page_id, frame_id);
        self.core.replacer.record_access(frame_id);
        self.core.replacer.set_evictable(frame_id, false);

        // The frame is fresh, so taking its latch here cannot block.
        let guard = WritePageGuard::latch(page_id, frame, Arc::clone(&self.core));
        Ok((page_id, guard))
    }

    /// Pins the page for shared access and takes its read latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        if !page_id.is_valid() {
            return Err(SiltError::InvalidPageId(page_id));
        }
        let frame_id = self.pin_page(page_id)?;
        let frame = self.core.frame(frame_id);
        Ok(ReadPageGuard::latch(page_id, frame, Arc::clone(&self.core)))
    }

    /// Pins the page for exclusive access and takes its write latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        if !page_id.is_valid() {
            return Err(SiltError::InvalidPageId(page_id));
        }
        let frame_id = self.pin_page(page_id)?;
        let frame = self.core.frame(frame_id);
        Ok(WritePageGuard::latch(page_id, frame, Arc::clone(&self.core)))
    }

    /// Writes the page out regardless of its dirty state and clears the
    /// dirty flag. Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(SiltError::InvalidPageId(page_id));
        }

        let _free_list = self.core.latch.lock();

        if let Some(frame_id) = self.core.page_table.find(&page_id) {
            let frame = self.core.frame(frame_id);

            let mut data = [0u8; PAGE_SIZE];
            frame.read_into(&mut data);
            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.clear_dirty();

            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Flushes every frame holding a valid page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let _free_list = self.core.latch.lock();

        for frame in &self.core.frames {
            let page_id = frame.page_id();
            if page_id.is_valid() {
                let mut data = [0u8; PAGE_SIZE];
                frame.read_into(&mut data);
                self.disk_scheduler.schedule_write_sync(page_id, &data)?;
                frame.clear_dirty();
            }
        }

        Ok(())
    }

    /// Drops the page from the pool, returning its frame to the free list.
    /// Returns Ok(true) when the page is not resident (nothing to do) and
    /// `PagePinned` when someone still holds it. The page id itself is not
    /// reused; deallocation is a no-op in the monotonic allocator.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut free_list = self.core.latch.lock();

        let frame_id = match self.core.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            None => return Ok(true),
        };

        let frame = self.core.frame(frame_id);
        if frame.pin_count() > 0 {
            return Err(SiltError::PagePinned(page_id));
        }

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.read_into(&mut data);
            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
        }

        self.core.page_table.remove(&page_id);
        self.core.replacer.remove(frame_id);
        frame.reset();
        free_list.push_back(frame_id);

        self.disk_scheduler.disk_manager().deallocate_page(page_id);

        Ok(true)
    }

    /// Current pin count of a resident page, None if not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let _free_list = self.core.latch.lock();
        self.core
            .page_table
            .find(&page_id)
            .map(|frame_id| self.core.frame(frame_id).pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.core.latch.lock().len()
    }

    /// Resolves a page to a pinned frame, loading it from disk on a miss.
    /// The pool latch covers the whole lookup-or-load so two concurrent
    /// misses cannot both load the same page.
    fn pin_page(&self, page_id: PageId) -> Result<FrameId> {
        let mut free_list = self.core.latch.lock();

        if let Some(frame_id) = self.core.page_table.find(&page_id) {
            self.core.frame(frame_id).pin();
            self.core.replacer.record_access(frame_id);
            self.core.replacer.set_evictable(frame_id, false);
            return Ok(frame_id);
        }

        let frame_id = self.acquire_frame(&mut free_list)?;

        let mut data = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_scheduler.schedule_read_sync(page_id, &mut data) {
            free_list.push_back(frame_id);
            return Err(e);
        }
        self.core.frame(frame_id).load(page_id, &data);

        self.core.page_table.insert(page_id, frame_id);
        self.core.replacer.record_access(frame_id);
        self.core.replacer.set_evictable(frame_id, false);

        Ok(frame_id)
    }

    /// Frame acquisition policy: free list first, then a replacer victim.
    /// A dirty victim is written back before its frame is reused, and the
    /// old mapping is dropped.
    fn acquire_frame(&self, free_list: &mut MutexGuard<'_, VecDeque<FrameId>>) -> Result<FrameId> {
        if let Some(frame_id) = free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.core.replacer.evict().ok_or(SiltError::BufferPoolFull)?;
        let frame = self.core.frame(frame_id);
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            debug!("evicting dirty page {}, writing back", old_page_id);
            let mut data = [0u8; PAGE_SIZE];
            frame.read_into(&mut data);
            self.disk_scheduler.schedule_write_sync(old_page_id, &data)?;
        }

        self.core.page_table.remove(&old_page_id);
        frame.reset();

        Ok(frame_id)
    }
}
