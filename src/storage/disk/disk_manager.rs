use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, HEADER_PAGE_ID, PAGE_SIZE};

/// DiskManager reads and writes fixed-size pages of a single database file,
/// addressed by page id. Page 0 is reserved at creation for the index header
/// page; data page ids are handed out by a monotonic counter, and deleted ids
/// are never reused.
pub struct DiskManager {
    file: Mutex<File>,
    db_path: PathBuf,
    /// Next page id to hand out
    next_page_id: AtomicI32,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the database file. A fresh file gets a zeroed
    /// header page; an existing file resumes allocation past its last page.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let pages_on_disk = (file_size / PAGE_SIZE as u64) as i32;

        let dm = Self {
            file: Mutex::new(file),
            db_path,
            next_page_id: AtomicI32::new(pages_on_disk.max(1)),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        };

        if pages_on_disk == 0 {
            let zeros = [0u8; PAGE_SIZE];
            dm.write_page(HEADER_PAGE_ID, &zeros)?;
        }

        Ok(dm)
    }

    /// Reads a page into the provided buffer. Reading past the end of the
    /// file yields zeroed bytes, so freshly allocated pages come back empty.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");
        assert!(page_id.is_valid(), "cannot read {}", page_id);

        let byte_offset = page_id.as_i32() as u64 * PAGE_SIZE as u64;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;
        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page from the provided buffer and flushes it.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");
        assert!(page_id.is_valid(), "cannot write {}", page_id);

        let byte_offset = page_id.as_i32() as u64 * PAGE_SIZE as u64;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Hands out the next page id and zero-initializes the page on disk so a
    /// later read observes empty content even if nothing is ever flushed.
    pub fn allocate_page(&self) -> Result<PageId> {
        let page_id = PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst));
        let zeros = [0u8; PAGE_SIZE];
        self.write_page(page_id, &zeros)?;
        Ok(page_id)
    }

    /// Page ids are monotonic; reclaiming disk space would require a
    /// free-list allocator, so this is deliberately a no-op.
    pub fn deallocate_page(&self, _page_id: PageId) {}

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}
