use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{PageId, Result, SiltError, PAGE_SIZE};

use super::DiskManager;

/// A single disk I/O request handed to the worker thread.
pub struct DiskRequest {
    /// Whether this is a write (true) or read (false) request
    pub is_write: bool,
    pub page_id: PageId,
    /// Pointer to the data buffer (must be PAGE_SIZE bytes).
    /// For reads the worker fills it, for writes the worker reads from it.
    pub data: *mut u8,
    /// Completion signal
    pub callback: Option<std::sync::mpsc::Sender<bool>>,
}

// Safety: the request is consumed by the single scheduler worker and the
// issuing thread keeps the buffer alive until the completion signal arrives.
unsafe impl Send for DiskRequest {}

impl DiskRequest {
    pub fn read(page_id: PageId, data: *mut u8) -> Self {
        Self {
            is_write: false,
            page_id,
            data,
            callback: None,
        }
    }

    pub fn write(page_id: PageId, data: *mut u8) -> Self {
        Self {
            is_write: true,
            page_id,
            data,
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: std::sync::mpsc::Sender<bool>) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// DiskScheduler funnels page I/O through a background worker thread fed by
/// a bounded channel. The buffer pool uses the synchronous wrappers, which
/// block until the worker signals completion.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_sender: Sender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm_clone = Arc::clone(&disk_manager);
        let shutdown_clone = Arc::clone(&shutdown);

        let worker_handle = thread::spawn(move || {
            Self::worker_loop(dm_clone, receiver, shutdown_clone);
        });

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| SiltError::DiskScheduler(format!("failed to schedule request: {}", e)))
    }

    /// Schedules a read and blocks until it completes.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = std::sync::mpsc::channel();
        let request = DiskRequest::read(page_id, data.as_mut_ptr()).with_callback(tx);
        self.schedule(request)?;

        let ok = rx
            .recv()
            .map_err(|e| SiltError::DiskScheduler(format!("completion lost: {}", e)))?;
        if !ok {
            return Err(SiltError::DiskScheduler(format!(
                "read of {} failed",
                page_id
            )));
        }
        Ok(())
    }

    /// Schedules a write and blocks until it completes.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = std::sync::mpsc::channel();
        // The worker only reads through this pointer for write requests.
        let request = DiskRequest::write(page_id, data.as_ptr() as *mut u8).with_callback(tx);
        self.schedule(request)?;

        let ok = rx
            .recv()
            .map_err(|e| SiltError::DiskScheduler(format!("completion lost: {}", e)))?;
        if !ok {
            return Err(SiltError::DiskScheduler(format!(
                "write of {} failed",
                page_id
            )));
        }
        Ok(())
    }

    fn worker_loop(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain remaining requests before exiting
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(request) => {
                    Self::process_request(&disk_manager, request);
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    break;
                }
            }
        }
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        let success = if request.is_write {
            // Safety: issuer keeps the buffer alive until the callback fires
            let data = unsafe { std::slice::from_raw_parts(request.data, PAGE_SIZE) };
            disk_manager.write_page(request.page_id, data).is_ok()
        } else {
            // Safety: as above, and reads have exclusive access to the buffer
            let data = unsafe { std::slice::from_raw_parts_mut(request.data, PAGE_SIZE) };
            disk_manager.read_page(request.page_id, data).is_ok()
        };

        if let Some(callback) = request.callback {
            let _ = callback.send(success);
        }
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
