//! Background flush worker for the hybrid log.
//!
//! Read-only shifts submit page-prefix writes here; begin shifts submit
//! device truncations. A single worker thread drives the async device from a
//! dedicated current-thread runtime, so submissions never block the epoch
//! machinery and completions advance `FlushedUntilAddress` in submission
//! order.

use std::io;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::address::{Address, Cursor};
use crate::allocator::page::PageSlot;
use crate::device::StorageDevice;

/// Condition signalled whenever a monotone shift makes progress
/// (safe-read-only, flushed-until or safe-head advanced).
pub(crate) struct ProgressSignal {
    lock: Mutex<()>,
    cond: Condvar,
}

impl ProgressSignal {
    pub(crate) fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn notify_all(&self) {
        let _guard = self.lock.lock();
        self.cond.notify_all();
    }

    /// Block until notified or the timeout elapses. Callers re-check their
    /// predicate (and drain pending epoch actions) after every wakeup.
    pub(crate) fn wait_timeout(&self, timeout: std::time::Duration) {
        let mut guard = self.lock.lock();
        self.cond.wait_for(&mut guard, timeout);
    }
}

/// State shared between the allocator and the flush worker.
pub(crate) struct FlushShared<D: StorageDevice> {
    device: Arc<D>,
    slots: Arc<[PageSlot]>,
    buffer_size: u32,
    page_size: usize,
    flushed_until_address: Arc<Cursor>,
    signal: Arc<ProgressSignal>,
}

impl<D: StorageDevice> FlushShared<D> {
    pub(crate) fn new(
        device: Arc<D>,
        slots: Arc<[PageSlot]>,
        buffer_size: u32,
        page_size: usize,
        flushed_until_address: Arc<Cursor>,
        signal: Arc<ProgressSignal>,
    ) -> Self {
        Self {
            device,
            slots,
            buffer_size,
            page_size,
            flushed_until_address,
            signal,
        }
    }

    fn slot(&self, page: u32) -> &PageSlot {
        &self.slots[(page % self.buffer_size) as usize]
    }

    /// Record a completed page-prefix flush and advance the global watermark.
    fn complete_page_flush(&self, page: u32, upto: Address) {
        let slot = self.slot(page);
        if slot.owner() == Some(page) {
            slot.advance_flushed_to(upto.control());
        }
        self.advance_flushed_until();
        self.signal.notify_all();
    }

    /// Advance `FlushedUntilAddress` through contiguously flushed pages.
    pub(crate) fn advance_flushed_until(&self) {
        loop {
            let fu = self.flushed_until_address.load();
            let page = fu.page();
            let slot = self.slot(page);

            if slot.owner() != Some(page) {
                // The slot moved on; the page was fully flushed before reuse.
                break;
            }

            let flushed_to = slot.flushed_to();
            if flushed_to <= fu.control() {
                break;
            }

            self.flushed_until_address.advance_to(Address::from_control(flushed_to));
            // A full page lets the loop proceed into the next one.
            if flushed_to < Address::new(page + 1, 0).control() {
                break;
            }
        }
    }
}

/// Work items handled by the flush worker.
pub(crate) enum FlushRequest {
    /// Write the prefix `[page start, upto)` of `page`; `data` is a stable
    /// copy of those bytes.
    Page {
        page: u32,
        upto: Address,
        data: Vec<u8>,
    },
    /// Destructively truncate the device below the byte offset.
    Truncate { below_offset: u64 },
    Shutdown,
}

/// Owns the worker thread and the submission channel.
pub(crate) struct FlushManager {
    tx: Sender<FlushRequest>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl FlushManager {
    pub(crate) fn new<D: StorageDevice>(shared: Arc<FlushShared<D>>) -> Self {
        let (tx, rx) = unbounded::<FlushRequest>();
        let worker = thread::spawn(move || worker_loop(shared, rx));

        Self {
            tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub(crate) fn submit(&self, request: FlushRequest) -> bool {
        self.tx.send(request).is_ok()
    }

    pub(crate) fn stop(&self) {
        if let Some(worker) = self.worker.lock().take() {
            let _ = self.tx.send(FlushRequest::Shutdown);
            let _ = worker.join();
        }
    }
}

impl Drop for FlushManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop<D: StorageDevice>(shared: Arc<FlushShared<D>>, rx: Receiver<FlushRequest>) {
    // A dedicated runtime: the flush path must not depend on whether the
    // caller runs inside a runtime of its own.
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            warn!("failed to start flush runtime: {e}");
            return;
        }
    };

    while let Ok(request) = rx.recv() {
        match request {
            FlushRequest::Page { page, upto, data } => {
                let offset = page as u64 * shared.page_size as u64;
                let result: io::Result<()> = rt.block_on(async {
                    let written = shared.device.write(offset, &data).await?;
                    if written != data.len() {
                        return Err(io::Error::new(
                            io::ErrorKind::WriteZero,
                            format!(
                                "partial write to page {page}: expected {} bytes, wrote {written}",
                                data.len()
                            ),
                        ));
                    }
                    Ok(())
                });

                match result {
                    Ok(()) => shared.complete_page_flush(page, upto),
                    Err(e) => warn!("hybrid log flush failed for page {page}: {e}"),
                }
            }
            FlushRequest::Truncate { below_offset } => {
                if let Err(e) = rt.block_on(shared.device.truncate_below(below_offset)) {
                    warn!("log truncation below offset {below_offset} failed: {e}");
                }
            }
            FlushRequest::Shutdown => break,
        }
    }
}
