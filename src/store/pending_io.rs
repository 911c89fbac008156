//! Pending-I/O machinery for record reads below the head address.
//!
//! Sessions submit record reads to a background worker that drives the async
//! device; completions are routed into per-thread bins. A session blocks on
//! its own bin only, so concurrent sessions never steal each other's
//! completions.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::warn;

use crate::address::Address;
use crate::device::StorageDevice;

pub(crate) enum IoRequest {
    ReadRecord {
        thread_id: usize,
        address: Address,
        device_offset: u64,
        len: usize,
    },
    Shutdown,
}

pub(crate) struct IoCompletion {
    pub address: Address,
    pub result: io::Result<Vec<u8>>,
}

type CompletionBins = Arc<Mutex<HashMap<usize, VecDeque<IoCompletion>>>>;

/// Background reader shared by all sessions of a store.
pub(crate) struct PendingIoManager {
    tx: Sender<IoRequest>,
    bins: CompletionBins,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PendingIoManager {
    pub(crate) fn new<D: StorageDevice>(device: Arc<D>) -> Self {
        let (tx, rx) = unbounded::<IoRequest>();
        let bins: CompletionBins = Arc::new(Mutex::new(HashMap::new()));

        let worker_bins = Arc::clone(&bins);
        let worker = thread::spawn(move || worker_loop(device, rx, worker_bins));

        Self {
            tx,
            bins,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Submit a record read for `thread_id`. Returns `false` if the worker
    /// has shut down.
    pub(crate) fn submit_read(
        &self,
        thread_id: usize,
        address: Address,
        device_offset: u64,
        len: usize,
    ) -> bool {
        self.tx
            .send(IoRequest::ReadRecord {
                thread_id,
                address,
                device_offset,
                len,
            })
            .is_ok()
    }

    /// Pop the next completion for `thread_id`, if one has arrived.
    pub(crate) fn poll(&self, thread_id: usize) -> Option<IoCompletion> {
        self.bins.lock().get_mut(&thread_id)?.pop_front()
    }

    pub(crate) fn stop(&self) {
        if let Some(worker) = self.worker.lock().take() {
            let _ = self.tx.send(IoRequest::Shutdown);
            let _ = worker.join();
        }
    }
}

impl Drop for PendingIoManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop<D: StorageDevice>(
    device: Arc<D>,
    rx: Receiver<IoRequest>,
    bins: CompletionBins,
) {
    // Dedicated runtime: sessions must not depend on running inside one.
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            warn!("failed to start pending-io runtime: {e}");
            return;
        }
    };

    while let Ok(request) = rx.recv() {
        match request {
            IoRequest::ReadRecord {
                thread_id,
                address,
                device_offset,
                len,
            } => {
                let mut buf = vec![0u8; len];
                let result = rt
                    .block_on(device.read(device_offset, &mut buf))
                    .map(|read| {
                        if read < len {
                            buf[read..].fill(0);
                        }
                        buf
                    });

                bins.lock()
                    .entry(thread_id)
                    .or_default()
                    .push_back(IoCompletion { address, result });
            }
            IoRequest::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;
    use crate::device::SyncStorageDevice;

    #[test]
    fn completions_are_routed_per_thread() {
        let device = Arc::new(MemoryDevice::new());
        device.write_sync(0, &[7u8; 32]).unwrap();

        let manager = PendingIoManager::new(Arc::clone(&device));
        assert!(manager.submit_read(3, Address::new(0, 0), 0, 32));

        // Another thread's bin stays empty.
        let completion = loop {
            if let Some(c) = manager.poll(3) {
                break c;
            }
            assert!(manager.poll(4).is_none());
            std::thread::yield_now();
        };

        assert_eq!(completion.address, Address::new(0, 0));
        assert_eq!(completion.result.unwrap(), vec![7u8; 32]);
    }
}
