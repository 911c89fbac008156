//! In-memory storage device.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::device::SyncStorageDevice;

/// A byte-addressable device that retains written data in memory.
///
/// The deterministic sink for tests that flush, evict and then read records
/// back through the device path.
pub struct MemoryDevice {
    data: RwLock<Vec<u8>>,
    /// Everything below this offset has been destructively truncated
    truncated_below: AtomicU64,
}

impl MemoryDevice {
    /// Create a new, empty in-memory device
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Vec::new()),
            truncated_below: AtomicU64::new(0),
        }
    }

    /// Offset below which data has been discarded
    pub fn truncated_below(&self) -> u64 {
        self.truncated_below.load(Ordering::Acquire)
    }
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStorageDevice for MemoryDevice {
    fn read_sync(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.read();
        let start = offset as usize;
        let end = start + buf.len();

        if end <= data.len() {
            buf.copy_from_slice(&data[start..end]);
        } else if start < data.len() {
            let available = data.len() - start;
            buf[..available].copy_from_slice(&data[start..]);
            buf[available..].fill(0);
        } else {
            buf.fill(0);
        }
        Ok(buf.len())
    }

    fn write_sync(&self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        let mut data = self.data.write();
        let start = offset as usize;
        let end = start + buf.len();

        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn flush_sync(&self) -> io::Result<()> {
        Ok(())
    }

    fn truncate_below_sync(&self, offset: u64) -> io::Result<()> {
        let prev = self.truncated_below.fetch_max(offset, Ordering::AcqRel);
        if offset > prev {
            let mut data = self.data.write();
            let end = (offset as usize).min(data.len());
            // Zero rather than shrink so offsets stay stable.
            data[..end].fill(0);
        }
        Ok(())
    }

    fn size_sync(&self) -> io::Result<u64> {
        Ok(self.data.read().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let device = MemoryDevice::new();
        device.write_sync(64, &[7u8; 16]).unwrap();

        let mut buf = [0u8; 16];
        device.read_sync(64, &mut buf).unwrap();
        assert_eq!(buf, [7u8; 16]);
    }

    #[test]
    fn short_reads_zero_fill() {
        let device = MemoryDevice::new();
        device.write_sync(0, &[9u8; 8]).unwrap();

        let mut buf = [1u8; 16];
        device.read_sync(0, &mut buf).unwrap();
        assert_eq!(&buf[..8], &[9u8; 8]);
        assert_eq!(&buf[8..], &[0u8; 8]);
    }

    #[test]
    fn truncate_below_discards_prefix() {
        let device = MemoryDevice::new();
        device.write_sync(0, &[5u8; 128]).unwrap();
        device.truncate_below_sync(64).unwrap();

        assert_eq!(device.truncated_below(), 64);

        let mut buf = [1u8; 128];
        device.read_sync(0, &mut buf).unwrap();
        assert_eq!(&buf[..64], &[0u8; 64]);
        assert_eq!(&buf[64..], &[5u8; 64]);
    }
}
