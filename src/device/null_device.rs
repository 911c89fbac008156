//! Null storage device.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::device::SyncStorageDevice;

/// A device that discards all writes and zero-fills all reads.
///
/// Useful for benchmarking in-memory operation and for logs whose on-disk
/// prefix is never read back.
pub struct NullDevice {
    /// Logical size of the device
    size: AtomicU64,
}

impl NullDevice {
    /// Create a new null device
    pub fn new() -> Self {
        Self {
            size: AtomicU64::new(0),
        }
    }
}

impl Default for NullDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStorageDevice for NullDevice {
    fn read_sync(&self, _offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        buf.fill(0);
        Ok(buf.len())
    }

    fn write_sync(&self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        let new_end = offset + buf.len() as u64;
        self.size.fetch_max(new_end, Ordering::AcqRel);
        Ok(buf.len())
    }

    fn flush_sync(&self) -> io::Result<()> {
        Ok(())
    }

    fn truncate_below_sync(&self, _offset: u64) -> io::Result<()> {
        Ok(())
    }

    fn size_sync(&self) -> io::Result<u64> {
        Ok(self.size.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_zero_fill() {
        let device = NullDevice::new();
        let mut buf = [1u8; 100];

        assert_eq!(device.read_sync(0, &mut buf).unwrap(), 100);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn writes_grow_logical_size() {
        let device = NullDevice::new();
        assert_eq!(device.write_sync(100, &[42u8; 50]).unwrap(), 50);
        assert_eq!(device.size_sync().unwrap(), 150);
    }
}
