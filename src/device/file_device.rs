//! File-backed storage device.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::device::SyncStorageDevice;

/// Storage device backed by a single file, addressed positionally.
///
/// Prefix truncation keeps offsets stable: the truncation floor is tracked
/// and reads below it zero-fill. Implementations that need to reclaim the
/// space would segment the file; a single file keeps the device honest and
/// simple.
pub struct FileDevice {
    path: PathBuf,
    file: Mutex<File>,
    truncated_below: AtomicU64,
}

impl FileDevice {
    /// Open or create a device file at `path`
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            truncated_below: AtomicU64::new(0),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SyncStorageDevice for FileDevice {
    fn read_sync(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset < self.truncated_below.load(Ordering::Acquire) {
            buf.fill(0);
            return Ok(buf.len());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buf[total..].fill(0);
        Ok(buf.len())
    }

    fn write_sync(&self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush_sync(&self) -> io::Result<()> {
        self.file.lock().sync_all()
    }

    fn truncate_below_sync(&self, offset: u64) -> io::Result<()> {
        self.truncated_below.fetch_max(offset, Ordering::AcqRel);
        Ok(())
    }

    fn size_sync(&self) -> io::Result<u64> {
        self.file.lock().metadata().map(|m| m.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let device = FileDevice::open(dir.path().join("log.dat")).unwrap();

        device.write_sync(128, &[3u8; 32]).unwrap();

        let mut buf = [0u8; 32];
        device.read_sync(128, &mut buf).unwrap();
        assert_eq!(buf, [3u8; 32]);
    }

    #[test]
    fn reads_past_end_zero_fill() {
        let dir = tempfile::tempdir().unwrap();
        let device = FileDevice::open(dir.path().join("log.dat")).unwrap();

        device.write_sync(0, &[8u8; 16]).unwrap();

        let mut buf = [1u8; 32];
        device.read_sync(0, &mut buf).unwrap();
        assert_eq!(&buf[..16], &[8u8; 16]);
        assert_eq!(&buf[16..], &[0u8; 16]);
    }

    #[test]
    fn truncated_prefix_reads_zero() {
        let dir = tempfile::tempdir().unwrap();
        let device = FileDevice::open(dir.path().join("log.dat")).unwrap();

        device.write_sync(0, &[9u8; 64]).unwrap();
        device.truncate_below_sync(32).unwrap();

        let mut buf = [1u8; 16];
        device.read_sync(0, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 16]);
    }
}
