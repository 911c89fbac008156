//! Storage device traits.

use std::future::Future;
use std::io;
use std::pin::Pin;

/// Asynchronous storage device.
///
/// The allocator's flush worker and the store's pending-I/O reader drive this
/// trait from dedicated runtimes, so implementations are free to be truly
/// asynchronous or to resolve immediately.
pub trait StorageDevice: Send + Sync + 'static {
    /// Read `buf.len()` bytes at `offset` into `buf`
    fn read(
        &self,
        offset: u64,
        buf: &mut [u8],
    ) -> Pin<Box<dyn Future<Output = io::Result<usize>> + Send + '_>>;

    /// Write `buf` at `offset`
    fn write(
        &self,
        offset: u64,
        buf: &[u8],
    ) -> Pin<Box<dyn Future<Output = io::Result<usize>> + Send + '_>>;

    /// Flush any buffered writes to stable storage
    fn flush(&self) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + '_>>;

    /// Destructively discard everything below `offset`.
    ///
    /// Reads below the truncation point afterwards are undefined; the log
    /// never issues them because the begin address has already moved past.
    fn truncate_below(&self, offset: u64) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + '_>>;

    /// Get the current size of the device
    fn size(&self) -> io::Result<u64>;

    /// Alignment requirement for I/O buffers
    fn alignment(&self) -> usize {
        512
    }
}

/// Synchronous storage device, for simpler implementations.
///
/// Every `SyncStorageDevice` is a `StorageDevice` via the blanket impl below.
pub trait SyncStorageDevice: Send + Sync + 'static {
    /// Read data synchronously
    fn read_sync(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Write data synchronously
    fn write_sync(&self, offset: u64, buf: &[u8]) -> io::Result<usize>;

    /// Flush synchronously
    fn flush_sync(&self) -> io::Result<()>;

    /// Discard everything below `offset`
    fn truncate_below_sync(&self, offset: u64) -> io::Result<()>;

    /// Get the current size
    fn size_sync(&self) -> io::Result<u64>;

    /// Alignment requirement
    fn alignment(&self) -> usize {
        512
    }
}

impl<T: SyncStorageDevice> SyncStorageDevice for std::sync::Arc<T> {
    fn read_sync(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_sync(offset, buf)
    }

    fn write_sync(&self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        (**self).write_sync(offset, buf)
    }

    fn flush_sync(&self) -> io::Result<()> {
        (**self).flush_sync()
    }

    fn truncate_below_sync(&self, offset: u64) -> io::Result<()> {
        (**self).truncate_below_sync(offset)
    }

    fn size_sync(&self) -> io::Result<u64> {
        (**self).size_sync()
    }

    fn alignment(&self) -> usize {
        (**self).alignment()
    }
}

impl<T: SyncStorageDevice> StorageDevice for T {
    fn read(
        &self,
        offset: u64,
        buf: &mut [u8],
    ) -> Pin<Box<dyn Future<Output = io::Result<usize>> + Send + '_>> {
        let result = self.read_sync(offset, buf);
        Box::pin(async move { result })
    }

    fn write(
        &self,
        offset: u64,
        buf: &[u8],
    ) -> Pin<Box<dyn Future<Output = io::Result<usize>> + Send + '_>> {
        let result = self.write_sync(offset, buf);
        Box::pin(async move { result })
    }

    fn flush(&self) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + '_>> {
        let result = self.flush_sync();
        Box::pin(async move { result })
    }

    fn truncate_below(
        &self,
        offset: u64,
    ) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + '_>> {
        let result = self.truncate_below_sync(offset);
        Box::pin(async move { result })
    }

    fn size(&self) -> io::Result<u64> {
        self.size_sync()
    }

    fn alignment(&self) -> usize {
        SyncStorageDevice::alignment(self)
    }
}
