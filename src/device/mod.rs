//! Storage devices backing the on-disk prefix of the hybrid log.
//!
//! The allocator only needs append/flush/read by byte offset plus destructive
//! prefix truncation. Devices come in three flavors: [`NullDevice`] (discards
//! everything; testing and dedup buffers), [`MemoryDevice`] (retains bytes in
//! memory; the deterministic test sink), and [`FileDevice`] (positional I/O
//! on a single file).

mod file_device;
mod memory_device;
mod null_device;
mod traits;

pub use file_device::FileDevice;
pub use memory_device::MemoryDevice;
pub use null_device::NullDevice;
pub use traits::{StorageDevice, SyncStorageDevice};
