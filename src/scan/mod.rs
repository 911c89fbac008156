//! Record iteration over address ranges of the hybrid log.

mod log_iterator;

pub use log_iterator::{LogEntry, LogIterator, ScanBufferingMode};
