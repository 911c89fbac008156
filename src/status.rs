//! Status codes returned by log and store operations.

use std::fmt;

/// Status code returned by tidelog operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Status {
    /// Operation completed successfully
    #[default]
    Ok = 0,
    /// Operation is pending (asynchronous continuation required)
    Pending = 1,
    /// Key was not found
    NotFound = 2,
    /// Out of memory
    OutOfMemory = 3,
    /// I/O error occurred
    IoError = 4,
    /// Data corruption detected
    Corruption = 5,
    /// Operation was aborted
    Aborted = 6,
    /// Invalid argument provided
    InvalidArgument = 7,
    /// Compaction boundary past the safe read-only address
    CompactionBoundary = 8,
    /// Unknown compaction strategy requested
    InvalidCompactionType = 9,
    /// The allocator has been disposed; no further allocations
    AllocatorClosed = 10,
    /// More threads than the epoch table supports
    TooManyThreads = 11,
}

impl Status {
    /// Check if the status indicates success
    #[inline]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    /// Check if the operation is pending
    #[inline]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Status::Pending)
    }

    /// Check if the key was not found
    #[inline]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Status::NotFound)
    }

    /// Check if the status indicates an error
    #[inline]
    pub const fn is_error(&self) -> bool {
        !matches!(self, Status::Ok | Status::Pending | Status::NotFound)
    }

    /// Get the status as a string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "Ok",
            Status::Pending => "Pending",
            Status::NotFound => "NotFound",
            Status::OutOfMemory => "OutOfMemory",
            Status::IoError => "IoError",
            Status::Corruption => "Corruption",
            Status::Aborted => "Aborted",
            Status::InvalidArgument => "InvalidArgument",
            Status::CompactionBoundary => "CompactionBoundary",
            Status::InvalidCompactionType => "InvalidCompactionType",
            Status::AllocatorClosed => "AllocatorClosed",
            Status::TooManyThreads => "TooManyThreads",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::error::Error for Status {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(Status::Ok.is_ok());
        assert!(Status::Pending.is_pending());
        assert!(Status::NotFound.is_not_found());

        assert!(!Status::Ok.is_error());
        assert!(!Status::NotFound.is_error());
        assert!(Status::CompactionBoundary.is_error());
        assert!(Status::AllocatorClosed.is_error());
    }

    #[test]
    fn display_matches_name() {
        assert_eq!(Status::CompactionBoundary.to_string(), "CompactionBoundary");
        assert_eq!(Status::Ok.to_string(), "Ok");
    }
}
