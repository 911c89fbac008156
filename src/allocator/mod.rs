//! The hybrid log allocator.
//!
//! The allocator owns a ring of `buffer_size` page slots mapped onto a
//! monotonically increasing logical address space. Six address cursors
//! partition the space:
//!
//! ```text
//! ┌─────────┬─────────────┬──────────────┬───────────────┐
//! │ retired │   on-disk   │  read-only   │    mutable    │
//! └─────────┴─────────────┴──────────────┴───────────────┘
//!    ↑           ↑              ↑               ↑      ↑
//!  begin     head (safe)   read-only (safe)   ...    tail
//! ```
//!
//! - **Mutable region**: most recent pages; records may be updated in place
//! - **Read-only region**: older in-memory pages, immutable, being flushed
//! - **On-disk region**: pages evicted from the ring; reads go to the device
//! - **Retired region**: below the begin address; logically deleted
//!
//! Cursors only move upward, and only under epoch protection; each shift's
//! completion (safe-cursor advance, flush submission, page close) runs as an
//! epoch drain action once every thread of the prior epoch has moved on.

mod flush;
mod hybrid_log;
mod page;

pub use hybrid_log::{HybridLog, HybridLogConfig, LogStats};
pub use page::{CloseStatus, PageHeader, PageSlot};

pub(crate) use hybrid_log::HlogInner;
