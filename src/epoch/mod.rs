//! Epoch-based protection for region shifts.

mod light_epoch;

pub use light_epoch::{get_thread_id, try_get_thread_id, EpochGuard, LightEpoch, UNPROTECTED};
