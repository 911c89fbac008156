//! The key-value store built over the hybrid log.

mod functions;
mod kv;
mod pending_io;
mod session;

pub use functions::StoreFunctions;
pub use kv::{StoreConfig, TideKv};
pub use session::Session;
