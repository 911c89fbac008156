//! User-visible log surface: the accessor façade and observer plumbing.

mod accessor;
mod observer;

pub use accessor::LogAccessor;
pub use observer::{LogObserver, SubscriptionHandle};
