//! Utility functions and helpers.

pub mod clock;
pub mod http;
pub mod retry;
pub mod url;

pub use clock::{Clock, ManualClock, SystemClock};
pub use retry::RetryPolicy;
