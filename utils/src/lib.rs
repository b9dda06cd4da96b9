//! Shared utilities for the identity-verification engine.

pub mod logging;
pub mod retry;
pub mod stats;
pub mod time;

pub use logging::{init_logging, LogFormat};
pub use retry::{retry_async, Classify, ErrorClass, RetryError, RetryPolicy};
pub use stats::StatsCounter;
pub use time::{format_duration, format_remaining};
