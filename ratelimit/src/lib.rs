//! Rate limiting for abusable IdV operations.
//!
//! Each (user, operation type) pair has a counter and a window that restarts
//! from the most recent attempt. Once the counter reaches the configured
//! maximum the operation is refused until the window closes or an operator
//! resets it. Check and increment happen in one compare-and-swap against the
//! store, so concurrent requests from the same user cannot overshoot.

pub mod error;
pub mod limiter;

pub use error::RateLimitError;
pub use limiter::{RateLimiter, Remaining};
