//! Deciding what a profile becomes.
//!
//! - [`FraudReviewGate`] holds profiles with ambiguous device-fraud signal
//!   for operator review, and records every review action in an audit trail.
//! - [`FinalResolutionEngine`] turns a proofing result, an address outcome and
//!   the fraud status into one [`ProfileDecision`] and commits it. Activation
//!   and the deactivation of any previously active profile are one store
//!   transaction.
//! - [`AttemptFence`] discards results for attempts that are no longer current.
//! - [`PasswordResetHandler`] invalidates profiles whose PII is sealed under
//!   the old password, and restores an active profile from the personal key.

pub mod engine;
pub mod error;
pub mod fence;
pub mod fraud;
pub mod password;

pub use engine::{AddressOutcome, FinalResolutionEngine, ProfileDecision, Rejection};
pub use error::ResolutionError;
pub use fence::{AttemptFence, Fence};
pub use fraud::{FraudReviewGate, FraudStatus};
pub use password::PasswordResetHandler;
