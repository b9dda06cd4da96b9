//! Vendor capability interfaces.
//!
//! Every external check (document authentication, biographic resolution,
//! state-ID record check, device-fraud signal, phone finder) is reached through
//! [`VendorCheckClient`]. Implementations are chosen at construction time.
//! [`GuardedClient`] wraps any client with a per-try timeout and the retry
//! policy, and is the only layer that sees raw [`VendorError`]s: callers above
//! it receive a [`CheckResult`](idv_types::CheckResult) in every case.
//!
//! The in-person provider and outbound telephony live here too, since they
//! are external collaborators with the same error classification.

pub mod client;
pub mod error;
pub mod guard;
pub mod in_person;
pub mod mock;
pub mod status;
pub mod telephony;

pub use client::{CheckRequest, VendorCheckClient};
pub use error::VendorError;
pub use guard::GuardedClient;
pub use in_person::{InPersonProofer, UspsProofingResult, UspsStatus};
pub use status::{OutageFlags, ServiceStatus};
pub use telephony::{SentOtp, Telephony};
