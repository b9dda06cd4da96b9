//! Address confirmation strategies.
//!
//! Three strategies share the [`AddressConfirmation`] contract:
//!
//! - **Phone**: synchronous OTP send/verify loop. Send and verify are rate
//!   limited separately, and a verify lockout also suppresses sends.
//! - **GPO**: a one-time code mailed to the claimed address. Only the code's
//!   keyed fingerprint is stored; any unexpired code for the profile matches.
//! - **In-person**: an enrollment with the in-person proofing provider whose
//!   status only ever changes through [`InPersonStatusPoller`] or an explicit
//!   cancel.
//!
//! Strategies never activate a profile. They set or clear its pending marker
//! and report an [`AddressStatus`]; activation is decided elsewhere.

pub mod error;
pub mod gpo;
pub mod in_person;
pub mod phone;
pub mod poller;
pub mod strategy;

pub use error::AddressError;
pub use gpo::{GpoCheck, GpoConfirmation};
pub use in_person::InPersonConfirmation;
pub use phone::{OtpCheck, PhoneConfirmation};
pub use poller::{InPersonStatusPoller, PollSummary, POLL_OUTCOMES};
pub use strategy::{
    AddressConfirmation, AddressStatus, AddressSubject, InitiateParams, Outcome, PendingToken,
};
