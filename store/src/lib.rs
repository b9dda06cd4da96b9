//! Repository traits for the identity-verification engine.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits.
//!
//! Atomicity is part of the contract, not an implementation detail:
//! - [`ProfileStore::activate_profile`] deactivates every other active profile
//!   of the user in the same transaction, and refuses when the profile's PII
//!   key epoch no longer matches the user's password epoch.
//! - `update_*` methods are compare-and-swap on the entity's `version`.
//! - [`RateLimitStore::compare_and_swap_rate_limit`] backs check-and-increment.
//! - [`ProfileStore::delete_profile`] cascades to the profile's mailed codes
//!   and in-person enrollment.

pub mod attempt;
pub mod audit;
pub mod enrollment;
pub mod error;
pub mod gpo;
pub mod phone;
pub mod profile;
pub mod proofing_job;
pub mod rate_limit;
pub mod user;

pub use attempt::AttemptStore;
pub use audit::AuditStore;
pub use enrollment::{update_enrollment_with, EnrollmentStore};
pub use error::StoreError;
pub use gpo::GpoCodeStore;
pub use phone::PhoneOtpStore;
pub use profile::{update_profile_with, Activation, ProfileStore, MAX_CAS_ROUNDS};
pub use proofing_job::ProofingJobStore;
pub use rate_limit::RateLimitStore;
pub use user::UserStore;

/// Every repository the engine needs, behind one object.
pub trait IdvStore:
    UserStore
    + ProfileStore
    + EnrollmentStore
    + GpoCodeStore
    + AttemptStore
    + RateLimitStore
    + ProofingJobStore
    + PhoneOtpStore
    + AuditStore
    + Send
    + Sync
{
}

impl<T> IdvStore for T where
    T: UserStore
        + ProfileStore
        + EnrollmentStore
        + GpoCodeStore
        + AttemptStore
        + RateLimitStore
        + ProofingJobStore
        + PhoneOtpStore
        + AuditStore
        + Send
        + Sync
{
}
