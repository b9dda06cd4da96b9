//! Fundamental types for the identity-verification engine.
//!
//! This crate defines the data shared across every other crate in the workspace:
//! identifiers, timestamps, the persisted entities (users, profiles, enrollments,
//! mailed codes, in-progress attempts), vendor check results, and the injected
//! parameter set. It contains no I/O and no decision logic beyond small derived
//! predicates on the entities themselves.

pub mod attempt;
pub mod audit;
pub mod check;
pub mod components;
pub mod effect;
pub mod enrollment;
pub mod error;
pub mod gpo;
pub mod ids;
pub mod params;
pub mod phone;
pub mod pii;
pub mod profile;
pub mod proofing;
pub mod ratelimit;
pub mod time;
pub mod user;

pub use attempt::{AddressMethod, Attempt, AttemptStatus, SensitiveFields, Step, StepCompletion, StickyFields};
pub use audit::{FraudReviewAction, FraudReviewRecord};
pub use check::{Attribute, CheckKind, CheckResult, Reason};
pub use components::{AddressCheck, ComponentCategory, DocumentType, ProofingComponents, ReviewStatus, Vendor};
pub use effect::{Effect, IdvEvent, Notification, Outcome};
pub use enrollment::{EnrollmentStatus, InPersonEnrollment};
pub use error::TypesError;
pub use gpo::GpoConfirmationCode;
pub use ids::{AttemptId, EnrollmentId, GpoCodeId, ProfileId, UserId};
pub use params::{IdvParams, RateLimitRule, RateLimitTable, RetryParams};
pub use phone::{OtpDelivery, PhoneOtpChallenge};
pub use pii::{Address, Applicant, DocumentPii, SealedBlob, Ssn};
pub use profile::{DeactivationReason, FraudPendingReason, PendingReason, Profile, ProfileState};
pub use proofing::{ProofingJob, ProofingJobStatus, ProofingResult};
pub use ratelimit::{RateLimitKey, RateLimitRecord, RateLimitType};
pub use time::{Clock, SystemClock, Timestamp, DAY_SECS};
pub use user::User;
