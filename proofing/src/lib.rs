//! Proofing orchestration.
//!
//! [`ProofingOrchestrator`] runs the checks of a [`ProofingPlan`] concurrently
//! and folds them into one [`ProofingResult`](idv_types::ProofingResult).
//! [`ProofingJobs`] wraps it for synchronous or background execution, storing
//! the result under the attempt id either way.

pub mod adjudication;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod plan;

pub use adjudication::{adjudicate_resolution, aggregate};
pub use error::ProofingError;
pub use jobs::{ExecutionMode, JobPoll, ProofingJobs, Submission};
pub use orchestrator::ProofingOrchestrator;
pub use plan::ProofingPlan;
