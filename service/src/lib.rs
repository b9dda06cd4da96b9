//! The identity-verification service.
//!
//! Wires the flow state machine, proofing, address confirmation and final
//! resolution behind [`IdvService`], and runs the periodic jobs
//! ([`Scheduler`]) that move asynchronous confirmations forward.
//!
//! State changes are committed before their effects are dispatched;
//! analytics events and notifications never fail the operation that
//! produced them.

pub mod api;
pub mod config;
pub mod effects;
pub mod error;
pub mod jobs;
pub mod scheduler;
pub mod service;
pub mod shutdown;

pub use api::{
    CodeCheck, InPersonPollReport, Password, PendingProfile, PhoneCheck, ProfileCreated,
    ProfileStatus, ProofingPoll, StepInput, StepResponse,
};
pub use config::{ServiceConfig, VendorSelection};
pub use effects::{
    EffectDispatcher, EventSink, LogNotifier, Notifier, RecordingEventSink, RecordingNotifier,
    TracingEventSink,
};
pub use error::ServiceError;
pub use jobs::{JobRunner, JOB_OUTCOMES};
pub use scheduler::{Intervals, Job, Scheduler};
pub use service::{Collaborators, IdvService};
pub use shutdown::ShutdownController;
