//! The verification flow state machine.
//!
//! Steps run in a fixed order with one three-way branch for address
//! confirmation. The machine is a set of pure transition functions over the
//! persisted [`Attempt`](idv_types::Attempt): each takes the current attempt
//! and returns the next one together with the [`Effect`](idv_types::Effect)s
//! the caller should execute once it has been stored.
//!
//! - Entering a step whose predecessors are incomplete redirects to the first
//!   incomplete one instead of failing the request.
//! - Resubmitting a step with an identical payload is a no-op; a different
//!   payload drops every later completion.
//! - Document and SSN input is sealed under the server key before it is
//!   stored; only non-sensitive fields are offered back on revisit.

pub mod error;
pub mod machine;
pub mod payload;
pub mod sensitive;
pub mod validation;

pub use error::FlowError;
pub use machine::{CancelMode, IdvStateMachine, StepOutcome, Transition};
pub use payload::StepPayload;
pub use validation::{validate_phone, validate_ssn};
