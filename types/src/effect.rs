//! Side effects returned by state transitions.
//!
//! Transition functions never notify anyone or write analytics themselves.
//! They return the new state together with a list of [`Effect`]s that the
//! caller executes after the state is committed.

use serde::Serialize;
use std::fmt;

use crate::{
    AttemptId, DeactivationReason, EnrollmentId, EnrollmentStatus, FraudReviewAction, ProfileId,
    RateLimitType, Step, UserId,
};

/// Message templates the notification collaborator understands.
#[derive(Clone, PartialEq, Eq)]
pub enum Notification {
    /// Letter with a one-time code, to the address claimed in the attempt.
    GpoLetter { code: String },
    /// Barcode page for an in-person visit.
    InPersonReadyToVerify { enrollment_code: String },
    InPersonVerified,
    InPersonFailed,
    AccountVerified,
    FraudReviewPassed,
    FraudRejected,
}

impl Notification {
    pub fn template(&self) -> &'static str {
        match self {
            Self::GpoLetter { .. } => "gpo_letter",
            Self::InPersonReadyToVerify { .. } => "in_person_ready_to_verify",
            Self::InPersonVerified => "in_person_verified",
            Self::InPersonFailed => "in_person_failed",
            Self::AccountVerified => "account_verified",
            Self::FraudReviewPassed => "fraud_review_passed",
            Self::FraudRejected => "fraud_rejected",
        }
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Notification({})", self.template())
    }
}

/// Structured analytics event. Write-only; nothing reads these back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IdvEvent {
    AttemptStarted {
        user_id: UserId,
        attempt_id: AttemptId,
    },
    StepCompleted {
        attempt_id: AttemptId,
        step: Step,
        next_step: Step,
    },
    StepReplayed {
        attempt_id: AttemptId,
        step: Step,
    },
    /// Resubmission with a different payload dropped later completions.
    StepInvalidatedDownstream {
        attempt_id: AttemptId,
        step: Step,
        dropped: usize,
    },
    StepRedirected {
        attempt_id: AttemptId,
        requested: Step,
        redirect_to: Step,
    },
    AttemptCancelled {
        attempt_id: AttemptId,
        mode: &'static str,
    },
    ProofingCompleted {
        attempt_id: AttemptId,
        success: bool,
        timed_out: bool,
    },
    ProofingDeferred {
        attempt_id: AttemptId,
    },
    StaleResultDiscarded {
        attempt_id: AttemptId,
        reason: &'static str,
    },
    RateLimited {
        user_id: UserId,
        kind: RateLimitType,
    },
    PhoneOtpSent {
        attempt_id: AttemptId,
    },
    PhoneOtpVerified {
        attempt_id: AttemptId,
        success: bool,
    },
    GpoLetterRequested {
        profile_id: ProfileId,
        resend: bool,
    },
    GpoCodeSubmitted {
        profile_id: ProfileId,
        success: bool,
    },
    InPersonEnrollmentUpdated {
        enrollment_id: EnrollmentId,
        status: EnrollmentStatus,
    },
    FraudReview {
        profile_id: ProfileId,
        action: FraudReviewAction,
    },
    ProfileActivated {
        profile_id: ProfileId,
        superseded: usize,
    },
    ProfilePending {
        profile_id: ProfileId,
        reason: DeactivationReason,
    },
    ProfileDeactivated {
        profile_id: ProfileId,
        reason: DeactivationReason,
    },
    ProofingFailed {
        attempt_id: AttemptId,
    },
}

impl IdvEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AttemptStarted { .. } => "attempt_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::StepReplayed { .. } => "step_replayed",
            Self::StepInvalidatedDownstream { .. } => "step_invalidated_downstream",
            Self::StepRedirected { .. } => "step_redirected",
            Self::AttemptCancelled { .. } => "attempt_cancelled",
            Self::ProofingCompleted { .. } => "proofing_completed",
            Self::ProofingDeferred { .. } => "proofing_deferred",
            Self::StaleResultDiscarded { .. } => "stale_result_discarded",
            Self::RateLimited { .. } => "rate_limited",
            Self::PhoneOtpSent { .. } => "phone_otp_sent",
            Self::PhoneOtpVerified { .. } => "phone_otp_verified",
            Self::GpoLetterRequested { .. } => "gpo_letter_requested",
            Self::GpoCodeSubmitted { .. } => "gpo_code_submitted",
            Self::InPersonEnrollmentUpdated { .. } => "in_person_enrollment_updated",
            Self::FraudReview { .. } => "fraud_review",
            Self::ProfileActivated { .. } => "profile_activated",
            Self::ProfilePending { .. } => "profile_pending",
            Self::ProfileDeactivated { .. } => "profile_deactivated",
            Self::ProofingFailed { .. } => "proofing_failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Best-effort message to the user.
    Notify {
        user_id: UserId,
        notification: Notification,
    },
    Event(IdvEvent),
}

impl Effect {
    pub fn notify(user_id: UserId, notification: Notification) -> Self {
        Self::Notify {
            user_id,
            notification,
        }
    }
}

/// A value plus the side effects the caller runs after committing it.
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub effects: Vec<Effect>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, effects: Vec<Effect>) -> Self {
        Self { value, effects }
    }

    pub fn quiet(value: T) -> Self {
        Self::new(value, Vec::new())
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome::new(f(self.value), self.effects)
    }
}

impl From<IdvEvent> for Effect {
    fn from(event: IdvEvent) -> Self {
        Self::Event(event)
    }
}
