//! Inputs and answers exchanged with the session layer.

use std::collections::BTreeMap;
use std::fmt;

use idv_address::PendingToken;
use idv_flow::StepOutcome;
use idv_resolution::ProfileDecision;
use idv_types::{AddressMethod, AttemptId, DocumentPii, PendingReason, ProfileId, Ssn, Step};
use zeroize::Zeroizing;

/// A password as typed. Never printed.
#[derive(Clone)]
pub struct Password(Zeroizing<String>);

impl Password {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(Zeroizing::new(raw.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(..)")
    }
}

/// What the user submitted for one step. Vendor verdicts are never part of
/// the input; the service obtains them itself.
#[derive(Clone, Debug)]
pub enum StepInput {
    Welcome,
    Agreement { accepted: bool },
    DocumentCapture { document: DocumentPii },
    Ssn { ssn: Ssn },
    VerifyInfo {
        threatmetrix_session_id: Option<String>,
        request_ip: Option<String>,
    },
    AddressConfirmationChoice { method: AddressMethod },
    GpoBranch,
    InPersonBranch,
    EnterPassword { password: Password },
    PersonalKey { acknowledged: bool },
}

impl StepInput {
    pub fn step(&self) -> Step {
        match self {
            Self::Welcome => Step::Welcome,
            Self::Agreement { .. } => Step::Agreement,
            Self::DocumentCapture { .. } => Step::DocumentCapture,
            Self::Ssn { .. } => Step::Ssn,
            Self::VerifyInfo { .. } => Step::VerifyInfo,
            Self::AddressConfirmationChoice { .. } => Step::AddressConfirmationChoice,
            Self::GpoBranch => Step::GpoBranch,
            Self::InPersonBranch => Step::InPersonBranch,
            Self::EnterPassword { .. } => Step::EnterPassword,
            Self::PersonalKey { .. } => Step::PersonalKey,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepResponse {
    Step(StepOutcome),
    /// Verification is running in the background; poll for the result.
    ProofingQueued { attempt_id: AttemptId },
    ProfileCreated(ProfileCreated),
}

impl StepResponse {
    /// The flow outcome, when the step produced one.
    pub fn outcome(&self) -> Option<&StepOutcome> {
        match self {
            Self::Step(outcome) => Some(outcome),
            Self::ProfileCreated(created) => Some(&created.outcome),
            Self::ProofingQueued { .. } => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ProfileCreated {
    pub profile_id: ProfileId,
    pub outcome: StepOutcome,
    /// Shown once. Absent when the step was replayed.
    pub personal_key: Option<String>,
    pub decision: ProfileDecision,
    /// Letter or enrollment handed out for the chosen address method.
    pub pending: Option<PendingToken>,
}

impl fmt::Debug for ProfileCreated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileCreated")
            .field("profile_id", &self.profile_id)
            .field("outcome", &self.outcome)
            .field("decision", &self.decision)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhoneCheck {
    Confirmed(StepOutcome),
    Incorrect { remaining: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeCheck {
    Accepted(ProfileDecision),
    Expired,
    Incorrect { remaining: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProofingPoll {
    /// Nothing was submitted for the current attempt.
    Missing,
    Pending,
    /// The job stopped reporting; the user may resubmit.
    Lost,
    Failed(String),
    Applied(StepResponse),
    /// The result belonged to an attempt that is no longer current.
    Discarded,
}

/// What the user can see about their profiles, read fresh from the store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileStatus {
    pub active: Option<ProfileId>,
    pub pending: Option<PendingProfile>,
    pub fraud_rejected: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingProfile {
    pub profile_id: ProfileId,
    pub reasons: Vec<PendingReason>,
    /// Barcode text for an in-person visit.
    pub enrollment_code: Option<String>,
}

/// One pass over pending in-person enrollments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InPersonPollReport {
    pub passed: Vec<ProfileId>,
    pub closed: Vec<ProfileId>,
    /// Passed profiles with nothing else outstanding.
    pub activated: Vec<ProfileId>,
    pub stats: BTreeMap<&'static str, u64>,
}
