//! The in-progress attempt aggregate.
//!
//! An attempt is persisted server-side and referenced by [`AttemptId`]. Its
//! fields are split by sensitivity: [`StickyFields`] may be echoed back to the
//! user on revisit, [`SensitiveFields`] only ever hold sealed ciphertext.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{
    Address, AttemptId, CheckResult, DocumentType, ProfileId, ProofingComponents, ProofingResult,
    SealedBlob, Timestamp, UserId,
};

/// Steps of the verification flow in canonical order.
///
/// The three branch steps share one position; exactly one of them is taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Welcome,
    Agreement,
    DocumentCapture,
    Ssn,
    VerifyInfo,
    AddressConfirmationChoice,
    PhoneBranch,
    GpoBranch,
    InPersonBranch,
    EnterPassword,
    PersonalKey,
    Complete,
}

impl Step {
    pub const ALL: [Step; 12] = [
        Self::Welcome,
        Self::Agreement,
        Self::DocumentCapture,
        Self::Ssn,
        Self::VerifyInfo,
        Self::AddressConfirmationChoice,
        Self::PhoneBranch,
        Self::GpoBranch,
        Self::InPersonBranch,
        Self::EnterPassword,
        Self::PersonalKey,
        Self::Complete,
    ];

    /// Position in the canonical order. Branch steps share a position.
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Welcome => 0,
            Self::Agreement => 1,
            Self::DocumentCapture => 2,
            Self::Ssn => 3,
            Self::VerifyInfo => 4,
            Self::AddressConfirmationChoice => 5,
            Self::PhoneBranch | Self::GpoBranch | Self::InPersonBranch => 6,
            Self::EnterPassword => 7,
            Self::PersonalKey => 8,
            Self::Complete => 9,
        }
    }

    pub fn is_branch(&self) -> bool {
        self.ordinal() == 6
    }

    /// Revisiting restores previously entered non-sensitive values.
    pub fn is_sticky(&self) -> bool {
        self.ordinal() >= Self::DocumentCapture.ordinal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Agreement => "agreement",
            Self::DocumentCapture => "document_capture",
            Self::Ssn => "ssn",
            Self::VerifyInfo => "verify_info",
            Self::AddressConfirmationChoice => "address_confirmation_choice",
            Self::PhoneBranch => "phone_branch",
            Self::GpoBranch => "gpo_branch",
            Self::InPersonBranch => "in_person_branch",
            Self::EnterPassword => "enter_password",
            Self::PersonalKey => "personal_key",
            Self::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.as_str() == s)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressMethod {
    Phone,
    Gpo,
    InPerson,
}

impl AddressMethod {
    pub fn branch(&self) -> Step {
        match self {
            Self::Phone => Step::PhoneBranch,
            Self::Gpo => Step::GpoBranch,
            Self::InPerson => Step::InPersonBranch,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Gpo => "gpo",
            Self::InPerson => "in_person",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    /// Superseded by "start over" or exit; late results are discarded.
    Abandoned,
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCompletion {
    pub completed_at: Timestamp,
    /// Digest of the submitted payload, for idempotent resubmission.
    pub payload_digest: [u8; 32],
}

/// Values that may be shown back to the user when a step is revisited.
///
/// Holds no SSN and no date of birth.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickyFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<Address>,
    pub document_type: Option<DocumentType>,
    pub phone: Option<String>,
}

/// Sealed PII collected by the flow. Never readable without the server key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveFields {
    pub document: Option<SealedBlob>,
    pub ssn: Option<SealedBlob>,
}

impl SensitiveFields {
    pub fn clear(&mut self) {
        self.document = None;
        self.ssn = None;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub user_id: UserId,
    pub status: AttemptStatus,
    pub started_at: Timestamp,
    pub updated_at: Timestamp,
    pub completions: BTreeMap<Step, StepCompletion>,
    pub address_method: Option<AddressMethod>,
    pub sticky: StickyFields,
    pub sensitive: SensitiveFields,
    pub doc_auth_result: Option<CheckResult>,
    pub proofing_result: Option<ProofingResult>,
    pub components: ProofingComponents,
    /// Pending or active profile produced by this attempt.
    pub profile_id: Option<ProfileId>,
    pub phone_confirmed_at: Option<Timestamp>,
    pub personal_key_acknowledged: bool,
}

impl Attempt {
    pub fn new(id: AttemptId, user_id: UserId, now: Timestamp) -> Self {
        Self {
            id,
            user_id,
            status: AttemptStatus::InProgress,
            started_at: now,
            updated_at: now,
            completions: BTreeMap::new(),
            address_method: None,
            sticky: StickyFields::default(),
            sensitive: SensitiveFields::default(),
            doc_auth_result: None,
            proofing_result: None,
            components: ProofingComponents::default(),
            profile_id: None,
            phone_confirmed_at: None,
            personal_key_acknowledged: false,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }

    pub fn is_completed(&self, step: Step) -> bool {
        self.completions.contains_key(&step)
    }

    pub fn completion(&self, step: Step) -> Option<&StepCompletion> {
        self.completions.get(&step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branches_share_a_position() {
        assert_eq!(Step::PhoneBranch.ordinal(), Step::InPersonBranch.ordinal());
        assert!(Step::GpoBranch.is_branch());
        assert!(!Step::EnterPassword.is_branch());
    }

    #[test]
    fn sticky_starts_at_document_capture() {
        assert!(!Step::Agreement.is_sticky());
        assert!(Step::DocumentCapture.is_sticky());
        assert!(Step::VerifyInfo.is_sticky());
    }

    #[test]
    fn step_names_parse_back() {
        for step in Step::ALL {
            assert_eq!(Step::parse(step.as_str()), Some(step));
        }
    }
}
