//! Profile: the persisted outcome of one verification attempt.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AttemptId, ProfileId, ProofingComponents, SealedBlob, Timestamp, UserId};

/// Why a profile is not (or no longer) active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationReason {
    #[default]
    None,
    /// PII is no longer decryptable (password changed while pending).
    EncryptionError,
    /// Password changed on an active profile; recoverable with the personal key.
    PasswordReset,
    VerificationCancelled,
    GpoVerificationPending,
    InPersonVerificationPending,
    FraudRejection,
    /// A newer profile for the same user was activated.
    Superseded,
}

impl DeactivationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::EncryptionError => "encryption_error",
            Self::PasswordReset => "password_reset",
            Self::VerificationCancelled => "verification_cancelled",
            Self::GpoVerificationPending => "gpo_verification_pending",
            Self::InPersonVerificationPending => "in_person_verification_pending",
            Self::FraudRejection => "fraud_rejection",
            Self::Superseded => "superseded",
        }
    }

    /// Reasons from which a profile can never become active again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::EncryptionError | Self::FraudRejection | Self::VerificationCancelled | Self::Superseded
        )
    }

    /// Rank used when two triggering conditions apply at once; higher wins.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::GpoVerificationPending | Self::InPersonVerificationPending => 1,
            Self::Superseded => 2,
            Self::VerificationCancelled => 3,
            Self::PasswordReset => 4,
            Self::FraudRejection => 5,
            Self::EncryptionError => 6,
        }
    }

    /// The reason that should be recorded when `incoming` applies to a profile
    /// already carrying `self`.
    pub fn escalate(self, incoming: DeactivationReason) -> DeactivationReason {
        if incoming.precedence() >= self.precedence() {
            incoming
        } else {
            self
        }
    }
}

impl fmt::Display for DeactivationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which device-fraud signal put the profile into review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudPendingReason {
    ThreatmetrixReview,
    ThreatmetrixReject,
}

impl FraudPendingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThreatmetrixReview => "threatmetrix_review",
            Self::ThreatmetrixReject => "threatmetrix_reject",
        }
    }
}

/// Outstanding condition keeping a profile in "pending completion".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingReason {
    FraudReviewPending,
    GpoVerificationPending,
    InPersonVerificationPending,
}

impl PendingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FraudReviewPending => "fraud_review_pending",
            Self::GpoVerificationPending => "gpo_verification_pending",
            Self::InPersonVerificationPending => "in_person_verification_pending",
        }
    }

    /// The deactivation reason recorded while this is outstanding, if any.
    pub fn deactivation_reason(&self) -> Option<DeactivationReason> {
        match self {
            Self::FraudReviewPending => None,
            Self::GpoVerificationPending => Some(DeactivationReason::GpoVerificationPending),
            Self::InPersonVerificationPending => {
                Some(DeactivationReason::InPersonVerificationPending)
            }
        }
    }
}

/// The three-way view of a profile: active, pending completion, or failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProfileState {
    Active,
    Pending(Vec<PendingReason>),
    FraudRejected,
    Deactivated(DeactivationReason),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub user_id: UserId,
    /// The attempt that produced this profile; late results are fenced on it.
    pub attempt_id: AttemptId,
    pub active: bool,
    pub activated_at: Option<Timestamp>,
    pub verified_at: Option<Timestamp>,
    pub deactivation_reason: DeactivationReason,
    pub fraud_review_pending_at: Option<Timestamp>,
    pub fraud_rejection_at: Option<Timestamp>,
    pub fraud_pending_reason: Option<FraudPendingReason>,
    pub gpo_verification_pending_at: Option<Timestamp>,
    pub gpo_verification_expired_at: Option<Timestamp>,
    pub in_person_verification_pending_at: Option<Timestamp>,
    pub proofing_components: ProofingComponents,
    /// PII sealed under the user's password-derived key.
    pub encrypted_pii: Option<SealedBlob>,
    /// PII sealed under the personal key.
    pub encrypted_pii_recovery: Option<SealedBlob>,
    /// The user's password epoch when `encrypted_pii` was sealed.
    pub pii_key_epoch: u32,
    pub created_at: Timestamp,
    /// Optimistic-concurrency counter, bumped by every store write.
    pub version: u64,
}

impl Profile {
    pub fn new(
        id: ProfileId,
        user_id: UserId,
        attempt_id: AttemptId,
        proofing_components: ProofingComponents,
        pii_key_epoch: u32,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id,
            attempt_id,
            active: false,
            activated_at: None,
            verified_at: None,
            deactivation_reason: DeactivationReason::None,
            fraud_review_pending_at: None,
            fraud_rejection_at: None,
            fraud_pending_reason: None,
            gpo_verification_pending_at: None,
            gpo_verification_expired_at: None,
            in_person_verification_pending_at: None,
            proofing_components,
            encrypted_pii: None,
            encrypted_pii_recovery: None,
            pii_key_epoch,
            created_at: now,
            version: 0,
        }
    }

    pub fn fraud_review_pending(&self) -> bool {
        self.fraud_review_pending_at.is_some()
    }

    pub fn fraud_rejected(&self) -> bool {
        self.fraud_rejection_at.is_some()
    }

    pub fn gpo_verification_pending(&self) -> bool {
        self.gpo_verification_pending_at.is_some()
    }

    pub fn in_person_verification_pending(&self) -> bool {
        self.in_person_verification_pending_at.is_some()
    }

    /// Outstanding pending conditions, in a stable order.
    pub fn pending_reasons(&self) -> Vec<PendingReason> {
        if self.deactivation_reason.is_terminal() || self.fraud_rejected() {
            return Vec::new();
        }
        let mut reasons = Vec::new();
        if self.fraud_review_pending() {
            reasons.push(PendingReason::FraudReviewPending);
        }
        if self.gpo_verification_pending() {
            reasons.push(PendingReason::GpoVerificationPending);
        }
        if self.in_person_verification_pending() {
            reasons.push(PendingReason::InPersonVerificationPending);
        }
        reasons
    }

    pub fn is_pending(&self) -> bool {
        !self.pending_reasons().is_empty()
    }

    pub fn state(&self) -> ProfileState {
        if self.active {
            return ProfileState::Active;
        }
        if self.fraud_rejected() {
            return ProfileState::FraudRejected;
        }
        let pending = self.pending_reasons();
        if !pending.is_empty() {
            return ProfileState::Pending(pending);
        }
        ProfileState::Deactivated(self.deactivation_reason)
    }

    /// Why this profile cannot be activated right now, if anything blocks it.
    pub fn reason_not_to_activate(&self) -> Option<String> {
        let pending = self.pending_reasons();
        if !pending.is_empty() {
            let names: Vec<&str> = pending.iter().map(|r| r.as_str()).collect();
            return Some(format!("pending reasons: {}", names.join(",")));
        }
        if self.fraud_rejected() {
            return Some("fraud rejection".to_string());
        }
        if self.gpo_verification_expired_at.is_some() {
            return Some("gpo verification expired".to_string());
        }
        match self.deactivation_reason {
            DeactivationReason::None | DeactivationReason::PasswordReset => None,
            reason => Some(format!("deactivation reason: {reason}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile::new(
            ProfileId::new(1),
            UserId::new(1),
            AttemptId::new([1; 16]),
            ProofingComponents::default(),
            0,
            Timestamp::new(1_000),
        )
    }

    #[test]
    fn new_profile_is_deactivated_with_no_reason() {
        let p = profile();
        assert_eq!(p.state(), ProfileState::Deactivated(DeactivationReason::None));
        assert!(p.reason_not_to_activate().is_none());
    }

    #[test]
    fn pending_markers_make_a_third_state() {
        let mut p = profile();
        p.gpo_verification_pending_at = Some(Timestamp::new(1_001));
        p.fraud_review_pending_at = Some(Timestamp::new(1_001));
        assert_eq!(
            p.state(),
            ProfileState::Pending(vec![
                PendingReason::FraudReviewPending,
                PendingReason::GpoVerificationPending
            ])
        );
        assert!(p.reason_not_to_activate().is_some());
    }

    #[test]
    fn terminal_reason_masks_pending_markers() {
        let mut p = profile();
        p.in_person_verification_pending_at = Some(Timestamp::new(1_001));
        p.deactivation_reason = DeactivationReason::EncryptionError;
        assert!(!p.is_pending());
        assert_eq!(
            p.state(),
            ProfileState::Deactivated(DeactivationReason::EncryptionError)
        );
    }

    #[test]
    fn escalation_keeps_the_stronger_reason() {
        let r = DeactivationReason::FraudRejection.escalate(DeactivationReason::PasswordReset);
        assert_eq!(r, DeactivationReason::FraudRejection);
        let r = DeactivationReason::FraudRejection.escalate(DeactivationReason::EncryptionError);
        assert_eq!(r, DeactivationReason::EncryptionError);
        let r = DeactivationReason::GpoVerificationPending
            .escalate(DeactivationReason::VerificationCancelled);
        assert_eq!(r, DeactivationReason::VerificationCancelled);
    }
}
