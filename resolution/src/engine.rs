//! The final activation decision.
//!
//! [`FinalResolutionEngine::resolve`] is a pure decision table. Rows are
//! checked in order and the first match wins:
//!
//! | # | condition                       | decision                        |
//! |---|---------------------------------|---------------------------------|
//! | 1 | fraud status is reject          | rejected (fraud)                |
//! | 2 | fraud status is pending         | pending (fraud review)          |
//! | 3 | proofing did not succeed        | rejected (retryable)            |
//! | 4 | address confirmation is pending | pending (mail or in-person)     |
//! | 5 | address confirmation failed     | rejected (retryable)            |
//! | 6 | otherwise                       | active                          |
//!
//! [`FinalResolutionEngine::apply`] commits a decision to the profile.

use std::sync::Arc;

use idv_store::{update_profile_with, IdvStore, StoreError, MAX_CAS_ROUNDS};
use idv_types::{
    Clock, DeactivationReason, Effect, IdvEvent, Notification, Outcome, PendingReason, Profile,
    ProfileId, ProofingResult, Timestamp,
};

use crate::{FraudStatus, ResolutionError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressOutcome {
    Verified,
    Pending(PendingReason),
    Failed,
}

impl AddressOutcome {
    /// Address state as recorded on the profile.
    pub fn of(profile: &Profile) -> Self {
        if profile.gpo_verification_pending() {
            Self::Pending(PendingReason::GpoVerificationPending)
        } else if profile.in_person_verification_pending() {
            Self::Pending(PendingReason::InPersonVerificationPending)
        } else if profile.gpo_verification_expired_at.is_some() {
            Self::Failed
        } else {
            Self::Verified
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Terminal; blocks new attempts until an operator reverses it.
    Fraud,
    /// The user may start over immediately.
    ProofingFailed,
    AddressFailed,
    /// Already closed for this reason; nothing left to decide.
    Closed(DeactivationReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileDecision {
    Active,
    Pending(PendingReason),
    Rejected(Rejection),
}

impl ProfileDecision {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Rejected(Rejection::ProofingFailed | Rejection::AddressFailed)
        )
    }
}

#[derive(Clone)]
pub struct FinalResolutionEngine {
    store: Arc<dyn IdvStore>,
    clock: Arc<dyn Clock>,
}

impl FinalResolutionEngine {
    pub fn new(store: Arc<dyn IdvStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn resolve(
        result: &ProofingResult,
        address: AddressOutcome,
        fraud: FraudStatus,
    ) -> ProfileDecision {
        decide(result.success, address, fraud)
    }

    /// Decide again from persisted profile state, after an asynchronous
    /// outcome landed. The profile exists only because proofing succeeded.
    pub fn reassess(profile: &Profile) -> ProfileDecision {
        if profile.deactivation_reason.is_terminal() && !profile.fraud_rejected() {
            return ProfileDecision::Rejected(Rejection::Closed(profile.deactivation_reason));
        }
        decide(true, AddressOutcome::of(profile), FraudStatus::of(profile))
    }

    /// Commit `decision` to the stored profile.
    ///
    /// Pending markers are owned by the address strategies and the fraud gate;
    /// a pending decision only records the event.
    pub fn apply(
        &self,
        profile_id: ProfileId,
        decision: ProfileDecision,
    ) -> Result<Outcome<Profile>, ResolutionError> {
        let now = self.clock.now();
        tracing::info!(%profile_id, ?decision, "applying decision");
        match decision {
            ProfileDecision::Active => activate(self.store.as_ref(), profile_id, now),
            ProfileDecision::Pending(reason) => {
                let profile = self.store.get_profile(profile_id)?;
                let event = IdvEvent::ProfilePending {
                    profile_id,
                    reason: reason
                        .deactivation_reason()
                        .unwrap_or(DeactivationReason::None),
                };
                Ok(Outcome::new(profile, vec![event.into()]))
            }
            ProfileDecision::Rejected(Rejection::Fraud) => {
                let profile = update_profile_with(self.store.as_ref(), profile_id, |p| {
                    if p.fraud_rejected() {
                        return false;
                    }
                    mark_fraud_rejected(p, now);
                    true
                })?;
                let event = deactivated(profile_id, DeactivationReason::FraudRejection);
                Ok(Outcome::new(profile, vec![event]))
            }
            ProfileDecision::Rejected(Rejection::ProofingFailed | Rejection::AddressFailed) => {
                let profile = update_profile_with(self.store.as_ref(), profile_id, |p| {
                    if p.active {
                        return false;
                    }
                    p.deactivation_reason = p
                        .deactivation_reason
                        .escalate(DeactivationReason::VerificationCancelled);
                    true
                })?;
                let event = deactivated(profile_id, profile.deactivation_reason);
                Ok(Outcome::new(profile, vec![event]))
            }
            ProfileDecision::Rejected(Rejection::Closed(_)) => {
                Ok(Outcome::quiet(self.store.get_profile(profile_id)?))
            }
        }
    }
}

fn decide(success: bool, address: AddressOutcome, fraud: FraudStatus) -> ProfileDecision {
    match (fraud, success, address) {
        (FraudStatus::Reject, _, _) => ProfileDecision::Rejected(Rejection::Fraud),
        (FraudStatus::Pending(_), _, _) => {
            ProfileDecision::Pending(PendingReason::FraudReviewPending)
        }
        (FraudStatus::Clear, false, _) => ProfileDecision::Rejected(Rejection::ProofingFailed),
        (FraudStatus::Clear, true, AddressOutcome::Pending(reason)) => {
            ProfileDecision::Pending(reason)
        }
        (FraudStatus::Clear, true, AddressOutcome::Failed) => {
            ProfileDecision::Rejected(Rejection::AddressFailed)
        }
        (FraudStatus::Clear, true, AddressOutcome::Verified) => ProfileDecision::Active,
    }
}

pub(crate) fn deactivated(profile_id: ProfileId, reason: DeactivationReason) -> Effect {
    IdvEvent::ProfileDeactivated { profile_id, reason }.into()
}

pub(crate) fn mark_fraud_rejected(p: &mut Profile, now: Timestamp) {
    p.active = false;
    p.fraud_review_pending_at = None;
    p.fraud_rejection_at = Some(now);
    p.deactivation_reason = p
        .deactivation_reason
        .escalate(DeactivationReason::FraudRejection);
}

/// Activate in one store transaction with the deactivation of the user's
/// other active profile. A password change since the PII was sealed turns
/// the activation into an encryption-error deactivation.
pub(crate) fn activate(
    store: &dyn IdvStore,
    profile_id: ProfileId,
    now: Timestamp,
) -> Result<Outcome<Profile>, ResolutionError> {
    let mut last = None;
    for _ in 0..MAX_CAS_ROUNDS {
        let profile = store.get_profile(profile_id)?;
        if profile.active {
            return Ok(Outcome::quiet(profile));
        }
        if let Some(reason) = profile.reason_not_to_activate() {
            return Err(ResolutionError::NotActivatable {
                profile: profile_id,
                reason,
            });
        }

        let mut next = profile;
        next.active = true;
        next.activated_at = Some(now);
        next.verified_at.get_or_insert(now);
        next.deactivation_reason = DeactivationReason::None;

        match store.activate_profile(&next) {
            Ok(activation) => {
                tracing::info!(%profile_id, superseded = activation.superseded.len(), "profile activated");
                let mut effects = vec![Effect::from(IdvEvent::ProfileActivated {
                    profile_id,
                    superseded: activation.superseded.len(),
                })];
                effects.extend(
                    activation
                        .superseded
                        .iter()
                        .map(|&old| deactivated(old, DeactivationReason::Superseded)),
                );
                effects.push(Effect::notify(
                    activation.profile.user_id,
                    Notification::AccountVerified,
                ));
                return Ok(Outcome::new(activation.profile, effects));
            }
            Err(StoreError::StaleKeyEpoch { .. }) => {
                tracing::warn!(%profile_id, "pii sealed under an old password");
                let profile = update_profile_with(store, profile_id, |p| {
                    p.active = false;
                    p.deactivation_reason = p
                        .deactivation_reason
                        .escalate(DeactivationReason::EncryptionError);
                    true
                })?;
                let event = deactivated(profile_id, DeactivationReason::EncryptionError);
                return Ok(Outcome::new(profile, vec![event]));
            }
            Err(e) if e.is_conflict() => last = Some(e),
            Err(e) => return Err(e.into()),
        }
    }
    Err(last
        .unwrap_or_else(|| StoreError::Backend(format!("profile {profile_id} kept changing")))
        .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use idv_types::{AttemptId, FraudPendingReason};

    fn result(success: bool) -> ProofingResult {
        let mut r = ProofingResult::service_unavailable(AttemptId::new([1; 16]), vec![], Timestamp::new(1));
        r.success = success;
        r
    }

    #[test]
    fn fraud_reject_wins_over_everything() {
        let d = FinalResolutionEngine::resolve(&result(true), AddressOutcome::Verified, FraudStatus::Reject);
        assert_eq!(d, ProfileDecision::Rejected(Rejection::Fraud));
        assert!(!d.is_retryable());
    }

    #[test]
    fn fraud_pending_holds_a_verified_address() {
        let d = FinalResolutionEngine::resolve(
            &result(true),
            AddressOutcome::Verified,
            FraudStatus::Pending(FraudPendingReason::ThreatmetrixReview),
        );
        assert_eq!(d, ProfileDecision::Pending(PendingReason::FraudReviewPending));
    }

    #[test]
    fn failed_proofing_is_retryable() {
        let d = FinalResolutionEngine::resolve(
            &result(false),
            AddressOutcome::Pending(PendingReason::GpoVerificationPending),
            FraudStatus::Clear,
        );
        assert_eq!(d, ProfileDecision::Rejected(Rejection::ProofingFailed));
        assert!(d.is_retryable());
    }

    #[test]
    fn pending_address_keeps_its_reason() {
        let d = FinalResolutionEngine::resolve(
            &result(true),
            AddressOutcome::Pending(PendingReason::InPersonVerificationPending),
            FraudStatus::Clear,
        );
        assert_eq!(d, ProfileDecision::Pending(PendingReason::InPersonVerificationPending));
    }

    #[test]
    fn all_clear_activates() {
        let d = FinalResolutionEngine::resolve(&result(true), AddressOutcome::Verified, FraudStatus::Clear);
        assert_eq!(d, ProfileDecision::Active);
    }
}
