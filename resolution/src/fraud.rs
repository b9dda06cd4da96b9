//! Operator fraud review.
//!
//! A held profile is reviewable for a fixed window from when it was held.
//! Every action appends a [`FraudReviewRecord`]; repeating an action that
//! already took effect is a no-op and writes nothing.

use std::sync::Arc;

use idv_crypto::{random_u64, RandomSource};
use idv_store::{update_profile_with, IdvStore};
use idv_types::{
    AttemptId, Clock, DeactivationReason, Effect, FraudPendingReason, FraudReviewAction,
    FraudReviewRecord, IdvEvent, IdvParams, Notification, Outcome, Profile, ProfileId,
    ProofingComponents, ProofingResult, Timestamp, UserId,
};

use crate::engine::{activate, deactivated, mark_fraud_rejected};
use crate::ResolutionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FraudStatus {
    Clear,
    Pending(FraudPendingReason),
    Reject,
}

impl FraudStatus {
    /// Fraud status as recorded on the profile.
    pub fn of(profile: &Profile) -> Self {
        if profile.fraud_rejected() {
            Self::Reject
        } else if profile.fraud_review_pending() {
            Self::Pending(
                profile
                    .fraud_pending_reason
                    .unwrap_or(FraudPendingReason::ThreatmetrixReview),
            )
        } else {
            Self::Clear
        }
    }
}

pub struct FraudReviewGate {
    store: Arc<dyn IdvStore>,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RandomSource>,
    window_secs: u64,
}

impl FraudReviewGate {
    pub fn new(
        store: Arc<dyn IdvStore>,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn RandomSource>,
        params: &IdvParams,
    ) -> Self {
        Self {
            store,
            clock,
            rng,
            window_secs: params.fraud_review_window_secs(),
        }
    }

    pub fn evaluate(result: &ProofingResult) -> FraudStatus {
        if result.device_fraud_hard_reject {
            FraudStatus::Reject
        } else if let Some(reason) = result.fraud_review_pending_reason {
            FraudStatus::Pending(reason)
        } else {
            FraudStatus::Clear
        }
    }

    fn audit(
        &self,
        profile_id: ProfileId,
        action: FraudReviewAction,
        operator_reason: Option<&str>,
        at: Timestamp,
    ) -> Result<Effect, ResolutionError> {
        self.store.append_fraud_review(&FraudReviewRecord {
            profile_id,
            action,
            operator_reason: operator_reason.map(str::to_string),
            at,
        })?;
        tracing::info!(%profile_id, action = action.as_str(), "fraud review recorded");
        Ok(IdvEvent::FraudReview { profile_id, action }.into())
    }

    /// Hold a profile for review. Other profiles of the user, including an
    /// active one from an earlier attempt, are left alone.
    pub fn hold(
        &self,
        profile_id: ProfileId,
        reason: FraudPendingReason,
    ) -> Result<Outcome<Profile>, ResolutionError> {
        let now = self.clock.now();
        let mut held = false;
        let profile = update_profile_with(self.store.as_ref(), profile_id, |p| {
            held = !p.fraud_review_pending() && !p.fraud_rejected();
            if held {
                p.fraud_review_pending_at = Some(now);
                p.fraud_pending_reason = Some(reason);
            }
            held
        })?;
        if !held {
            return Ok(Outcome::quiet(profile));
        }
        let effects = vec![
            self.audit(profile_id, FraudReviewAction::Held, Some(reason.as_str()), now)?,
            IdvEvent::ProfilePending {
                profile_id,
                reason: DeactivationReason::None,
            }
            .into(),
        ];
        Ok(Outcome::new(profile, effects))
    }

    fn ensure_reviewable(&self, profile: &Profile, now: Timestamp) -> Result<(), ResolutionError> {
        let Some(since) = profile.fraud_review_pending_at else {
            return Err(ResolutionError::NotUnderReview(profile.id));
        };
        if since.has_expired(self.window_secs, now) {
            return Err(ResolutionError::ReviewWindowExpired {
                profile: profile.id,
                closed_at: since.plus_secs(self.window_secs),
            });
        }
        Ok(())
    }

    /// Clear the hold and activate, unless an address confirmation is still
    /// outstanding.
    pub fn pass(
        &self,
        profile_id: ProfileId,
        operator_reason: &str,
    ) -> Result<Outcome<Profile>, ResolutionError> {
        let now = self.clock.now();
        let profile = self.store.get_profile(profile_id)?;
        let already_passed = !profile.fraud_review_pending()
            && self.last_action(profile_id)? == Some(FraudReviewAction::Passed);
        if already_passed {
            return Ok(Outcome::quiet(profile));
        }
        self.ensure_reviewable(&profile, now)?;

        let profile = update_profile_with(self.store.as_ref(), profile_id, |p| {
            p.fraud_review_pending_at = None;
            p.fraud_pending_reason = None;
            true
        })?;
        let mut effects = vec![
            self.audit(profile_id, FraudReviewAction::Passed, Some(operator_reason), now)?,
            Effect::notify(profile.user_id, Notification::FraudReviewPassed),
        ];
        if let Some(reason) = profile.reason_not_to_activate() {
            tracing::info!(%profile_id, %reason, "review passed; profile stays inactive");
            return Ok(Outcome::new(profile, effects));
        }
        let activated = activate(self.store.as_ref(), profile_id, now)?;
        effects.extend(activated.effects);
        Ok(Outcome::new(activated.value, effects))
    }

    /// Permanently reject. The user cannot start a new attempt until an
    /// operator reverses this.
    pub fn reject(
        &self,
        profile_id: ProfileId,
        operator_reason: &str,
    ) -> Result<Outcome<Profile>, ResolutionError> {
        let now = self.clock.now();
        let profile = self.store.get_profile(profile_id)?;
        if profile.fraud_rejected() {
            return Ok(Outcome::quiet(profile));
        }
        self.ensure_reviewable(&profile, now)?;
        self.close(profile_id, FraudReviewAction::Rejected, Some(operator_reason), now)
    }

    fn close(
        &self,
        profile_id: ProfileId,
        action: FraudReviewAction,
        operator_reason: Option<&str>,
        now: Timestamp,
    ) -> Result<Outcome<Profile>, ResolutionError> {
        let profile = update_profile_with(self.store.as_ref(), profile_id, |p| {
            mark_fraud_rejected(p, now);
            true
        })?;
        let effects = vec![
            self.audit(profile_id, action, operator_reason, now)?,
            deactivated(profile_id, DeactivationReason::FraudRejection),
            Effect::notify(profile.user_id, Notification::FraudRejected),
        ];
        Ok(Outcome::new(profile, effects))
    }

    /// Record a device-fraud hard reject for an attempt that never produced a
    /// profile, so that the rejection blocks later attempts.
    pub fn reject_attempt(
        &self,
        user: UserId,
        attempt_id: AttemptId,
        components: ProofingComponents,
    ) -> Result<Outcome<Profile>, ResolutionError> {
        let now = self.clock.now();
        let epoch = self.store.get_user(user)?.password_epoch;
        let id = ProfileId::new(random_u64(self.rng.as_ref())?);
        let mut profile = Profile::new(id, user, attempt_id, components, epoch, now);
        mark_fraud_rejected(&mut profile, now);
        self.store.insert_profile(&profile)?;
        let effects = vec![
            self.audit(id, FraudReviewAction::Rejected, Some("device_fraud_reject"), now)?,
            deactivated(id, DeactivationReason::FraudRejection),
        ];
        Ok(Outcome::new(profile, effects))
    }

    /// Lift a rejection. The profile stays inactive; the user may proof again.
    pub fn reverse_rejection(
        &self,
        profile_id: ProfileId,
        operator_reason: &str,
    ) -> Result<Outcome<Profile>, ResolutionError> {
        let now = self.clock.now();
        let profile = self.store.get_profile(profile_id)?;
        if !profile.fraud_rejected() {
            return Err(ResolutionError::NotRejected(profile_id));
        }
        let profile = update_profile_with(self.store.as_ref(), profile_id, |p| {
            p.fraud_rejection_at = None;
            p.fraud_pending_reason = None;
            if p.deactivation_reason == DeactivationReason::FraudRejection {
                p.deactivation_reason = DeactivationReason::VerificationCancelled;
            }
            true
        })?;
        let effect = self.audit(
            profile_id,
            FraudReviewAction::Reversed,
            Some(operator_reason),
            now,
        )?;
        Ok(Outcome::new(profile, vec![effect]))
    }

    /// Auto-reject every hold older than the review window.
    pub fn sweep_expired(&self) -> Result<Outcome<Vec<ProfileId>>, ResolutionError> {
        let now = self.clock.now();
        let mut rejected = Vec::new();
        let mut effects = Vec::new();
        for profile in self.store.iter_profiles()? {
            let Some(since) = profile.fraud_review_pending_at else {
                continue;
            };
            if profile.fraud_rejected() || !since.has_expired(self.window_secs, now) {
                continue;
            }
            let closed = self.close(profile.id, FraudReviewAction::AutoRejected, None, now)?;
            effects.extend(closed.effects);
            rejected.push(profile.id);
        }
        if !rejected.is_empty() {
            tracing::info!(count = rejected.len(), "expired fraud reviews rejected");
        }
        Ok(Outcome::new(rejected, effects))
    }

    /// A fraud rejection on any of the user's profiles keeps them out of the
    /// flow.
    pub fn blocks_new_attempts(&self, user: UserId) -> Result<bool, ResolutionError> {
        Ok(self
            .store
            .profiles_for_user(user)?
            .iter()
            .any(Profile::fraud_rejected))
    }

    fn last_action(
        &self,
        profile_id: ProfileId,
    ) -> Result<Option<FraudReviewAction>, ResolutionError> {
        Ok(self
            .store
            .fraud_reviews_for_profile(profile_id)?
            .last()
            .map(|r| r.action))
    }
}
