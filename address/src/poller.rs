//! Periodic status check of pending in-person enrollments.

use std::collections::BTreeMap;
use std::sync::Arc;

use idv_store::{update_enrollment_with, update_profile_with, IdvStore};
use idv_types::{
    AddressCheck, Clock, DeactivationReason, Effect, EnrollmentStatus, FraudReviewAction,
    FraudReviewRecord, IdvEvent, IdvParams, InPersonEnrollment, Notification, Profile, ProfileId,
    ProofingComponents, TypesError,
};
use idv_utils::{Classify, ErrorClass, StatsCounter};
use idv_vendors::{InPersonProofer, UspsStatus};

use crate::in_person::{cancel_profile, finish_enrollment};
use crate::AddressError;

/// Counter names reported by every run.
pub const POLL_OUTCOMES: &[&str] = &[
    "checked",
    "errored",
    "network_error",
    "expired",
    "failed",
    "cancelled",
    "in_progress",
    "passed",
];

/// What one run changed.
#[derive(Debug, Default)]
pub struct PollSummary {
    /// Profiles whose in-person marker cleared on a passed visit. They may
    /// still be pending for another reason.
    pub passed: Vec<ProfileId>,
    /// Profiles that can no longer complete.
    pub closed: Vec<ProfileId>,
    pub effects: Vec<Effect>,
    /// Outcome counts for this run, keyed by [`POLL_OUTCOMES`].
    pub stats: BTreeMap<&'static str, u64>,
}

pub struct InPersonStatusPoller {
    store: Arc<dyn IdvStore>,
    proofer: Arc<dyn InPersonProofer>,
    clock: Arc<dyn Clock>,
    validity_secs: u64,
}

impl InPersonStatusPoller {
    pub fn new(
        store: Arc<dyn IdvStore>,
        proofer: Arc<dyn InPersonProofer>,
        clock: Arc<dyn Clock>,
        params: &IdvParams,
    ) -> Self {
        Self {
            store,
            proofer,
            clock,
            validity_secs: params.in_person_enrollment_validity_secs(),
        }
    }

    /// Check every pending enrollment once. A provider error on one
    /// enrollment is counted and does not stop the run.
    pub async fn run_once(&self) -> Result<PollSummary, AddressError> {
        let stats = StatsCounter::new(POLL_OUTCOMES);
        let mut summary = PollSummary::default();
        let pending = self.store.pending_enrollments()?;
        tracing::debug!(count = pending.len(), "polling in-person enrollments");

        for enrollment in pending {
            stats.increment("checked");
            let id = enrollment.id;
            match self.check(enrollment, &mut summary).await {
                Ok(outcome) => stats.increment(outcome),
                Err(error) => {
                    stats.increment("errored");
                    tracing::error!(enrollment_id = %id, %error, "in-person status check failed");
                }
            }
        }
        tracing::info!(%stats, "in-person poll finished");
        summary.stats = stats.snapshot();
        Ok(summary)
    }

    async fn check(
        &self,
        enrollment: InPersonEnrollment,
        summary: &mut PollSummary,
    ) -> Result<&'static str, AddressError> {
        let now = self.clock.now();
        let store = self.store.as_ref();
        let enrollment = update_enrollment_with(store, enrollment.id, |e| {
            e.status_check_attempted_at = Some(now);
            true
        })?;
        let profile = store.get_profile(enrollment.profile_id)?;

        let effects = &mut summary.effects;

        if profile.deactivation_reason == DeactivationReason::EncryptionError {
            finish_enrollment(store, enrollment.id, EnrollmentStatus::Cancelled, now, effects)?;
            cancel_profile(store, profile.id, effects)?;
            summary.closed.push(profile.id);
            return Ok("cancelled");
        }

        let result = match self
            .proofer
            .request_proofing_results(&enrollment.unique_id, &enrollment.enrollment_code)
            .await
        {
            Ok(result) => result,
            Err(error) if error.class() == ErrorClass::Transient => {
                tracing::warn!(enrollment_id = %enrollment.id, %error, "in-person provider unreachable");
                return Ok("network_error");
            }
            Err(error) => return Err(error.into()),
        };

        let status = match result.status {
            UspsStatus::InProgress if enrollment.has_expired(self.validity_secs, now) => {
                UspsStatus::Expired
            }
            status => status,
        };

        Ok(match status {
            UspsStatus::InProgress => {
                update_enrollment_with(store, enrollment.id, |e| {
                    e.status_check_completed_at = Some(now);
                    true
                })?;
                "in_progress"
            }
            UspsStatus::Passed => {
                finish_enrollment(store, enrollment.id, EnrollmentStatus::Passed, now, effects)?;
                self.pass_profile(profile.id)?;
                effects.push(Effect::notify(profile.user_id, Notification::InPersonVerified));
                summary.passed.push(profile.id);
                "passed"
            }
            UspsStatus::Failed { fraud_suspected } => {
                tracing::info!(profile_id = %profile.id, fraud_suspected, "in-person visit failed");
                finish_enrollment(store, enrollment.id, EnrollmentStatus::Failed, now, effects)?;
                cancel_profile(store, profile.id, effects)?;
                effects.push(Effect::notify(profile.user_id, Notification::InPersonFailed));
                summary.closed.push(profile.id);
                "failed"
            }
            UspsStatus::Expired => {
                finish_enrollment(store, enrollment.id, EnrollmentStatus::Expired, now, effects)?;
                if profile.fraud_review_pending() {
                    self.reject_during_review(&profile, effects)?;
                } else {
                    cancel_profile(store, profile.id, effects)?;
                }
                summary.closed.push(profile.id);
                "expired"
            }
        })
    }

    /// Clear the in-person marker and record the address check. A fraud
    /// review hold stays in place.
    fn pass_profile(&self, profile_id: ProfileId) -> Result<Profile, AddressError> {
        let in_person = ProofingComponents {
            address_check: Some(AddressCheck::InPerson),
            ..ProofingComponents::default()
        };
        let mut conflict: Option<TypesError> = None;
        let profile = update_profile_with(self.store.as_ref(), profile_id, |p| {
            if let Err(e) = p.proofing_components.merge(&in_person) {
                conflict = Some(e);
                return false;
            }
            p.in_person_verification_pending_at = None;
            if p.deactivation_reason == DeactivationReason::InPersonVerificationPending {
                p.deactivation_reason = DeactivationReason::None;
            }
            true
        })?;
        match conflict {
            Some(e) => Err(e.into()),
            None => Ok(profile),
        }
    }

    /// The visit window closed while the profile was held for fraud review.
    fn reject_during_review(
        &self,
        profile: &Profile,
        effects: &mut Vec<Effect>,
    ) -> Result<(), AddressError> {
        let now = self.clock.now();
        update_profile_with(self.store.as_ref(), profile.id, |p| {
            p.in_person_verification_pending_at = None;
            p.fraud_review_pending_at = None;
            p.fraud_rejection_at = Some(now);
            p.deactivation_reason = p
                .deactivation_reason
                .escalate(DeactivationReason::FraudRejection);
            true
        })?;
        self.store.append_fraud_review(&FraudReviewRecord {
            profile_id: profile.id,
            action: FraudReviewAction::AutoRejected,
            operator_reason: Some("in_person_enrollment_expired".into()),
            at: now,
        })?;
        tracing::info!(profile_id = %profile.id, "fraud rejected after in-person expiry");
        effects.push(
            IdvEvent::FraudReview {
                profile_id: profile.id,
                action: FraudReviewAction::AutoRejected,
            }
            .into(),
        );
        effects.push(Effect::notify(profile.user_id, Notification::FraudRejected));
        Ok(())
    }
}
