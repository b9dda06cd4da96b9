//! Fraud review, activation and password-reset flows against the in-memory store.

use std::sync::Arc;

use idv_crypto::{normalize_code, open_with_password, seal_with_password, RandomSource};
use idv_nullables::{NullClock, NullRandom, NullStore};
use idv_ratelimit::RateLimiter;
use idv_resolution::{
    AttemptFence, Fence, FinalResolutionEngine, FraudReviewGate, FraudStatus,
    PasswordResetHandler, ProfileDecision, Rejection, ResolutionError,
};
use idv_store::{AttemptStore, AuditStore, EnrollmentStore, IdvStore, ProfileStore, UserStore};
use idv_types::{
    Attempt, AttemptId, AttemptStatus, Clock, DeactivationReason, Effect, EnrollmentId, EnrollmentStatus,
    FraudPendingReason, FraudReviewAction, IdvEvent, IdvParams, InPersonEnrollment, Notification,
    Profile, ProfileId, ProfileState, ProofingComponents, ProofingResult, RateLimitTable,
    Timestamp, User, UserId,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const USER: UserId = UserId::new(7);
const ATTEMPT: AttemptId = AttemptId::new([4; 16]);
const PROFILE: ProfileId = ProfileId::new(70);
const PERSONAL_KEY: &str = "ABCD-EFGH-JKMN-PQRS";
const PII: &[u8] = br#"{"first_name":"Fakey","ssn":"900123456"}"#;

struct Harness {
    store: Arc<NullStore>,
    clock: Arc<NullClock>,
    rng: Arc<dyn RandomSource>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(NullStore::new());
        store.put_user(&User::new(USER, Timestamp::new(1))).unwrap();
        Self {
            store,
            clock: Arc::new(NullClock::new(50_000)),
            rng: Arc::new(NullRandom::new(3)),
        }
    }

    fn dyn_store(&self) -> Arc<dyn IdvStore> {
        self.store.clone()
    }

    fn engine(&self) -> FinalResolutionEngine {
        FinalResolutionEngine::new(self.dyn_store(), self.clock.clone())
    }

    fn gate(&self) -> FraudReviewGate {
        FraudReviewGate::new(self.dyn_store(), self.clock.clone(), self.rng.clone(), &IdvParams::default())
    }

    fn password(&self) -> PasswordResetHandler {
        PasswordResetHandler::new(
            self.dyn_store(),
            RateLimiter::new(self.dyn_store(), RateLimitTable::default()),
            self.clock.clone(),
            self.rng.clone(),
        )
    }

    /// A profile sealed under "hunter2" with a recovery copy under the personal key.
    fn profile(&self, id: ProfileId) -> Profile {
        let epoch = self.store.get_user(USER).unwrap().password_epoch;
        let mut profile = Profile::new(id, USER, ATTEMPT, ProofingComponents::default(), epoch, self.clock.now());
        profile.encrypted_pii = Some(seal_with_password(PII, b"hunter2", self.rng.as_ref()).unwrap());
        profile.encrypted_pii_recovery =
            Some(seal_with_password(PII, normalize_code(PERSONAL_KEY).as_bytes(), self.rng.as_ref()).unwrap());
        self.store.insert_profile(&profile).unwrap();
        profile
    }

    fn active_profile(&self, id: ProfileId) -> Profile {
        self.profile(id);
        self.engine().apply(id, ProfileDecision::Active).unwrap().value
    }

    fn reload(&self, id: ProfileId) -> Profile {
        self.store.get_profile(id).unwrap()
    }
}

fn notified(effects: &[Effect], notification: Notification) -> bool {
    effects.iter().any(|e| matches!(e, Effect::Notify { notification: n, .. } if *n == notification))
}

fn audit_actions(h: &Harness, id: ProfileId) -> Vec<FraudReviewAction> {
    h.store
        .fraud_reviews_for_profile(id)
        .unwrap()
        .into_iter()
        .map(|r| r.action)
        .collect()
}

// ---------------------------------------------------------------------------
// Fraud review
// ---------------------------------------------------------------------------

#[test]
fn passed_review_activates() {
    let h = Harness::new();
    h.profile(PROFILE);
    let gate = h.gate();
    gate.hold(PROFILE, FraudPendingReason::ThreatmetrixReview).unwrap();
    assert_eq!(
        h.reload(PROFILE).state(),
        ProfileState::Pending(vec![idv_types::PendingReason::FraudReviewPending])
    );

    h.clock.advance_days(3);
    let out = gate.pass(PROFILE, "documents look fine").unwrap();
    assert!(out.value.active);
    assert!(notified(&out.effects, Notification::FraudReviewPassed));
    assert!(notified(&out.effects, Notification::AccountVerified));
    assert_eq!(audit_actions(&h, PROFILE), vec![FraudReviewAction::Held, FraudReviewAction::Passed]);

    // Repeating the pass writes nothing.
    let again = gate.pass(PROFILE, "documents look fine").unwrap();
    assert!(again.effects.is_empty());
    assert_eq!(audit_actions(&h, PROFILE).len(), 2);
}

#[test]
fn rejected_review_blocks_new_attempts() {
    let h = Harness::new();
    h.profile(PROFILE);
    let gate = h.gate();
    gate.hold(PROFILE, FraudPendingReason::ThreatmetrixReject).unwrap();
    assert!(!gate.blocks_new_attempts(USER).unwrap());

    let out = gate.reject(PROFILE, "synthetic identity").unwrap();
    assert_eq!(out.value.state(), ProfileState::FraudRejected);
    assert_eq!(out.value.deactivation_reason, DeactivationReason::FraudRejection);
    assert!(notified(&out.effects, Notification::FraudRejected));
    assert!(gate.blocks_new_attempts(USER).unwrap());

    assert!(gate.reject(PROFILE, "synthetic identity").unwrap().effects.is_empty());
    assert_eq!(audit_actions(&h, PROFILE), vec![FraudReviewAction::Held, FraudReviewAction::Rejected]);
}

#[test]
fn review_actions_refused_after_window() {
    let h = Harness::new();
    h.profile(PROFILE);
    let gate = h.gate();
    gate.hold(PROFILE, FraudPendingReason::ThreatmetrixReview).unwrap();
    h.clock.advance_days(IdvParams::default().fraud_review_window_days);

    let err = gate.pass(PROFILE, "late").unwrap_err();
    assert!(matches!(err, ResolutionError::ReviewWindowExpired { profile, .. } if profile == PROFILE));
    assert!(matches!(gate.reject(PROFILE, "late").unwrap_err(), ResolutionError::ReviewWindowExpired { .. }));
}

#[test]
fn pass_without_hold_is_refused() {
    let h = Harness::new();
    h.profile(PROFILE);
    let err = h.gate().pass(PROFILE, "nothing to review").unwrap_err();
    assert!(matches!(err, ResolutionError::NotUnderReview(id) if id == PROFILE));
}

#[test]
fn sweep_rejects_only_expired_holds() {
    let h = Harness::new();
    h.profile(PROFILE);
    h.profile(ProfileId::new(71));
    let gate = h.gate();
    gate.hold(PROFILE, FraudPendingReason::ThreatmetrixReview).unwrap();
    h.clock.advance_days(20);
    gate.hold(ProfileId::new(71), FraudPendingReason::ThreatmetrixReview).unwrap();
    h.clock.advance_days(10);

    let swept = gate.sweep_expired().unwrap();
    assert_eq!(swept.value, vec![PROFILE]);
    assert!(h.reload(PROFILE).fraud_rejected());
    assert!(h.reload(ProfileId::new(71)).fraud_review_pending());
    assert_eq!(audit_actions(&h, PROFILE).last(), Some(&FraudReviewAction::AutoRejected));

    assert!(gate.sweep_expired().unwrap().value.is_empty());
}

#[test]
fn reversed_rejection_unblocks_without_reactivating() {
    let h = Harness::new();
    h.profile(PROFILE);
    let gate = h.gate();
    gate.hold(PROFILE, FraudPendingReason::ThreatmetrixReview).unwrap();
    gate.reject(PROFILE, "mistaken").unwrap();

    let out = gate.reverse_rejection(PROFILE, "operator error").unwrap();
    assert!(!out.value.active);
    assert!(!out.value.fraud_rejected());
    assert_eq!(out.value.deactivation_reason, DeactivationReason::VerificationCancelled);
    assert!(!gate.blocks_new_attempts(USER).unwrap());
    assert!(matches!(
        gate.reverse_rejection(PROFILE, "again").unwrap_err(),
        ResolutionError::NotRejected(_)
    ));
}

#[test]
fn hard_reject_without_profile_still_blocks() {
    let h = Harness::new();
    let gate = h.gate();
    let out = gate.reject_attempt(USER, ATTEMPT, ProofingComponents::default()).unwrap();
    assert!(out.value.fraud_rejected());
    assert!(gate.blocks_new_attempts(USER).unwrap());
}

#[test]
fn hold_leaves_earlier_active_profile_alone() {
    let h = Harness::new();
    let old = h.active_profile(ProfileId::new(60));
    h.profile(PROFILE);
    h.gate().hold(PROFILE, FraudPendingReason::ThreatmetrixReview).unwrap();
    assert!(h.reload(old.id).active);
}

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

#[test]
fn activation_supersedes_previous_active_profile() {
    let h = Harness::new();
    h.active_profile(ProfileId::new(60));
    h.profile(PROFILE);

    let out = h.engine().apply(PROFILE, ProfileDecision::Active).unwrap();
    assert!(out.value.active);
    assert!(out.effects.contains(&Effect::Event(IdvEvent::ProfileActivated {
        profile_id: PROFILE,
        superseded: 1,
    })));
    let old = h.reload(ProfileId::new(60));
    assert!(!old.active);
    assert_eq!(old.deactivation_reason, DeactivationReason::Superseded);
    assert_eq!(h.store.active_profile(USER).unwrap().map(|p| p.id), Some(PROFILE));
}

#[test]
fn activation_after_password_change_is_encryption_error() {
    let h = Harness::new();
    h.profile(PROFILE);
    h.store.bump_password_epoch(USER, Timestamp::new(50_001)).unwrap();

    let out = h.engine().apply(PROFILE, ProfileDecision::Active).unwrap();
    assert!(!out.value.active);
    assert_eq!(out.value.deactivation_reason, DeactivationReason::EncryptionError);
    assert!(h.store.active_profile(USER).unwrap().is_none());
}

#[test]
fn pending_address_cannot_be_activated() {
    let h = Harness::new();
    let mut profile = h.profile(PROFILE);
    profile.gpo_verification_pending_at = Some(Timestamp::new(50_000));
    profile.deactivation_reason = DeactivationReason::GpoVerificationPending;
    h.store.update_profile(&profile).unwrap();

    assert_eq!(
        FinalResolutionEngine::reassess(&h.reload(PROFILE)),
        ProfileDecision::Pending(idv_types::PendingReason::GpoVerificationPending)
    );
    let err = h.engine().apply(PROFILE, ProfileDecision::Active).unwrap_err();
    assert!(matches!(err, ResolutionError::NotActivatable { .. }));
}

#[test]
fn failed_proofing_closes_as_cancelled() {
    let h = Harness::new();
    h.profile(PROFILE);
    let out = h
        .engine()
        .apply(PROFILE, ProfileDecision::Rejected(Rejection::ProofingFailed))
        .unwrap();
    assert_eq!(out.value.deactivation_reason, DeactivationReason::VerificationCancelled);
    assert_eq!(
        FinalResolutionEngine::reassess(&out.value),
        ProfileDecision::Rejected(Rejection::Closed(DeactivationReason::VerificationCancelled))
    );
}

#[test]
fn evaluate_reads_device_fraud_signals() {
    let mut result = ProofingResult::service_unavailable(ATTEMPT, vec![], Timestamp::new(1));
    assert_eq!(FraudReviewGate::evaluate(&result), FraudStatus::Clear);
    result.fraud_review_pending_reason = Some(FraudPendingReason::ThreatmetrixReview);
    assert_eq!(
        FraudReviewGate::evaluate(&result),
        FraudStatus::Pending(FraudPendingReason::ThreatmetrixReview)
    );
    result.device_fraud_hard_reject = true;
    assert_eq!(FraudReviewGate::evaluate(&result), FraudStatus::Reject);
}

// ---------------------------------------------------------------------------
// Password reset
// ---------------------------------------------------------------------------

#[test]
fn reset_during_in_person_closes_profile_for_good() {
    let h = Harness::new();
    let mut profile = h.profile(PROFILE);
    profile.in_person_verification_pending_at = Some(Timestamp::new(50_000));
    profile.deactivation_reason = DeactivationReason::InPersonVerificationPending;
    h.store.update_profile(&profile).unwrap();
    let enrollment = InPersonEnrollment::new(
        EnrollmentId::new(5),
        USER,
        PROFILE,
        "1234567890123456".into(),
        "abcdef012345678901".into(),
        Timestamp::new(50_000),
    );
    h.store.insert_enrollment(&enrollment).unwrap();

    let out = h.password().on_password_reset(USER).unwrap();
    assert_eq!(out.value, vec![PROFILE]);
    assert_eq!(h.reload(PROFILE).deactivation_reason, DeactivationReason::EncryptionError);
    assert_eq!(
        h.store.get_enrollment(EnrollmentId::new(5)).unwrap().status,
        EnrollmentStatus::Cancelled
    );

    // A visit result arriving later cannot bring it back.
    assert!(h.engine().apply(PROFILE, ProfileDecision::Active).is_err());
    assert_eq!(
        FinalResolutionEngine::reassess(&h.reload(PROFILE)),
        ProfileDecision::Rejected(Rejection::Closed(DeactivationReason::EncryptionError))
    );
    assert!(h.password().restore_with_personal_key(USER, PERSONAL_KEY, b"new").is_err());
}

#[test]
fn reset_racing_a_passed_visit_still_closes_profile() {
    let h = Harness::new();
    let mut profile = h.profile(PROFILE);
    profile.in_person_verification_pending_at = Some(Timestamp::new(50_000));
    profile.deactivation_reason = DeactivationReason::InPersonVerificationPending;
    h.store.update_profile(&profile).unwrap();

    // The status poller clears the visit marker between the reset's read and
    // its write.
    h.store.interleave_profile_write(|p| {
        p.in_person_verification_pending_at = None;
        p.deactivation_reason = DeactivationReason::None;
        p.verified_at = Some(Timestamp::new(50_001));
    });
    let out = h.password().on_password_reset(USER).unwrap();
    assert_eq!(out.value, vec![PROFILE]);

    let closed = h.reload(PROFILE);
    assert!(!closed.active);
    assert_eq!(closed.in_person_verification_pending_at, None);
    assert_eq!(closed.deactivation_reason, DeactivationReason::EncryptionError);
    assert!(h.engine().apply(PROFILE, ProfileDecision::Active).is_err());
    assert_eq!(h.store.active_count(USER), 0);
}

#[test]
fn reset_during_mailed_code_wait_closes_profile() {
    let h = Harness::new();
    let mut profile = h.profile(PROFILE);
    profile.gpo_verification_pending_at = Some(Timestamp::new(50_000));
    profile.deactivation_reason = DeactivationReason::GpoVerificationPending;
    h.store.update_profile(&profile).unwrap();

    let out = h.password().on_password_reset(USER).unwrap();
    assert_eq!(out.value, vec![PROFILE]);
    assert_eq!(h.reload(PROFILE).deactivation_reason, DeactivationReason::EncryptionError);
    assert!(h.engine().apply(PROFILE, ProfileDecision::Active).is_err());
}

#[test]
fn reset_on_active_profile_restores_with_personal_key() {
    let h = Harness::new();
    h.active_profile(PROFILE);

    let out = h.password().on_password_reset(USER).unwrap();
    assert_eq!(out.value, vec![PROFILE]);
    let reset = h.reload(PROFILE);
    assert!(!reset.active);
    assert_eq!(reset.deactivation_reason, DeactivationReason::PasswordReset);

    // A second reset before restoring leaves it recoverable.
    assert!(h.password().on_password_reset(USER).unwrap().value.is_empty());

    let err = h
        .password()
        .restore_with_personal_key(USER, "WXYZ-WXYZ-WXYZ-WXYZ", b"correct horse")
        .unwrap_err();
    assert!(matches!(err, ResolutionError::PersonalKeyMismatch { remaining: 4 }));

    let restored = h
        .password()
        .restore_with_personal_key(USER, "abcd efgh jkmn pqrs", b"correct horse")
        .unwrap();
    assert!(restored.value.active);
    assert_eq!(restored.value.deactivation_reason, DeactivationReason::None);
    assert_eq!(restored.value.pii_key_epoch, h.store.get_user(USER).unwrap().password_epoch);
    let sealed = restored.value.encrypted_pii.as_ref().unwrap();
    assert_eq!(open_with_password(sealed, b"correct horse").unwrap().as_slice(), PII);
}

#[test]
fn restore_without_reset_profile_is_refused() {
    let h = Harness::new();
    h.profile(PROFILE);
    let err = h
        .password()
        .restore_with_personal_key(USER, PERSONAL_KEY, b"whatever")
        .unwrap_err();
    assert!(matches!(err, ResolutionError::NothingToRestore(u) if u == USER));
}

#[test]
fn reset_leaves_fraud_rejected_profile_alone() {
    let h = Harness::new();
    h.profile(PROFILE);
    let gate = h.gate();
    gate.hold(PROFILE, FraudPendingReason::ThreatmetrixReview).unwrap();
    gate.reject(PROFILE, "fraud").unwrap();

    assert!(h.password().on_password_reset(USER).unwrap().value.is_empty());
    assert_eq!(h.reload(PROFILE).deactivation_reason, DeactivationReason::FraudRejection);
}

// ---------------------------------------------------------------------------
// Fencing
// ---------------------------------------------------------------------------

#[test]
fn results_for_replaced_attempts_are_stale() {
    let h = Harness::new();
    let fence = AttemptFence::new(h.dyn_store());
    let old = Attempt::new(ATTEMPT, USER, Timestamp::new(100));
    let new = Attempt::new(AttemptId::new([5; 16]), USER, Timestamp::new(200));
    h.store.put_attempt(&old).unwrap();
    h.store.put_attempt(&new).unwrap();
    h.store.set_current_attempt(USER, Some(new.id)).unwrap();

    assert_eq!(fence.check(USER, ATTEMPT).unwrap(), Fence::Stale { reason: "not_current_attempt" });
    assert!(fence.check(USER, new.id).unwrap().is_current());

    let early = ProofingResult::service_unavailable(new.id, vec![], Timestamp::new(150));
    assert_eq!(
        fence.check_result(USER, &early).unwrap(),
        Fence::Stale { reason: "result_predates_attempt" }
    );

    let mut abandoned = new.clone();
    abandoned.status = AttemptStatus::Abandoned;
    h.store.put_attempt(&abandoned).unwrap();
    let fenced = fence.check(USER, new.id).unwrap();
    assert_eq!(fenced, Fence::Stale { reason: "attempt_abandoned" });
    assert!(fenced.discard_event(new.id).is_some());
}
