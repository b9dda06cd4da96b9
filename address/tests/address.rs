//! Address confirmation strategies against the in-memory store and mock vendors.

use std::sync::Arc;
use std::time::Duration;

use idv_address::{
    AddressConfirmation, AddressError, AddressStatus, AddressSubject, GpoCheck, GpoConfirmation,
    InPersonConfirmation, InPersonStatusPoller, InitiateParams, OtpCheck, PendingToken,
    PhoneConfirmation,
};
use idv_crypto::{Fingerprinter, RandomSource};
use idv_nullables::{NullClock, NullRandom, NullStore};
use idv_ratelimit::RateLimiter;
use idv_store::{AuditStore, EnrollmentStore, GpoCodeStore, IdvStore, ProfileStore, UserStore};
use idv_types::{
    Address, AddressCheck, Applicant, AttemptId, CheckKind, DeactivationReason, DocumentPii,
    DocumentType, Effect, EnrollmentStatus, FraudReviewAction, IdvParams, Notification,
    OtpDelivery, PendingReason, Profile, ProfileId, ProfileState, ProofingComponents,
    RateLimitTable, RateLimitType, Ssn, Timestamp, User, UserId,
};
use idv_utils::RetryPolicy;
use idv_vendors::mock::{MockClient, MockInPersonProofer, MockTelephony, FAILING_PHONE_SUFFIX};
use idv_vendors::{CheckRequest, GuardedClient, ServiceStatus, UspsStatus, VendorError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const USER: UserId = UserId::new(1);
const ATTEMPT: AttemptId = AttemptId::new([3; 16]);
const PROFILE: ProfileId = ProfileId::new(40);
const PHONE: &str = "+12025550100";
const WRONG_CODE: &str = "XYZXYZ";

struct Harness {
    store: Arc<NullStore>,
    clock: Arc<NullClock>,
    rng: Arc<dyn RandomSource>,
    fingerprinter: Arc<Fingerprinter>,
    status: Arc<ServiceStatus>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(NullStore::new());
        store.put_user(&User::new(USER, Timestamp::new(1_000))).unwrap();
        Self {
            store,
            clock: Arc::new(NullClock::new(10_000)),
            rng: Arc::new(NullRandom::new(99)),
            fingerprinter: Arc::new(Fingerprinter::new(b"address-test-fingerprint-key").unwrap()),
            status: Arc::new(ServiceStatus::default()),
        }
    }

    fn dyn_store(&self) -> Arc<dyn IdvStore> {
        self.store.clone()
    }

    fn limiter(&self) -> RateLimiter {
        RateLimiter::new(self.dyn_store(), RateLimitTable::default())
    }

    fn profile(&self) -> Profile {
        let profile = Profile::new(
            PROFILE,
            USER,
            ATTEMPT,
            ProofingComponents::default(),
            0,
            Timestamp::new(10_000),
        );
        self.store.insert_profile(&profile).unwrap();
        profile
    }

    fn phone(&self, telephony: Arc<MockTelephony>) -> PhoneConfirmation {
        let finder = GuardedClient::new(
            Arc::new(MockClient::new(CheckKind::AddressCheck)),
            Duration::from_secs(1),
            RetryPolicy::once(),
        );
        PhoneConfirmation::new(
            self.dyn_store(),
            self.limiter(),
            telephony,
            finder,
            self.status.clone(),
            self.fingerprinter.clone(),
            self.rng.clone(),
            self.clock.clone(),
            &IdvParams::default(),
        )
    }

    fn gpo(&self) -> GpoConfirmation {
        GpoConfirmation::new(
            self.dyn_store(),
            self.limiter(),
            self.fingerprinter.clone(),
            self.rng.clone(),
            self.clock.clone(),
            &IdvParams::default(),
        )
    }

    fn in_person(&self, proofer: Arc<MockInPersonProofer>) -> InPersonConfirmation {
        InPersonConfirmation::new(
            self.dyn_store(),
            proofer,
            self.status.clone(),
            self.rng.clone(),
            self.clock.clone(),
            &IdvParams::default(),
        )
    }

    fn poller(&self, proofer: Arc<MockInPersonProofer>) -> InPersonStatusPoller {
        InPersonStatusPoller::new(self.dyn_store(), proofer, self.clock.clone(), &IdvParams::default())
    }
}

fn subject(profile_id: Option<ProfileId>) -> AddressSubject {
    AddressSubject {
        user_id: USER,
        attempt_id: ATTEMPT,
        profile_id,
    }
}

fn applicant() -> Applicant {
    Applicant {
        document: DocumentPii {
            first_name: "Fakey".into(),
            last_name: "McFakerson".into(),
            dob: "1938-10-06".into(),
            address: Address {
                address1: "1 Fake Rd".into(),
                address2: None,
                city: "Great Falls".into(),
                state: "MT".into(),
                zipcode: "59010".into(),
            },
            id_number: "1111111111111".into(),
            id_jurisdiction: "ND".into(),
            document_type: DocumentType::StateId,
        },
        ssn: Ssn::new("900123456"),
        phone: None,
    }
}

fn request() -> CheckRequest {
    CheckRequest {
        attempt_id: ATTEMPT,
        applicant: applicant(),
        threatmetrix_session_id: None,
        request_ip: None,
    }
}

fn letter_code(effects: &[Effect]) -> String {
    effects
        .iter()
        .find_map(|e| match e {
            Effect::Notify {
                notification: Notification::GpoLetter { code },
                ..
            } => Some(code.clone()),
            _ => None,
        })
        .expect("letter notification")
}

// ---------------------------------------------------------------------------
// Phone
// ---------------------------------------------------------------------------

#[tokio::test]
async fn phone_otp_confirms_with_sent_code() {
    let h = Harness::new();
    let telephony = Arc::new(MockTelephony::new());
    let phone = h.phone(telephony.clone());

    let sent = phone
        .send_otp(&subject(None), PHONE, OtpDelivery::Sms, request())
        .await
        .unwrap();
    assert!(matches!(sent.value, PendingToken::OtpSent { remaining: 9, .. }));
    assert_eq!(phone.status(&subject(None)).unwrap(), AddressStatus::Pending);

    let code = telephony.last_code().unwrap();
    let checked = phone.verify_otp(&subject(None), &code).unwrap();
    assert!(matches!(checked.value, OtpCheck::Confirmed { .. }));
    assert_eq!(phone.status(&subject(None)).unwrap(), AddressStatus::Verified);
}

#[tokio::test]
async fn five_misses_lock_out_verify_and_send() {
    let h = Harness::new();
    let telephony = Arc::new(MockTelephony::new());
    let phone = h.phone(telephony.clone());
    phone
        .send_otp(&subject(None), PHONE, OtpDelivery::Sms, request())
        .await
        .unwrap();

    for expected in (0..5).rev() {
        let miss = phone.verify_otp(&subject(None), WRONG_CODE).unwrap();
        assert_eq!(miss.value, OtpCheck::Incorrect { remaining: expected });
    }

    let code = telephony.last_code().unwrap();
    let err = phone.verify_otp(&subject(None), &code).unwrap_err();
    assert!(matches!(
        err,
        AddressError::RateLimited {
            kind: RateLimitType::PhoneConfirmation,
            ..
        }
    ));
    let err = phone
        .send_otp(&subject(None), PHONE, OtpDelivery::Sms, request())
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(telephony.sent().len(), 1);
    assert_eq!(phone.status(&subject(None)).unwrap(), AddressStatus::Failed);
}

#[tokio::test]
async fn expired_otp_is_refused() {
    let h = Harness::new();
    let telephony = Arc::new(MockTelephony::new());
    let phone = h.phone(telephony.clone());
    phone
        .send_otp(&subject(None), PHONE, OtpDelivery::Voice, request())
        .await
        .unwrap();

    h.clock.advance(IdvParams::default().otp_validity_secs);
    let code = telephony.last_code().unwrap();
    let err = phone.verify_otp(&subject(None), &code).unwrap_err();
    assert!(matches!(err, AddressError::CodeExpired));
}

#[tokio::test]
async fn unowned_phone_is_refused_before_sending() {
    let h = Harness::new();
    let telephony = Arc::new(MockTelephony::new());
    let phone = h.phone(telephony.clone());
    let number = format!("+1202{FAILING_PHONE_SUFFIX}");

    let err = phone
        .send_otp(&subject(None), &number, OtpDelivery::Sms, request())
        .await
        .unwrap_err();
    assert!(matches!(err, AddressError::PhoneNotVerified(_)));
    assert!(telephony.sent().is_empty());
}

#[tokio::test]
async fn delivery_outage_refuses_send() {
    let h = Harness::new();
    h.status.set_delivery_outage(OtpDelivery::Sms, true);
    let phone = h.phone(Arc::new(MockTelephony::new()));
    let err = phone
        .send_otp(&subject(None), PHONE, OtpDelivery::Sms, request())
        .await
        .unwrap_err();
    assert!(matches!(err, AddressError::DeliveryUnavailable(OtpDelivery::Sms)));
}

// ---------------------------------------------------------------------------
// GPO
// ---------------------------------------------------------------------------

#[tokio::test]
async fn letter_puts_profile_pending_and_code_confirms() {
    let h = Harness::new();
    h.profile();
    let gpo = h.gpo();

    let queued = gpo
        .initiate(&subject(Some(PROFILE)), InitiateParams::Gpo)
        .await
        .unwrap();
    let code = letter_code(&queued.effects);
    let pending = h.store.get_profile(PROFILE).unwrap();
    assert_eq!(
        pending.state(),
        ProfileState::Pending(vec![PendingReason::GpoVerificationPending])
    );
    assert_eq!(
        pending.deactivation_reason,
        DeactivationReason::GpoVerificationPending
    );

    let checked = gpo.verify_code(PROFILE, &code.to_lowercase()).unwrap();
    let GpoCheck::Verified(profile) = checked.value else {
        panic!("expected the code to confirm");
    };
    assert!(!profile.gpo_verification_pending());
    assert!(!profile.active);
    assert_eq!(profile.deactivation_reason, DeactivationReason::None);
    assert_eq!(
        profile.proofing_components.address_check,
        Some(AddressCheck::GpoLetter)
    );
    assert!(h.store.gpo_codes_for_profile(PROFILE).unwrap().is_empty());
    assert_eq!(
        gpo.status(&subject(Some(PROFILE))).unwrap(),
        AddressStatus::Verified
    );
}

#[tokio::test]
async fn earlier_letter_stays_valid_after_resend() {
    let h = Harness::new();
    h.profile();
    let gpo = h.gpo();

    let first = letter_code(&gpo.request_letter(PROFILE).unwrap().effects);
    h.clock.advance_days(2);
    gpo.resend(PROFILE).unwrap();
    assert_eq!(h.store.gpo_codes_for_profile(PROFILE).unwrap().len(), 2);

    let checked = gpo.verify_code(PROFILE, &first).unwrap();
    assert!(matches!(checked.value, GpoCheck::Verified(_)));
}

#[tokio::test]
async fn wrong_code_counts_against_the_limit() {
    let h = Harness::new();
    h.profile();
    let gpo = h.gpo();
    gpo.request_letter(PROFILE).unwrap();

    let checked = gpo.verify_code(PROFILE, "ZZZZZZZZZZ").unwrap();
    assert!(matches!(checked.value, GpoCheck::Incorrect { remaining: 4 }));
    assert!(h.store.get_profile(PROFILE).unwrap().gpo_verification_pending());
}

#[tokio::test]
async fn sweep_expires_profiles_without_a_live_letter() {
    let h = Harness::new();
    h.profile();
    let gpo = h.gpo();
    let code = letter_code(&gpo.request_letter(PROFILE).unwrap().effects);

    h.clock.advance_days(IdvParams::default().gpo_code_validity_days);
    let checked = gpo.verify_code(PROFILE, &code).unwrap();
    assert!(matches!(checked.value, GpoCheck::Expired));

    assert_eq!(gpo.expire_stale().unwrap(), vec![PROFILE]);
    let profile = h.store.get_profile(PROFILE).unwrap();
    assert!(!profile.gpo_verification_pending());
    assert!(profile.gpo_verification_expired_at.is_some());
    assert!(profile.reason_not_to_activate().is_some());
    assert!(gpo.expire_stale().unwrap().is_empty());
}

#[tokio::test]
async fn resend_without_pending_letter_is_refused() {
    let h = Harness::new();
    h.profile();
    let err = h.gpo().resend(PROFILE).unwrap_err();
    assert!(matches!(err, AddressError::NotPending { .. }));
}

// ---------------------------------------------------------------------------
// In-person
// ---------------------------------------------------------------------------

async fn enrolled(h: &Harness, proofer: &Arc<MockInPersonProofer>) -> String {
    h.profile();
    h.in_person(proofer.clone())
        .enroll(PROFILE, &applicant())
        .await
        .unwrap();
    h.store
        .enrollment_for_profile(PROFILE)
        .unwrap()
        .unwrap()
        .unique_id
}

#[tokio::test]
async fn enrollment_is_idempotent_while_pending() {
    let h = Harness::new();
    let proofer = Arc::new(MockInPersonProofer::new());
    enrolled(&h, &proofer).await;

    let again = h
        .in_person(proofer.clone())
        .enroll(PROFILE, &applicant())
        .await
        .unwrap();
    assert!(again.effects.is_empty());
    assert_eq!(proofer.scheduled().len(), 1);
    let PendingToken::Enrollment { enrollment_code, .. } = again.value else {
        panic!("expected an enrollment token");
    };
    assert_eq!(enrollment_code.len(), 16);
    assert!(h.store.get_profile(PROFILE).unwrap().in_person_verification_pending());
}

#[tokio::test]
async fn passed_visit_clears_marker() {
    let h = Harness::new();
    let proofer = Arc::new(MockInPersonProofer::new());
    let unique_id = enrolled(&h, &proofer).await;

    let summary = h.poller(proofer.clone()).run_once().await.unwrap();
    assert_eq!(summary.stats["in_progress"], 1);
    assert!(summary.passed.is_empty());

    proofer.set_status(&unique_id, UspsStatus::Passed);
    let summary = h.poller(proofer).run_once().await.unwrap();
    assert_eq!(summary.passed, vec![PROFILE]);
    assert_eq!(summary.stats["passed"], 1);

    let profile = h.store.get_profile(PROFILE).unwrap();
    assert!(!profile.in_person_verification_pending());
    assert_eq!(
        profile.proofing_components.address_check,
        Some(AddressCheck::InPerson)
    );
    let enrollment = h.store.enrollment_for_profile(PROFILE).unwrap().unwrap();
    assert_eq!(enrollment.status, EnrollmentStatus::Passed);
    assert!(enrollment.proofed_at.is_some());
}

#[tokio::test]
async fn passed_visit_keeps_fraud_hold() {
    let h = Harness::new();
    let proofer = Arc::new(MockInPersonProofer::new());
    let unique_id = enrolled(&h, &proofer).await;
    let mut profile = h.store.get_profile(PROFILE).unwrap();
    profile.fraud_review_pending_at = Some(Timestamp::new(10_000));
    h.store.update_profile(&profile).unwrap();

    proofer.set_status(&unique_id, UspsStatus::Passed);
    h.poller(proofer).run_once().await.unwrap();

    let profile = h.store.get_profile(PROFILE).unwrap();
    assert_eq!(
        profile.state(),
        ProfileState::Pending(vec![PendingReason::FraudReviewPending])
    );
}

#[tokio::test]
async fn encryption_error_cancels_without_asking_provider() {
    let h = Harness::new();
    let proofer = Arc::new(MockInPersonProofer::new());
    enrolled(&h, &proofer).await;
    let mut profile = h.store.get_profile(PROFILE).unwrap();
    profile.deactivation_reason = DeactivationReason::EncryptionError;
    h.store.update_profile(&profile).unwrap();

    let summary = h.poller(proofer.clone()).run_once().await.unwrap();
    assert_eq!(summary.stats["cancelled"], 1);
    assert_eq!(proofer.requests(), 0);
    let enrollment = h.store.enrollment_for_profile(PROFILE).unwrap().unwrap();
    assert_eq!(enrollment.status, EnrollmentStatus::Cancelled);
    assert_eq!(
        h.store.get_profile(PROFILE).unwrap().deactivation_reason,
        DeactivationReason::EncryptionError
    );
}

#[tokio::test]
async fn expiry_during_fraud_review_rejects() {
    let h = Harness::new();
    let proofer = Arc::new(MockInPersonProofer::new());
    let unique_id = enrolled(&h, &proofer).await;
    let mut profile = h.store.get_profile(PROFILE).unwrap();
    profile.fraud_review_pending_at = Some(Timestamp::new(10_000));
    h.store.update_profile(&profile).unwrap();

    proofer.set_status(&unique_id, UspsStatus::Expired);
    let summary = h.poller(proofer).run_once().await.unwrap();
    assert_eq!(summary.closed, vec![PROFILE]);

    let profile = h.store.get_profile(PROFILE).unwrap();
    assert_eq!(profile.state(), ProfileState::FraudRejected);
    assert!(!profile.fraud_review_pending());
    let audit = h.store.fraud_reviews_for_profile(PROFILE).unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, FraudReviewAction::AutoRejected);
}

#[tokio::test]
async fn failed_visit_cancels_verification() {
    let h = Harness::new();
    let proofer = Arc::new(MockInPersonProofer::new());
    let unique_id = enrolled(&h, &proofer).await;

    proofer.set_status(&unique_id, UspsStatus::Failed { fraud_suspected: false });
    let summary = h.poller(proofer).run_once().await.unwrap();
    assert_eq!(summary.stats["failed"], 1);
    let profile = h.store.get_profile(PROFILE).unwrap();
    assert_eq!(
        profile.state(),
        ProfileState::Deactivated(DeactivationReason::VerificationCancelled)
    );
}

#[tokio::test]
async fn provider_outage_leaves_enrollment_pending() {
    let h = Harness::new();
    let proofer = Arc::new(MockInPersonProofer::new());
    let unique_id = enrolled(&h, &proofer).await;

    proofer.set_error(&unique_id, VendorError::Network("reset".into()));
    let summary = h.poller(proofer).run_once().await.unwrap();
    assert_eq!(summary.stats["network_error"], 1);
    let enrollment = h.store.enrollment_for_profile(PROFILE).unwrap().unwrap();
    assert!(enrollment.is_pending());
    assert!(enrollment.status_check_attempted_at.is_some());
}

#[tokio::test]
async fn unvisited_enrollment_expires_after_validity_window() {
    let h = Harness::new();
    let proofer = Arc::new(MockInPersonProofer::new());
    enrolled(&h, &proofer).await;

    h.clock
        .advance_days(IdvParams::default().in_person_enrollment_validity_days);
    let summary = h.poller(proofer).run_once().await.unwrap();
    assert_eq!(summary.stats["expired"], 1);
    let enrollment = h.store.enrollment_for_profile(PROFILE).unwrap().unwrap();
    assert_eq!(enrollment.status, EnrollmentStatus::Expired);
}

#[tokio::test]
async fn user_cancel_closes_profile() {
    let h = Harness::new();
    let proofer = Arc::new(MockInPersonProofer::new());
    enrolled(&h, &proofer).await;

    let cancelled = h.in_person(proofer).cancel(PROFILE).unwrap();
    assert_eq!(cancelled.value.unwrap().status, EnrollmentStatus::Cancelled);
    let profile = h.store.get_profile(PROFILE).unwrap();
    assert!(!profile.in_person_verification_pending());
    assert_eq!(
        profile.deactivation_reason,
        DeactivationReason::VerificationCancelled
    );
}
