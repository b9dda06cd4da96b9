//! End-to-end flows through the service against mock vendors.

use std::sync::Arc;
use std::time::Duration;

use idv_address::{AddressError, PendingToken};
use idv_flow::{CancelMode, StepOutcome};
use idv_nullables::{NullClock, NullRandom, NullStore};
use idv_proofing::ExecutionMode;
use idv_resolution::ProfileDecision;
use idv_service::{
    CodeCheck, Collaborators, IdvService, Intervals, Job, Password, PhoneCheck, ProfileCreated,
    ProofingPoll, RecordingEventSink, RecordingNotifier, Scheduler, ServiceConfig, ServiceError,
    ShutdownController, StepInput, StepResponse,
};
use idv_store::{IdvStore, ProfileStore};
use idv_types::{
    Address, AddressMethod, CheckKind, Clock, DeactivationReason, DocumentPii, DocumentType, OtpDelivery,
    PendingReason, ProofingResult, Ssn, Step, UserId,
};
use idv_vendors::mock::{
    MockClient, MockInPersonProofer, MockTelephony, ScriptedClient, REJECT_SESSION, REVIEW_SESSION,
};
use idv_vendors::{UspsStatus, VendorCheckClient};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

const USER: UserId = UserId::new(42);
const PHONE: &str = "202-555-0100";

struct Harness {
    service: Arc<IdvService>,
    store: Arc<NullStore>,
    clock: Arc<NullClock>,
    telephony: Arc<MockTelephony>,
    usps: Arc<MockInPersonProofer>,
    events: Arc<RecordingEventSink>,
    notifier: Arc<RecordingNotifier>,
}

fn config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.fingerprint_secret = "11".repeat(32);
    config.server_key = "22".repeat(32);
    config.params.vendor_timeout_ms = 500;
    config.params.vendor_retry.initial_backoff_ms = 1;
    config.params.job_retry.initial_backoff_ms = 1;
    config
}

fn harness_with(config: ServiceConfig, clients: Vec<Arc<dyn VendorCheckClient>>) -> Harness {
    let store = Arc::new(NullStore::new());
    let clock = Arc::new(NullClock::new(1_000_000));
    let telephony = Arc::new(MockTelephony::new());
    let usps = Arc::new(MockInPersonProofer::new());
    let events = Arc::new(RecordingEventSink::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let service = IdvService::new(
        &config,
        store.clone() as Arc<dyn IdvStore>,
        Collaborators {
            clients,
            telephony: telephony.clone(),
            in_person: usps.clone(),
            events: events.clone(),
            notifier: notifier.clone(),
            clock: clock.clone(),
            rng: Arc::new(NullRandom::new(9)),
        },
    )
    .unwrap();
    Harness {
        service: Arc::new(service),
        store,
        clock,
        telephony,
        usps,
        events,
        notifier,
    }
}

fn harness() -> Harness {
    harness_with(config(), MockClient::all())
}

fn document() -> DocumentPii {
    DocumentPii {
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
    }
}

fn advanced(next: Step) -> StepResponse {
    StepResponse::Step(StepOutcome::Advanced { next })
}

impl Harness {
    async fn submit(&self, input: StepInput) -> StepResponse {
        self.service.submit_step(USER, input).await.unwrap()
    }

    /// Welcome through SSN.
    async fn through_ssn(&self) {
        self.service.start_attempt(USER).unwrap();
        assert_eq!(self.submit(StepInput::Welcome).await, advanced(Step::Agreement));
        assert_eq!(
            self.submit(StepInput::Agreement { accepted: true }).await,
            advanced(Step::DocumentCapture)
        );
        assert_eq!(
            self.submit(StepInput::DocumentCapture { document: document() }).await,
            advanced(Step::Ssn)
        );
        assert_eq!(
            self.submit(StepInput::Ssn { ssn: Ssn::new("900-12-3456") }).await,
            advanced(Step::VerifyInfo)
        );
    }

    async fn through_verify(&self, session: Option<&str>) {
        self.through_ssn().await;
        assert_eq!(
            self.submit(StepInput::VerifyInfo {
                threatmetrix_session_id: session.map(str::to_string),
                request_ip: Some("192.0.2.1".into()),
            })
            .await,
            advanced(Step::AddressConfirmationChoice)
        );
    }

    async fn choose(&self, method: AddressMethod) {
        let branch = method.branch();
        assert_eq!(
            self.submit(StepInput::AddressConfirmationChoice { method }).await,
            advanced(branch)
        );
        match method {
            AddressMethod::Phone => self.confirm_phone().await,
            AddressMethod::Gpo => {
                assert_eq!(self.submit(StepInput::GpoBranch).await, advanced(Step::EnterPassword));
            }
            AddressMethod::InPerson => {
                assert_eq!(
                    self.submit(StepInput::InPersonBranch).await,
                    advanced(Step::EnterPassword)
                );
            }
        }
    }

    async fn confirm_phone(&self) {
        self.service
            .send_phone_otp(USER, PHONE, OtpDelivery::Sms)
            .await
            .unwrap();
        let code = self.telephony.last_code().unwrap();
        assert_eq!(
            self.service.verify_phone_otp(USER, &code).unwrap(),
            PhoneCheck::Confirmed(StepOutcome::Advanced { next: Step::EnterPassword })
        );
    }

    async fn enter_password(&self) -> ProfileCreated {
        match self
            .submit(StepInput::EnterPassword {
                password: Password::new("correct horse battery staple"),
            })
            .await
        {
            StepResponse::ProfileCreated(created) => created,
            other => panic!("expected a profile, got {other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Address paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn phone_path_ends_with_active_profile() {
    let h = harness();
    h.through_verify(None).await;
    h.choose(AddressMethod::Phone).await;

    let created = h.enter_password().await;
    assert_eq!(created.decision, ProfileDecision::Active);
    assert_eq!(created.outcome, StepOutcome::Advanced { next: Step::PersonalKey });
    assert!(created.personal_key.is_some());
    assert_eq!(
        h.submit(StepInput::PersonalKey { acknowledged: true }).await,
        advanced(Step::Complete)
    );

    let status = h.service.profile_status(USER).unwrap();
    assert_eq!(status.active, Some(created.profile_id));
    assert!(status.pending.is_none());
    assert!(h.notifier.templates().contains(&"account_verified"));
    assert!(h.events.names().contains(&"profile_activated"));

    let profile = h.service.profile(created.profile_id).unwrap();
    assert!(profile.encrypted_pii.is_some());
    assert!(profile.encrypted_pii_recovery.is_some());
}

#[tokio::test]
async fn mailed_code_activates_pending_profile() {
    let h = harness();
    h.through_verify(None).await;
    h.choose(AddressMethod::Gpo).await;

    let created = h.enter_password().await;
    assert_eq!(
        created.decision,
        ProfileDecision::Pending(PendingReason::GpoVerificationPending)
    );
    assert!(matches!(created.pending, Some(PendingToken::LetterQueued { .. })));
    let status = h.service.profile_status(USER).unwrap();
    assert_eq!(status.active, None);
    assert_eq!(
        status.pending.unwrap().reasons,
        vec![PendingReason::GpoVerificationPending]
    );

    assert_eq!(
        h.service.verify_gpo_code(USER, "NOTTHECODE").unwrap(),
        CodeCheck::Incorrect { remaining: 4 }
    );
    let code = h.notifier.last_letter_code().unwrap();
    assert_eq!(
        h.service.verify_gpo_code(USER, &code).unwrap(),
        CodeCheck::Accepted(ProfileDecision::Active)
    );
    assert_eq!(h.service.profile_status(USER).unwrap().active, Some(created.profile_id));
}

#[tokio::test]
async fn cancelled_mail_confirmation_closes_profile() {
    let h = harness();
    h.through_verify(None).await;
    h.choose(AddressMethod::Gpo).await;
    let created = h.enter_password().await;

    assert_eq!(h.service.cancel_pending_profile(USER).unwrap(), created.profile_id);
    let profile = h.service.profile(created.profile_id).unwrap();
    assert!(!profile.active);
    assert_eq!(profile.deactivation_reason, DeactivationReason::VerificationCancelled);
    assert!(matches!(
        h.service.request_letter(USER),
        Err(ServiceError::NothingPending { .. })
    ));
}

#[tokio::test]
async fn passed_visit_activates_in_person_profile() {
    let h = harness();
    h.through_verify(None).await;
    h.choose(AddressMethod::InPerson).await;
    let created = h.enter_password().await;
    let Some(PendingToken::Enrollment { enrollment_code, .. }) = created.pending else {
        panic!("expected an enrollment");
    };
    assert_eq!(
        h.service.profile_status(USER).unwrap().pending.unwrap().enrollment_code,
        Some(enrollment_code)
    );

    let unique_id = h.usps.scheduled()[0].clone();
    let report = h.service.poll_in_person().await.unwrap();
    assert!(report.activated.is_empty());

    h.usps.set_status(&unique_id, UspsStatus::Passed);
    let report = h.service.poll_in_person().await.unwrap();
    assert_eq!(report.activated, vec![created.profile_id]);
    assert_eq!(h.service.profile_status(USER).unwrap().active, Some(created.profile_id));
}

// ---------------------------------------------------------------------------
// Fraud review
// ---------------------------------------------------------------------------

#[tokio::test]
async fn passed_review_activates_held_profile() {
    let h = harness();
    h.through_verify(Some(REVIEW_SESSION)).await;
    h.choose(AddressMethod::Phone).await;
    let created = h.enter_password().await;
    assert_eq!(
        created.decision,
        ProfileDecision::Pending(PendingReason::FraudReviewPending)
    );
    assert_eq!(h.service.profile_status(USER).unwrap().active, None);

    let profile = h.service.fraud_pass(created.profile_id, "documents match").unwrap();
    assert!(profile.active);
    assert!(h.notifier.templates().contains(&"fraud_review_passed"));
}

#[tokio::test]
async fn rejected_review_blocks_new_attempts() {
    let h = harness();
    h.through_verify(Some(REVIEW_SESSION)).await;
    h.choose(AddressMethod::Phone).await;
    let created = h.enter_password().await;

    h.service.fraud_reject(created.profile_id, "synthetic identity").unwrap();
    assert!(h.service.profile_status(USER).unwrap().fraud_rejected);
    assert!(matches!(
        h.service.start_attempt(USER),
        Err(ServiceError::FraudRejected(USER))
    ));

    h.service.fraud_reverse(created.profile_id, "appeal upheld").unwrap();
    assert!(h.service.start_attempt(USER).is_ok());
}

#[tokio::test]
async fn device_hard_reject_ends_attempt_and_blocks() {
    let h = harness();
    h.through_ssn().await;
    let response = h
        .submit(StepInput::VerifyInfo {
            threatmetrix_session_id: Some(REJECT_SESSION.into()),
            request_ip: None,
        })
        .await;
    assert_eq!(response, StepResponse::Step(StepOutcome::Rejected));
    assert!(matches!(
        h.service.start_attempt(USER),
        Err(ServiceError::FraudRejected(_))
    ));
}

#[tokio::test]
async fn unreviewed_hold_is_swept_after_window() {
    let h = harness();
    h.through_verify(Some(REVIEW_SESSION)).await;
    h.choose(AddressMethod::Phone).await;
    let created = h.enter_password().await;

    assert!(h.service.sweep_fraud_reviews().unwrap().is_empty());
    h.clock.advance_days(30);
    assert_eq!(h.service.sweep_fraud_reviews().unwrap(), vec![created.profile_id]);
    assert!(h.service.profile(created.profile_id).unwrap().fraud_rejected());
}

#[tokio::test]
async fn scheduled_sweep_reports_rejected_holds() {
    let h = harness();
    h.through_verify(Some(REVIEW_SESSION)).await;
    h.choose(AddressMethod::Phone).await;
    h.enter_password().await;

    let scheduler = Scheduler::new(Arc::clone(&h.service), &config().params);
    assert_eq!(scheduler.run_once(Job::FraudSweep).await.unwrap(), 0);
    h.clock.advance_days(30);
    assert_eq!(scheduler.run_once(Job::FraudSweep).await.unwrap(), 1);
    assert_eq!(scheduler.runner().stats().get("succeeded"), 2);
}

#[tokio::test]
async fn job_loops_stop_on_shutdown() {
    let h = harness();
    let every = Duration::from_millis(5);
    let intervals = Intervals {
        in_person_poll: every,
        fraud_sweep: every,
        gpo_expiry: every,
    };
    let scheduler = Scheduler::with_intervals(Arc::clone(&h.service), &config().params, intervals);
    let shutdown = ShutdownController::new();
    let handles = scheduler.spawn(&shutdown);
    assert_eq!(handles.len(), Job::ALL.len());

    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown.shutdown();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
    assert!(scheduler.runner().stats().get("succeeded") >= 3);
}

// ---------------------------------------------------------------------------
// Password reset
// ---------------------------------------------------------------------------

#[tokio::test]
async fn password_reset_during_visit_leaves_profile_closed() {
    let h = harness();
    h.through_verify(None).await;
    h.choose(AddressMethod::InPerson).await;
    let created = h.enter_password().await;

    assert_eq!(h.service.password_reset(USER).unwrap(), vec![created.profile_id]);
    let unique_id = h.usps.scheduled()[0].clone();
    h.usps.set_status(&unique_id, UspsStatus::Passed);

    let report = h.service.poll_in_person().await.unwrap();
    assert!(report.activated.is_empty());
    let profile = h.service.profile(created.profile_id).unwrap();
    assert!(!profile.active);
    assert_eq!(profile.deactivation_reason, DeactivationReason::EncryptionError);
    assert_eq!(h.service.profile_status(USER).unwrap().active, None);
}

#[tokio::test]
async fn password_reset_while_letter_pending_leaves_code_useless() {
    let h = harness();
    h.through_verify(None).await;
    h.choose(AddressMethod::Gpo).await;
    let created = h.enter_password().await;
    let code = h.notifier.last_letter_code().unwrap();

    assert_eq!(h.service.password_reset(USER).unwrap(), vec![created.profile_id]);
    assert!(matches!(
        h.service.verify_gpo_code(USER, &code),
        Err(ServiceError::NothingPending { .. })
    ));
    let profile = h.service.profile(created.profile_id).unwrap();
    assert!(!profile.active);
    assert_eq!(profile.deactivation_reason, DeactivationReason::EncryptionError);
    assert_eq!(h.service.profile_status(USER).unwrap().active, None);
}

#[tokio::test]
async fn personal_key_restores_profile_after_reset() {
    let h = harness();
    h.through_verify(None).await;
    h.choose(AddressMethod::Phone).await;
    let created = h.enter_password().await;
    let key = created.personal_key.unwrap();

    h.service.password_reset(USER).unwrap();
    assert_eq!(h.service.profile_status(USER).unwrap().active, None);

    let restored = h
        .service
        .restore_with_personal_key(USER, &key.to_lowercase(), &Password::new("new password"))
        .unwrap();
    assert!(restored.active);
    assert_eq!(h.store.active_count(USER), 1);
}

// ---------------------------------------------------------------------------
// Outages and limits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resolution_outage_defers_without_vendor_calls() {
    let mut config = config();
    config.outages.resolution = true;
    let resolution = Arc::new(ScriptedClient::new(CheckKind::Resolution));
    let state_id = Arc::new(ScriptedClient::new(CheckKind::SourceCheck));
    let clients: Vec<Arc<dyn VendorCheckClient>> = vec![
        Arc::new(MockClient::new(CheckKind::DocumentAuth)),
        resolution.clone(),
        state_id.clone(),
        Arc::new(MockClient::new(CheckKind::DeviceFraud)),
        Arc::new(MockClient::new(CheckKind::AddressCheck)),
    ];
    let h = harness_with(config, clients);
    h.through_ssn().await;

    let response = h
        .submit(StepInput::VerifyInfo {
            threatmetrix_session_id: None,
            request_ip: None,
        })
        .await;
    assert_eq!(
        response,
        StepResponse::Step(StepOutcome::Deferred { step: Step::VerifyInfo })
    );
    assert_eq!(resolution.calls(), 0);
    assert_eq!(state_id.calls(), 0);
    assert_eq!(h.service.next_step(USER).unwrap(), Step::VerifyInfo);
    assert!(h.events.names().contains(&"proofing_deferred"));
}

#[tokio::test]
async fn five_wrong_codes_lock_out_verify_and_send() {
    let h = harness();
    h.through_verify(None).await;
    h.submit(StepInput::AddressConfirmationChoice {
        method: AddressMethod::Phone,
    })
    .await;
    h.service
        .send_phone_otp(USER, PHONE, OtpDelivery::Sms)
        .await
        .unwrap();
    let real = h.telephony.last_code().unwrap();
    let wrong = if real == "000000" { "111111" } else { "000000" };

    for remaining in (0..5).rev() {
        assert_eq!(
            h.service.verify_phone_otp(USER, wrong).unwrap(),
            PhoneCheck::Incorrect { remaining }
        );
    }
    let err = h.service.verify_phone_otp(USER, &real).unwrap_err();
    assert!(err.is_rate_limited(), "{err}");
    let err = h
        .service
        .send_phone_otp(USER, PHONE, OtpDelivery::Sms)
        .await
        .unwrap_err();
    assert!(err.is_rate_limited(), "{err}");
    assert!(h.events.names().contains(&"rate_limited"));
}

#[tokio::test]
async fn spent_send_budget_locks_out_verification() {
    let h = harness();
    h.through_verify(None).await;
    h.submit(StepInput::AddressConfirmationChoice {
        method: AddressMethod::Phone,
    })
    .await;
    let sends = config().params.rate_limits.phone_otp.max_attempts;
    for _ in 0..sends {
        h.service
            .send_phone_otp(USER, PHONE, OtpDelivery::Sms)
            .await
            .unwrap();
    }
    let err = h
        .service
        .send_phone_otp(USER, PHONE, OtpDelivery::Sms)
        .await
        .unwrap_err();
    assert!(err.is_rate_limited(), "{err}");

    let code = h.telephony.last_code().unwrap();
    let err = h.service.verify_phone_otp(USER, &code).unwrap_err();
    assert!(err.is_rate_limited(), "{err}");
    assert_eq!(h.service.next_step(USER).unwrap(), Step::PhoneBranch);
}

#[tokio::test]
async fn changed_ssn_voids_confirmed_phone() {
    let h = harness();
    h.through_verify(None).await;
    h.choose(AddressMethod::Phone).await;
    let sends = h.telephony.sent().len();

    assert_eq!(
        h.submit(StepInput::Ssn { ssn: Ssn::new("900-65-4321") }).await,
        advanced(Step::VerifyInfo)
    );
    assert!(h.events.names().contains(&"step_invalidated_downstream"));
    assert_eq!(
        h.submit(StepInput::VerifyInfo {
            threatmetrix_session_id: None,
            request_ip: Some("192.0.2.1".into()),
        })
        .await,
        advanced(Step::AddressConfirmationChoice)
    );
    assert_eq!(
        h.submit(StepInput::AddressConfirmationChoice {
            method: AddressMethod::Phone,
        })
        .await,
        advanced(Step::PhoneBranch)
    );

    let err = h.service.verify_phone_otp(USER, "000000").unwrap_err();
    assert!(
        matches!(err, ServiceError::Address(AddressError::NoChallenge(_))),
        "{err}"
    );
    assert_eq!(h.telephony.sent().len(), sends);
    assert_eq!(h.service.next_step(USER).unwrap(), Step::PhoneBranch);

    // A fresh send re-runs the ownership check and a new code confirms.
    h.confirm_phone().await;
    assert_eq!(h.telephony.sent().len(), sends + 1);
}

#[tokio::test]
async fn phone_step_cannot_be_entered_early() {
    let h = harness();
    h.through_ssn().await;
    let err = h
        .service
        .send_phone_otp(USER, PHONE, OtpDelivery::Sms)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Flow(_)));
    assert!(h.telephony.sent().is_empty());
}

#[tokio::test]
async fn out_of_order_document_redirects_without_vendor_call() {
    let h = harness();
    h.service.start_attempt(USER).unwrap();
    let response = h.submit(StepInput::DocumentCapture { document: document() }).await;
    assert_eq!(response, StepResponse::Step(StepOutcome::Redirect { to: Step::Welcome }));
    assert!(h.events.names().contains(&"step_redirected"));
}

// ---------------------------------------------------------------------------
// Background proofing and fencing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn background_verification_is_applied_on_poll() {
    let mut config = config();
    config.execution_mode = ExecutionMode::Background;
    let h = harness_with(config, MockClient::all());
    h.through_ssn().await;

    let response = h
        .submit(StepInput::VerifyInfo {
            threatmetrix_session_id: None,
            request_ip: None,
        })
        .await;
    assert!(matches!(response, StepResponse::ProofingQueued { .. }));

    let mut polled = ProofingPoll::Pending;
    for _ in 0..200 {
        polled = h.service.poll_proofing(USER).unwrap();
        if polled != ProofingPoll::Pending {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(polled, ProofingPoll::Applied(advanced(Step::AddressConfirmationChoice)));
    assert_eq!(h.service.next_step(USER).unwrap(), Step::AddressConfirmationChoice);
}

#[tokio::test]
async fn result_for_abandoned_attempt_is_discarded() {
    let h = harness();
    h.through_ssn().await;
    let old = h.service.current_attempt(USER).unwrap();

    let outcome = h.service.cancel(USER, CancelMode::StartOver).unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Cancelled {
            mode: CancelMode::StartOver,
            resume_at: Some(Step::Welcome),
        }
    );
    let fresh = h.service.start_attempt(USER).unwrap();
    assert_ne!(fresh.id, old.id);

    let mut late = ProofingResult::service_unavailable(old.id, vec![], h.clock.now());
    late.unavailable.clear();
    late.success = true;
    assert_eq!(h.service.apply_proofing_result(USER, late).unwrap(), None);
    assert!(h.events.names().contains(&"stale_result_discarded"));
    assert_eq!(h.service.next_step(USER).unwrap(), Step::Welcome);
}

#[tokio::test]
async fn start_over_closes_pending_profile() {
    let h = harness();
    h.through_verify(None).await;
    h.choose(AddressMethod::Gpo).await;
    let created = h.enter_password().await;

    h.service.cancel(USER, CancelMode::StartOver).unwrap();
    let profile = h.store.get_profile(created.profile_id).unwrap();
    assert!(profile.pending_reasons().is_empty());
    assert!(!profile.active);
}
