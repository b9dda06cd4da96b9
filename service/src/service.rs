//! The service facade.
//!
//! [`IdvService`] is the only thing the session layer talks to. It loads the
//! user's attempt, runs the vendors a step needs, hands the verdict to the
//! state machine, stores the new attempt and then dispatches the effects the
//! transitions returned. Effects are dispatched only after every state
//! change of the operation has been committed.

use std::sync::Arc;

use idv_address::{
    AddressError, AddressSubject, GpoCheck, GpoConfirmation, InPersonConfirmation,
    InPersonStatusPoller, OtpCheck, PendingToken, PhoneConfirmation,
};
use idv_crypto::{
    generate_personal_key, normalize_code, random_u64, seal_with_password, OsRandom,
    RandomSource,
};
use idv_flow::{validate_phone, CancelMode, FlowError, IdvStateMachine, StepOutcome, StepPayload, Transition};
use idv_proofing::{JobPoll, ProofingJobs, ProofingOrchestrator, ProofingPlan, Submission};
use idv_ratelimit::RateLimiter;
use idv_resolution::{
    AddressOutcome, AttemptFence, FinalResolutionEngine, FraudReviewGate, FraudStatus,
    PasswordResetHandler, ProfileDecision, Rejection,
};
use idv_store::IdvStore;
use idv_types::{
    AddressMethod, Applicant, Attempt, AttemptStatus, CheckKind, Clock, DocumentPii, Effect,
    IdvEvent, OtpDelivery, Outcome, Profile, ProfileId, ProofingResult, RateLimitType, Ssn, Step,
    SystemClock, User, UserId,
};
use idv_vendors::mock::{MockClient, MockInPersonProofer, MockTelephony};
use idv_vendors::{CheckRequest, GuardedClient, InPersonProofer, ServiceStatus, Telephony, VendorCheckClient};
use zeroize::Zeroizing;

use crate::api::{
    CodeCheck, InPersonPollReport, Password, PendingProfile, PhoneCheck, ProfileCreated,
    ProfileStatus, ProofingPoll, StepInput, StepResponse,
};
use crate::effects::{EffectDispatcher, EventSink, LogNotifier, Notifier, TracingEventSink};
use crate::{ServiceConfig, ServiceError};

/// External collaborators, chosen at construction time.
pub struct Collaborators {
    /// One client per check kind. The address-check client doubles as the
    /// phone finder.
    pub clients: Vec<Arc<dyn VendorCheckClient>>,
    pub telephony: Arc<dyn Telephony>,
    pub in_person: Arc<dyn InPersonProofer>,
    pub events: Arc<dyn EventSink>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub rng: Arc<dyn RandomSource>,
}

impl Collaborators {
    /// Trigger-driven mock vendors reporting under the configured vendor
    /// names, with wall-clock time and OS randomness.
    pub fn mock(config: &ServiceConfig) -> Self {
        let clients = [
            CheckKind::DocumentAuth,
            CheckKind::Resolution,
            CheckKind::SourceCheck,
            CheckKind::DeviceFraud,
            CheckKind::AddressCheck,
        ]
        .into_iter()
        .map(|kind| {
            Arc::new(MockClient::new(kind).with_vendor(config.vendors.vendor(kind)))
                as Arc<dyn VendorCheckClient>
        })
        .collect();
        Self {
            clients,
            telephony: Arc::new(MockTelephony::new()),
            in_person: Arc::new(MockInPersonProofer::new()),
            events: Arc::new(TracingEventSink),
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
            rng: Arc::new(OsRandom),
        }
    }
}

pub struct IdvService {
    store: Arc<dyn IdvStore>,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RandomSource>,
    status: Arc<ServiceStatus>,
    limiter: RateLimiter,
    machine: IdvStateMachine,
    orchestrator: Arc<ProofingOrchestrator>,
    jobs: ProofingJobs,
    phone: PhoneConfirmation,
    gpo: GpoConfirmation,
    in_person: InPersonConfirmation,
    poller: InPersonStatusPoller,
    gate: FraudReviewGate,
    engine: FinalResolutionEngine,
    fence: AttemptFence,
    password: PasswordResetHandler,
    effects: EffectDispatcher,
    device_fraud_enabled: bool,
}

impl IdvService {
    pub fn new(
        config: &ServiceConfig,
        store: Arc<dyn IdvStore>,
        collaborators: Collaborators,
    ) -> Result<Self, ServiceError> {
        let params = &config.params;
        let Collaborators {
            clients,
            telephony,
            in_person,
            events,
            notifier,
            clock,
            rng,
        } = collaborators;

        let finder = clients
            .iter()
            .find(|c| c.kind() == CheckKind::AddressCheck)
            .cloned()
            .ok_or_else(|| ServiceError::Config("no address-check client configured".into()))?;
        let fingerprinter = Arc::new(config.fingerprinter()?);
        let server_key = Arc::new(config.server_key()?);
        let status = Arc::new(ServiceStatus::new(&config.outages));
        let limiter = RateLimiter::new(store.clone(), params.rate_limits.clone());

        let orchestrator = Arc::new(ProofingOrchestrator::new(
            clients,
            status.clone(),
            clock.clone(),
            params,
        ));
        let jobs = ProofingJobs::new(
            orchestrator.clone(),
            store.clone(),
            clock.clone(),
            config.execution_mode,
            params,
        );

        tracing::info!(
            mode = ?config.execution_mode,
            device_fraud = config.device_fraud_enabled,
            "identity verification service ready"
        );

        Ok(Self {
            machine: IdvStateMachine::new(server_key, fingerprinter.clone(), rng.clone()),
            phone: PhoneConfirmation::new(
                store.clone(),
                limiter.clone(),
                telephony,
                GuardedClient::from_params(finder, params),
                status.clone(),
                fingerprinter.clone(),
                rng.clone(),
                clock.clone(),
                params,
            ),
            gpo: GpoConfirmation::new(
                store.clone(),
                limiter.clone(),
                fingerprinter,
                rng.clone(),
                clock.clone(),
                params,
            ),
            in_person: InPersonConfirmation::new(
                store.clone(),
                in_person.clone(),
                status.clone(),
                rng.clone(),
                clock.clone(),
                params,
            ),
            poller: InPersonStatusPoller::new(store.clone(), in_person, clock.clone(), params),
            gate: FraudReviewGate::new(store.clone(), clock.clone(), rng.clone(), params),
            engine: FinalResolutionEngine::new(store.clone(), clock.clone()),
            fence: AttemptFence::new(store.clone()),
            password: PasswordResetHandler::new(
                store.clone(),
                limiter.clone(),
                clock.clone(),
                rng.clone(),
            ),
            effects: EffectDispatcher::new(events, notifier),
            device_fraud_enabled: config.device_fraud_enabled,
            orchestrator,
            jobs,
            limiter,
            status,
            store,
            clock,
            rng,
        })
    }

    /// Live outage switches.
    pub fn status(&self) -> &ServiceStatus {
        &self.status
    }

    pub fn store(&self) -> &Arc<dyn IdvStore> {
        &self.store
    }

    // ── Flow ─────────────────────────────────────────────────────────────

    /// Enter the flow. Returns the attempt in progress, starting one if
    /// there is none. A fraud-rejected user is turned away.
    pub fn start_attempt(&self, user: UserId) -> Result<Attempt, ServiceError> {
        let now = self.clock.now();
        match self.store.get_user(user) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => self.store.put_user(&User::new(user, now))?,
            Err(e) => return Err(e.into()),
        }
        if self.gate.blocks_new_attempts(user)? {
            tracing::info!(user_id = %user, "attempt refused after fraud rejection");
            return Err(ServiceError::FraudRejected(user));
        }
        if let Some(id) = self.store.current_attempt_id(user)? {
            match self.store.get_attempt(id) {
                Ok(attempt) if attempt.is_in_progress() => return Ok(attempt),
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        let transition = self.machine.start(user, now)?;
        self.store.put_attempt(&transition.attempt)?;
        self.store.set_current_attempt(user, Some(transition.attempt.id))?;
        self.effects.dispatch(transition.effects);
        Ok(transition.attempt)
    }

    /// The in-progress attempt, as stored.
    pub fn current_attempt(&self, user: UserId) -> Result<Attempt, ServiceError> {
        let id = self
            .store
            .current_attempt_id(user)?
            .ok_or(ServiceError::NoAttempt(user))?;
        Ok(self.store.get_attempt(id)?)
    }

    pub fn next_step(&self, user: UserId) -> Result<Step, ServiceError> {
        Ok(self.machine.next_step(&self.current_attempt(user)?))
    }

    /// Submit one step.
    pub async fn submit_step(&self, user: UserId, input: StepInput) -> Result<StepResponse, ServiceError> {
        let attempt = self.current_attempt(user)?;
        let payload = match input {
            StepInput::Welcome => StepPayload::Welcome,
            StepInput::Agreement { accepted } => StepPayload::Agreement { accepted },
            StepInput::Ssn { ssn } => StepPayload::Ssn { ssn },
            StepInput::AddressConfirmationChoice { method } => {
                StepPayload::AddressConfirmationChoice { method }
            }
            StepInput::GpoBranch => StepPayload::GpoBranch,
            StepInput::InPersonBranch => {
                if self.status.in_person_outage() {
                    return Err(AddressError::InPersonUnavailable.into());
                }
                StepPayload::InPersonBranch
            }
            StepInput::PersonalKey { acknowledged } => StepPayload::PersonalKey { acknowledged },
            StepInput::DocumentCapture { document } => {
                return self.capture_document(attempt, document).await;
            }
            StepInput::VerifyInfo {
                threatmetrix_session_id,
                request_ip,
            } => {
                return self
                    .verify_info(attempt, threatmetrix_session_id, request_ip)
                    .await;
            }
            StepInput::EnterPassword { password } => {
                return self.enter_password(attempt, password).await;
            }
        };
        let transition = self.machine.advance(attempt, payload, self.clock.now())?;
        let (_, outcome) = self.commit(transition, Vec::new())?;
        Ok(StepResponse::Step(outcome))
    }

    /// Cancel the flow. Starting over or exiting abandons the attempt: its
    /// queued proofing job is dropped and its pending profile closed.
    pub fn cancel(&self, user: UserId, mode: CancelMode) -> Result<StepOutcome, ServiceError> {
        let attempt = self.current_attempt(user)?;
        let profile_id = attempt.profile_id;
        let transition = self.machine.cancel(attempt, mode, self.clock.now())?;
        if transition.attempt.status != AttemptStatus::Abandoned {
            return Ok(transition.outcome);
        }

        let attempt_id = transition.attempt.id;
        let mut effects = transition.effects;
        self.store.put_attempt(&transition.attempt)?;
        self.store.set_current_attempt(user, None)?;
        self.jobs.discard(attempt_id)?;
        if let Some(profile_id) = profile_id {
            effects.extend(self.close_pending(profile_id)?);
        }
        self.effects.dispatch(effects);
        Ok(transition.outcome)
    }

    fn commit(&self, transition: Transition, mut effects: Vec<Effect>) -> Result<(Attempt, StepOutcome), ServiceError> {
        if transition.voids_phone_challenge {
            self.store.delete_otp(transition.attempt.id)?;
            tracing::info!(attempt_id = %transition.attempt.id, "phone challenge cleared");
        }
        self.store.put_attempt(&transition.attempt)?;
        effects.extend(transition.effects);
        self.effects.dispatch(effects);
        Ok((transition.attempt, transition.outcome))
    }

    /// A redirect when `step` cannot be entered yet. Checked before any
    /// vendor call or rate-limit charge.
    fn redirect(&self, attempt: &Attempt, step: Step) -> Result<Option<StepResponse>, ServiceError> {
        match self.machine.guard(attempt, step) {
            Ok(()) => Ok(None),
            Err(FlowError::StepOutOfOrder { redirect_to, .. }) => {
                self.effects.dispatch(vec![IdvEvent::StepRedirected {
                    attempt_id: attempt.id,
                    requested: step,
                    redirect_to,
                }
                .into()]);
                Ok(Some(StepResponse::Step(StepOutcome::Redirect { to: redirect_to })))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn replayed(&self, attempt: &Attempt, step: Step) -> StepResponse {
        self.effects.dispatch(vec![IdvEvent::StepReplayed {
            attempt_id: attempt.id,
            step,
        }
        .into()]);
        StepResponse::Step(StepOutcome::Replayed {
            next: self.machine.next_step(attempt),
        })
    }

    fn deferred(&self, attempt: &Attempt, step: Step) -> StepResponse {
        tracing::warn!(attempt_id = %attempt.id, %step, "vendor outage, step deferred");
        self.effects.dispatch(vec![IdvEvent::ProofingDeferred {
            attempt_id: attempt.id,
        }
        .into()]);
        StepResponse::Step(StepOutcome::Deferred { step })
    }

    // ── Vendor-backed steps ──────────────────────────────────────────────

    async fn capture_document(&self, attempt: Attempt, document: DocumentPii) -> Result<StepResponse, ServiceError> {
        if let Some(redirect) = self.redirect(&attempt, Step::DocumentCapture)? {
            return Ok(redirect);
        }
        let plan = ProofingPlan::document_auth();
        if !self.status.outages(&plan.required).is_empty() {
            return Ok(self.deferred(&attempt, Step::DocumentCapture));
        }
        self.limiter
            .attempt(attempt.user_id, RateLimitType::IdvDocAuth, self.clock.now())?;

        let request = CheckRequest {
            attempt_id: attempt.id,
            applicant: Applicant {
                document: document.clone(),
                ssn: Ssn::new(""),
                phone: None,
            },
            threatmetrix_session_id: None,
            request_ip: None,
        };
        let result = self
            .orchestrator
            .run(attempt.id, &request, &plan)
            .await?;
        if result.is_service_unavailable() {
            return Ok(self.deferred(&attempt, Step::DocumentCapture));
        }
        let Some(check) = result.check(CheckKind::DocumentAuth).cloned() else {
            return Err(FlowError::InvalidInput {
                step: Step::DocumentCapture,
                reason: "document check produced no verdict",
            }
            .into());
        };

        let transition = self.machine.advance(
            attempt,
            StepPayload::DocumentCapture {
                document,
                result: check,
            },
            self.clock.now(),
        )?;
        let (_, outcome) = self.commit(transition, Vec::new())?;
        Ok(StepResponse::Step(outcome))
    }

    async fn verify_info(
        &self,
        attempt: Attempt,
        threatmetrix_session_id: Option<String>,
        request_ip: Option<String>,
    ) -> Result<StepResponse, ServiceError> {
        if let Some(redirect) = self.redirect(&attempt, Step::VerifyInfo)? {
            return Ok(redirect);
        }
        if attempt.is_completed(Step::VerifyInfo) {
            return Ok(self.replayed(&attempt, Step::VerifyInfo));
        }
        let mut plan = ProofingPlan::verify_info(self.device_fraud_enabled);
        if let Some(doc_auth) = attempt.doc_auth_result.clone() {
            plan = plan.with_prior(doc_auth);
        }
        if !self.status.outages(&plan.required).is_empty() {
            return Ok(self.deferred(&attempt, Step::VerifyInfo));
        }

        let user = attempt.user_id;
        let now = self.clock.now();
        self.limiter.ensure_unlimited(
            user,
            &[RateLimitType::IdvResolution, RateLimitType::ProofSsn],
            now,
        )?;
        self.limiter.attempt(user, RateLimitType::IdvResolution, now)?;
        self.limiter.attempt(user, RateLimitType::ProofSsn, now)?;

        let request = CheckRequest {
            attempt_id: attempt.id,
            applicant: self.machine.applicant(&attempt)?,
            threatmetrix_session_id,
            request_ip,
        };
        match self.jobs.submit(user, request, plan).await? {
            Submission::Completed(result) => self.apply_verify_info(attempt, result),
            Submission::Queued(_) => {
                tracing::info!(attempt_id = %attempt.id, "verification queued");
                Ok(StepResponse::ProofingQueued {
                    attempt_id: attempt.id,
                })
            }
        }
    }

    fn apply_verify_info(&self, attempt: Attempt, result: ProofingResult) -> Result<StepResponse, ServiceError> {
        let user = attempt.user_id;
        let attempt_id = attempt.id;
        let components = attempt.components.clone();
        let transition = self
            .machine
            .advance(attempt, StepPayload::VerifyInfo { result }, self.clock.now())?;

        let mut effects = Vec::new();
        if transition.outcome == StepOutcome::Rejected {
            let rejected = self.gate.reject_attempt(user, attempt_id, components)?;
            effects.extend(rejected.effects);
        }
        let (_, outcome) = self.commit(transition, effects)?;
        Ok(StepResponse::Step(outcome))
    }

    /// Check on background verification for the current attempt and apply
    /// a finished result.
    pub fn poll_proofing(&self, user: UserId) -> Result<ProofingPoll, ServiceError> {
        let attempt = self.current_attempt(user)?;
        Ok(match self.jobs.poll(attempt.id)? {
            JobPoll::Missing => ProofingPoll::Missing,
            JobPoll::Pending => ProofingPoll::Pending,
            JobPoll::Lost => ProofingPoll::Lost,
            JobPoll::Failed(message) => ProofingPoll::Failed(message),
            JobPoll::Completed(_) if attempt.is_completed(Step::VerifyInfo) => {
                ProofingPoll::Applied(self.replayed(&attempt, Step::VerifyInfo))
            }
            JobPoll::Completed(result) => match self.apply_proofing_result(user, result)? {
                Some(response) => ProofingPoll::Applied(response),
                None => ProofingPoll::Discarded,
            },
        })
    }

    /// Apply a proofing result that arrived out of band. Results for an
    /// attempt that is no longer current are dropped and `None` returned.
    pub fn apply_proofing_result(
        &self,
        user: UserId,
        result: ProofingResult,
    ) -> Result<Option<StepResponse>, ServiceError> {
        let fence = self.fence.check_result(user, &result)?;
        if let Some(discarded) = fence.discard_event(result.attempt_id) {
            self.effects.dispatch(vec![discarded]);
            return Ok(None);
        }
        let attempt = self.store.get_attempt(result.attempt_id)?;
        self.apply_verify_info(attempt, result).map(Some)
    }

    // ── Profile creation ─────────────────────────────────────────────────

    async fn enter_password(&self, attempt: Attempt, password: Password) -> Result<StepResponse, ServiceError> {
        if let Some(redirect) = self.redirect(&attempt, Step::EnterPassword)? {
            return Ok(redirect);
        }
        if let Some(profile_id) = attempt.profile_id {
            let profile = self.store.get_profile(profile_id)?;
            let transition = self.machine.advance(
                attempt,
                StepPayload::EnterPassword { profile_id },
                self.clock.now(),
            )?;
            let (_, outcome) = self.commit(transition, Vec::new())?;
            return Ok(StepResponse::ProfileCreated(ProfileCreated {
                profile_id,
                outcome,
                personal_key: None,
                decision: FinalResolutionEngine::reassess(&profile),
                pending: None,
            }));
        }
        if password.is_empty() {
            return Err(FlowError::InvalidInput {
                step: Step::EnterPassword,
                reason: "password is required",
            }
            .into());
        }
        let result = attempt.proofing_result.clone().ok_or(ServiceError::WrongStep {
            requested: Step::EnterPassword,
            expected: Step::VerifyInfo,
        })?;
        let method = attempt.address_method.ok_or(ServiceError::WrongStep {
            requested: Step::EnterPassword,
            expected: Step::AddressConfirmationChoice,
        })?;
        if method == AddressMethod::InPerson && self.status.in_person_outage() {
            return Err(AddressError::InPersonUnavailable.into());
        }

        let applicant = self.machine.applicant(&attempt)?;
        let personal_key = generate_personal_key(self.rng.as_ref())?;
        let profile = self.seal_profile(&attempt, &applicant, &password, &personal_key)?;
        let profile_id = profile.id;
        self.store.insert_profile(&profile)?;
        tracing::info!(%profile_id, attempt_id = %attempt.id, ?method, "profile created");

        let mut effects = Vec::new();
        let pending = match self.initiate_address(method, profile_id, &applicant).await {
            Ok(started) => {
                effects.extend(started.effects);
                started.value
            }
            Err(e) => {
                tracing::warn!(%profile_id, error = %e, "address confirmation did not start");
                self.store.delete_profile(profile_id)?;
                return Err(e);
            }
        };
        if let Some(reason) = result.fraud_review_pending_reason {
            effects.extend(self.gate.hold(profile_id, reason)?.effects);
        }

        let transition = self.machine.advance(
            attempt,
            StepPayload::EnterPassword { profile_id },
            self.clock.now(),
        )?;
        self.store.put_attempt(&transition.attempt)?;
        effects.extend(transition.effects);

        let stored = self.store.get_profile(profile_id)?;
        let decision = FinalResolutionEngine::resolve(
            &result,
            AddressOutcome::of(&stored),
            FraudStatus::of(&stored),
        );
        effects.extend(self.engine.apply(profile_id, decision)?.effects);
        self.effects.dispatch(effects);

        Ok(StepResponse::ProfileCreated(ProfileCreated {
            profile_id,
            outcome: transition.outcome,
            personal_key: Some(personal_key),
            decision,
            pending,
        }))
    }

    /// A new inactive profile with the PII sealed under the password and,
    /// separately, under the personal key.
    fn seal_profile(
        &self,
        attempt: &Attempt,
        applicant: &Applicant,
        password: &Password,
        personal_key: &str,
    ) -> Result<Profile, ServiceError> {
        let user = self.store.get_user(attempt.user_id)?;
        let pii = Zeroizing::new(serde_json::to_vec(applicant)?);
        let recovery_secret = Zeroizing::new(normalize_code(personal_key));

        let mut profile = Profile::new(
            ProfileId::new(random_u64(self.rng.as_ref())?),
            user.id,
            attempt.id,
            attempt.components.clone(),
            user.password_epoch,
            self.clock.now(),
        );
        profile.encrypted_pii = Some(seal_with_password(&pii, password.as_bytes(), self.rng.as_ref())?);
        profile.encrypted_pii_recovery = Some(seal_with_password(
            &pii,
            recovery_secret.as_bytes(),
            self.rng.as_ref(),
        )?);
        Ok(profile)
    }

    async fn initiate_address(
        &self,
        method: AddressMethod,
        profile_id: ProfileId,
        applicant: &Applicant,
    ) -> Result<Outcome<Option<PendingToken>>, ServiceError> {
        Ok(match method {
            AddressMethod::Phone => Outcome::quiet(None),
            AddressMethod::Gpo => self.gpo.request_letter(profile_id)?.map(Some),
            AddressMethod::InPerson => self.in_person.enroll(profile_id, applicant).await?.map(Some),
        })
    }

    fn decide(&self, profile: &Profile) -> Result<(ProfileDecision, Vec<Effect>), ServiceError> {
        let decision = FinalResolutionEngine::reassess(profile);
        let applied = self.engine.apply(profile.id, decision)?;
        Ok((decision, applied.effects))
    }

    // ── Address confirmation ─────────────────────────────────────────────

    fn subject(attempt: &Attempt) -> AddressSubject {
        AddressSubject {
            user_id: attempt.user_id,
            attempt_id: attempt.id,
            profile_id: attempt.profile_id,
        }
    }

    /// Check the phone belongs to the applicant and text or call a code.
    pub async fn send_phone_otp(
        &self,
        user: UserId,
        phone: &str,
        delivery: OtpDelivery,
    ) -> Result<PendingToken, ServiceError> {
        let attempt = self.current_attempt(user)?;
        self.machine.guard(&attempt, Step::PhoneBranch)?;
        let phone = validate_phone(phone)?;
        let request = CheckRequest {
            attempt_id: attempt.id,
            applicant: self.machine.applicant(&attempt)?,
            threatmetrix_session_id: None,
            request_ip: None,
        };
        let sent = self
            .phone
            .send_otp(&Self::subject(&attempt), &phone, delivery, request)
            .await?;
        self.effects.dispatch(sent.effects);
        Ok(sent.value)
    }

    /// Check a phone code. A correct code completes the phone step.
    pub fn verify_phone_otp(&self, user: UserId, code: &str) -> Result<PhoneCheck, ServiceError> {
        let attempt = self.current_attempt(user)?;
        let checked = self.phone.verify_otp(&Self::subject(&attempt), code)?;
        match checked.value {
            OtpCheck::Confirmed {
                phone,
                vendor,
                confirmed_at,
            } => {
                let transition = self.machine.advance(
                    attempt,
                    StepPayload::PhoneBranch {
                        phone,
                        vendor,
                        confirmed_at,
                    },
                    self.clock.now(),
                )?;
                let (_, outcome) = self.commit(transition, checked.effects)?;
                Ok(PhoneCheck::Confirmed(outcome))
            }
            OtpCheck::Incorrect { remaining } => {
                self.effects.dispatch(checked.effects);
                Ok(PhoneCheck::Incorrect { remaining })
            }
        }
    }

    fn pending_profile(
        &self,
        user: UserId,
        what: &'static str,
        wanted: impl Fn(&Profile) -> bool,
    ) -> Result<Profile, ServiceError> {
        self.store
            .profiles_for_user(user)?
            .into_iter()
            .filter(|p| !p.active && p.is_pending() && wanted(p))
            .max_by_key(|p| p.created_at)
            .ok_or(ServiceError::NothingPending { user, what })
    }

    /// Mail another letter for the pending-by-mail profile.
    pub fn request_letter(&self, user: UserId) -> Result<PendingToken, ServiceError> {
        let profile = self.pending_profile(user, "gpo", Profile::gpo_verification_pending)?;
        let queued = self.gpo.resend(profile.id)?;
        self.effects.dispatch(queued.effects);
        Ok(queued.value)
    }

    /// Check a code from a mailed letter; activates when nothing else is
    /// outstanding.
    pub fn verify_gpo_code(&self, user: UserId, code: &str) -> Result<CodeCheck, ServiceError> {
        let profile = self.pending_profile(user, "gpo", Profile::gpo_verification_pending)?;
        let checked = self.gpo.verify_code(profile.id, code)?;
        let mut effects = checked.effects;
        let answer = match checked.value {
            GpoCheck::Verified(profile) => {
                let (decision, applied) = self.decide(&profile)?;
                effects.extend(applied);
                CodeCheck::Accepted(decision)
            }
            GpoCheck::Expired => CodeCheck::Expired,
            GpoCheck::Incorrect { remaining } => CodeCheck::Incorrect { remaining },
        };
        self.effects.dispatch(effects);
        Ok(answer)
    }

    /// Give up on the pending mail or in-person confirmation. The profile
    /// is closed; the user may start over.
    pub fn cancel_pending_profile(&self, user: UserId) -> Result<ProfileId, ServiceError> {
        let profile = self.pending_profile(user, "address confirmation", |p| {
            p.gpo_verification_pending() || p.in_person_verification_pending()
        })?;
        let effects = self.close_pending(profile.id)?;
        self.effects.dispatch(effects);
        Ok(profile.id)
    }

    fn close_pending(&self, profile_id: ProfileId) -> Result<Vec<Effect>, ServiceError> {
        let profile = self.store.get_profile(profile_id)?;
        if profile.active || !profile.is_pending() {
            return Ok(Vec::new());
        }
        if profile.in_person_verification_pending() {
            return Ok(self.in_person.cancel(profile_id)?.effects);
        }
        let rejection = if profile.gpo_verification_pending() {
            Rejection::AddressFailed
        } else {
            Rejection::ProofingFailed
        };
        Ok(self
            .engine
            .apply(profile_id, ProfileDecision::Rejected(rejection))?
            .effects)
    }

    /// Current profile standing, read from the store.
    pub fn profile_status(&self, user: UserId) -> Result<ProfileStatus, ServiceError> {
        let profiles = self.store.profiles_for_user(user)?;
        let pending = match profiles
            .iter()
            .filter(|p| !p.active && p.is_pending())
            .max_by_key(|p| p.created_at)
        {
            Some(p) => {
                let enrollment_code = if p.in_person_verification_pending() {
                    self.store
                        .enrollment_for_profile(p.id)?
                        .filter(|e| !e.status.is_terminal())
                        .map(|e| e.enrollment_code)
                } else {
                    None
                };
                Some(PendingProfile {
                    profile_id: p.id,
                    reasons: p.pending_reasons(),
                    enrollment_code,
                })
            }
            None => None,
        };
        Ok(ProfileStatus {
            active: profiles.iter().find(|p| p.active).map(|p| p.id),
            pending,
            fraud_rejected: profiles.iter().any(Profile::fraud_rejected),
        })
    }

    pub fn profile(&self, profile_id: ProfileId) -> Result<Profile, ServiceError> {
        Ok(self.store.get_profile(profile_id)?)
    }

    // ── Account events ───────────────────────────────────────────────────

    /// The user changed their password. Returns the deactivated profiles.
    pub fn password_reset(&self, user: UserId) -> Result<Vec<ProfileId>, ServiceError> {
        let reset = self.password.on_password_reset(user)?;
        self.effects.dispatch(reset.effects);
        Ok(reset.value)
    }

    /// Reactivate the profile lost to the last password reset.
    pub fn restore_with_personal_key(
        &self,
        user: UserId,
        personal_key: &str,
        new_password: &Password,
    ) -> Result<Profile, ServiceError> {
        let restored =
            self.password
                .restore_with_personal_key(user, personal_key, new_password.as_bytes())?;
        self.effects.dispatch(restored.effects);
        Ok(restored.value)
    }

    // ── Operator actions ─────────────────────────────────────────────────

    pub fn fraud_pass(&self, profile_id: ProfileId, reason: &str) -> Result<Profile, ServiceError> {
        let passed = self.gate.pass(profile_id, reason)?;
        self.effects.dispatch(passed.effects);
        Ok(passed.value)
    }

    pub fn fraud_reject(&self, profile_id: ProfileId, reason: &str) -> Result<Profile, ServiceError> {
        let rejected = self.gate.reject(profile_id, reason)?;
        self.effects.dispatch(rejected.effects);
        Ok(rejected.value)
    }

    pub fn fraud_reverse(&self, profile_id: ProfileId, reason: &str) -> Result<Profile, ServiceError> {
        let reversed = self.gate.reverse_rejection(profile_id, reason)?;
        self.effects.dispatch(reversed.effects);
        Ok(reversed.value)
    }

    pub fn reset_rate_limit(&self, user: UserId, kind: RateLimitType) -> Result<(), ServiceError> {
        self.limiter.reset(user, kind)?;
        tracing::info!(user_id = %user, %kind, "rate limit reset");
        Ok(())
    }

    // ── Periodic work ────────────────────────────────────────────────────

    /// Reject every fraud hold older than the review window.
    pub fn sweep_fraud_reviews(&self) -> Result<Vec<ProfileId>, ServiceError> {
        let swept = self.gate.sweep_expired()?;
        self.effects.dispatch(swept.effects);
        Ok(swept.value)
    }

    /// Expire pending-by-mail profiles whose letters are all past validity,
    /// and close them unless a fraud review still holds them.
    pub fn expire_gpo_codes(&self) -> Result<Vec<ProfileId>, ServiceError> {
        let expired = self.gpo.expire_stale()?;
        let mut effects = Vec::new();
        for &profile_id in &expired {
            let profile = self.store.get_profile(profile_id)?;
            effects.extend(self.decide(&profile)?.1);
        }
        self.effects.dispatch(effects);
        Ok(expired)
    }

    /// Ask the in-person provider about every pending enrollment, then
    /// activate passed profiles with nothing else outstanding.
    pub async fn poll_in_person(&self) -> Result<InPersonPollReport, ServiceError> {
        let summary = self.poller.run_once().await?;
        let mut effects = summary.effects;
        let mut activated = Vec::new();
        for &profile_id in &summary.passed {
            let profile = self.store.get_profile(profile_id)?;
            let (decision, applied) = self.decide(&profile)?;
            effects.extend(applied);
            if decision == ProfileDecision::Active {
                activated.push(profile_id);
            }
        }
        self.effects.dispatch(effects);
        Ok(InPersonPollReport {
            passed: summary.passed,
            closed: summary.closed,
            activated,
            stats: summary.stats,
        })
    }
}
