//! Guards and transitions over the in-progress attempt.

use std::sync::Arc;

use idv_crypto::{new_attempt_id, Fingerprinter, RandomSource, ServerKey};
use idv_types::{
    AddressCheck, Applicant, Attempt, AttemptStatus, CheckResult, DocumentPii, Effect, IdvEvent,
    ProofingComponents, ProofingResult, Reason, Ssn, Step, StepCompletion, StickyFields, Timestamp,
    UserId,
};

use crate::{sensitive, validate_phone, validate_ssn, FlowError, StepPayload};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelMode {
    /// Back to the step the user was on; nothing changes.
    KeepGoing,
    /// Abandon the attempt and begin again at `welcome`.
    StartOver,
    /// Abandon the attempt and leave the flow.
    Exit,
}

impl CancelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeepGoing => "keep_going",
            Self::StartOver => "start_over",
            Self::Exit => "exit",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced { next: Step },
    /// Identical resubmission of a completed step.
    Replayed { next: Step },
    /// Predecessors incomplete; send the user to `to`.
    Redirect { to: Step },
    /// Vendor verdict was a failure the user may retry.
    Retry { step: Step, reasons: Vec<Reason> },
    /// A required vendor is in full outage; come back later.
    Deferred { step: Step },
    /// Device-fraud hard reject; the attempt is over.
    Rejected,
    Cancelled { mode: CancelMode, resume_at: Option<Step> },
}

/// The new attempt state and the side effects to run after storing it.
#[derive(Debug)]
pub struct Transition {
    pub attempt: Attempt,
    pub outcome: StepOutcome,
    pub effects: Vec<Effect>,
    /// The attempt's phone challenge no longer matches its data and must be
    /// deleted with this write.
    pub voids_phone_challenge: bool,
}

impl Transition {
    fn new(attempt: Attempt, outcome: StepOutcome) -> Self {
        Self {
            attempt,
            outcome,
            effects: Vec::new(),
            voids_phone_challenge: false,
        }
    }

    fn with_event(mut self, event: IdvEvent) -> Self {
        self.effects.push(Effect::Event(event));
        self
    }
}

/// Steps `attempt` must have completed, in order, before `step` may be entered.
fn predecessors(attempt: &Attempt, step: Step) -> impl Iterator<Item = Step> + '_ {
    let chosen = attempt.address_method.map(|m| m.branch());
    Step::ALL
        .into_iter()
        .filter(move |s| s.ordinal() < step.ordinal())
        .filter(move |s| !s.is_branch() || Some(*s) == chosen)
}

pub struct IdvStateMachine {
    server_key: Arc<ServerKey>,
    fingerprinter: Arc<Fingerprinter>,
    rng: Arc<dyn RandomSource>,
}

impl IdvStateMachine {
    pub fn new(
        server_key: Arc<ServerKey>,
        fingerprinter: Arc<Fingerprinter>,
        rng: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            server_key,
            fingerprinter,
            rng,
        }
    }

    /// A fresh attempt for `user_id`, positioned at `welcome`.
    pub fn start(&self, user_id: UserId, now: Timestamp) -> Result<Transition, FlowError> {
        let attempt = Attempt::new(new_attempt_id(self.rng.as_ref())?, user_id, now);
        let event = IdvEvent::AttemptStarted {
            user_id,
            attempt_id: attempt.id,
        };
        Ok(Transition::new(attempt, StepOutcome::Advanced { next: Step::Welcome }).with_event(event))
    }

    /// The first step the attempt has not completed.
    pub fn next_step(&self, attempt: &Attempt) -> Step {
        let chosen = attempt.address_method.map(|m| m.branch());
        Step::ALL
            .into_iter()
            .filter(|s| !s.is_branch() || Some(*s) == chosen)
            .find(|s| !attempt.is_completed(*s))
            .unwrap_or(Step::Complete)
    }

    /// Whether `step` may be entered now.
    pub fn guard(&self, attempt: &Attempt, step: Step) -> Result<(), FlowError> {
        if !attempt.is_in_progress() {
            return Err(FlowError::AttemptClosed(attempt.id));
        }
        if let Some(missing) = predecessors(attempt, step).find(|s| !attempt.is_completed(*s)) {
            return Err(FlowError::StepOutOfOrder {
                requested: step,
                redirect_to: missing,
            });
        }
        if step.is_branch() {
            if let Some(chosen) = attempt.address_method.map(|m| m.branch()) {
                if chosen != step {
                    return Err(FlowError::StepOutOfOrder {
                        requested: step,
                        redirect_to: chosen,
                    });
                }
            }
        }
        Ok(())
    }

    /// Non-sensitive values to show when `step` is revisited.
    pub fn prefill(&self, attempt: &Attempt, step: Step) -> Option<StickyFields> {
        step.is_sticky().then(|| attempt.sticky.clone())
    }

    /// Unseal what vendors need to know about the applicant.
    pub fn applicant(&self, attempt: &Attempt) -> Result<Applicant, FlowError> {
        let missing = |field| FlowError::MissingPii {
            attempt: attempt.id,
            field,
        };
        let document: DocumentPii = sensitive::open(
            &self.server_key,
            attempt.sensitive.document.as_ref().ok_or_else(|| missing("document"))?,
        )?;
        let ssn: Ssn = sensitive::open(
            &self.server_key,
            attempt.sensitive.ssn.as_ref().ok_or_else(|| missing("ssn"))?,
        )?;
        Ok(Applicant {
            document,
            ssn,
            phone: attempt.sticky.phone.clone(),
        })
    }

    /// Apply one step submission.
    ///
    /// Out-of-order submissions come back as [`StepOutcome::Redirect`], not
    /// as an error. Errors are reserved for invalid input, closed attempts
    /// and infrastructure failures.
    pub fn advance(
        &self,
        mut attempt: Attempt,
        payload: StepPayload,
        now: Timestamp,
    ) -> Result<Transition, FlowError> {
        let step = payload.step();
        match self.guard(&attempt, step) {
            Ok(()) => {}
            Err(FlowError::StepOutOfOrder { redirect_to, .. }) => {
                tracing::info!(attempt_id = %attempt.id, %step, %redirect_to, "step out of order, redirecting");
                let event = IdvEvent::StepRedirected {
                    attempt_id: attempt.id,
                    requested: step,
                    redirect_to,
                };
                return Ok(Transition::new(attempt, StepOutcome::Redirect { to: redirect_to }).with_event(event));
            }
            Err(e) => return Err(e),
        }

        let digest = payload.digest(&self.fingerprinter)?;
        let mut effects = Vec::new();
        let mut voids_phone_challenge = false;

        if let Some(done) = attempt.completion(step) {
            if done.payload_digest == digest {
                let next = self.next_step(&attempt);
                tracing::debug!(attempt_id = %attempt.id, %step, "identical resubmission");
                let event = IdvEvent::StepReplayed {
                    attempt_id: attempt.id,
                    step,
                };
                return Ok(Transition::new(attempt, StepOutcome::Replayed { next }).with_event(event));
            }
            if attempt.profile_id.is_some() {
                return Err(FlowError::ProfileAlreadyCreated(attempt.id));
            }
            let dropped = invalidate_from(&mut attempt, step)?;
            voids_phone_challenge = step.ordinal() <= Step::PhoneBranch.ordinal();
            tracing::info!(attempt_id = %attempt.id, %step, dropped, "changed payload, downstream steps invalidated");
            effects.push(Effect::Event(IdvEvent::StepInvalidatedDownstream {
                attempt_id: attempt.id,
                step,
                dropped,
            }));
        }

        attempt.updated_at = now;
        let outcome = match self.apply(&mut attempt, payload, now)? {
            Applied::Complete => {
                attempt.completions.insert(
                    step,
                    StepCompletion {
                        completed_at: now,
                        payload_digest: digest,
                    },
                );
                if step == Step::PersonalKey {
                    attempt.completions.insert(
                        Step::Complete,
                        StepCompletion {
                            completed_at: now,
                            payload_digest: digest,
                        },
                    );
                    attempt.status = AttemptStatus::Finished;
                }
                let next = self.next_step(&attempt);
                tracing::info!(attempt_id = %attempt.id, %step, %next, "step completed");
                effects.push(Effect::Event(IdvEvent::StepCompleted {
                    attempt_id: attempt.id,
                    step,
                    next_step: next,
                }));
                StepOutcome::Advanced { next }
            }
            Applied::Retry(reasons) => {
                tracing::info!(attempt_id = %attempt.id, %step, reasons = reasons.len(), "step failed, retry allowed");
                StepOutcome::Retry { step, reasons }
            }
            Applied::Deferred => {
                tracing::warn!(attempt_id = %attempt.id, %step, "vendor outage, attempt deferred");
                effects.push(Effect::Event(IdvEvent::ProofingDeferred {
                    attempt_id: attempt.id,
                }));
                StepOutcome::Deferred { step }
            }
            Applied::Rejected => {
                attempt.status = AttemptStatus::Finished;
                tracing::warn!(attempt_id = %attempt.id, "device fraud hard reject");
                StepOutcome::Rejected
            }
        };

        Ok(Transition {
            attempt,
            outcome,
            effects,
            voids_phone_challenge,
        })
    }

    fn apply(
        &self,
        attempt: &mut Attempt,
        payload: StepPayload,
        now: Timestamp,
    ) -> Result<Applied, FlowError> {
        match payload {
            StepPayload::Welcome | StepPayload::GpoBranch | StepPayload::InPersonBranch => {}
            StepPayload::Agreement { accepted } => {
                if !accepted {
                    return Err(FlowError::InvalidInput {
                        step: Step::Agreement,
                        reason: "consent is required",
                    });
                }
            }
            StepPayload::DocumentCapture { document, result } => {
                return self.apply_document(attempt, document, result);
            }
            StepPayload::Ssn { ssn } => {
                validate_ssn(&ssn)?;
                attempt.sensitive.ssn = Some(sensitive::seal(&self.server_key, &ssn, self.rng.as_ref())?);
            }
            StepPayload::VerifyInfo { result } => {
                return self.apply_proofing(attempt, result);
            }
            StepPayload::AddressConfirmationChoice { method } => {
                attempt.address_method = Some(method);
            }
            StepPayload::PhoneBranch {
                phone,
                vendor,
                confirmed_at,
            } => {
                let phone = validate_phone(&phone)?;
                if confirmed_at > now {
                    return Err(FlowError::InvalidInput {
                        step: Step::PhoneBranch,
                        reason: "confirmation is in the future",
                    });
                }
                attempt.components.merge(&ProofingComponents {
                    address_check: Some(AddressCheck::Phone(vendor)),
                    ..ProofingComponents::default()
                })?;
                attempt.sticky.phone = Some(phone);
                attempt.phone_confirmed_at = Some(confirmed_at);
            }
            StepPayload::EnterPassword { profile_id } => {
                if attempt.profile_id.is_some_and(|existing| existing != profile_id) {
                    return Err(FlowError::ProfileAlreadyCreated(attempt.id));
                }
                attempt.profile_id = Some(profile_id);
            }
            StepPayload::PersonalKey { acknowledged } => {
                if !acknowledged {
                    return Err(FlowError::InvalidInput {
                        step: Step::PersonalKey,
                        reason: "personal key must be acknowledged",
                    });
                }
                attempt.personal_key_acknowledged = true;
            }
        }
        Ok(Applied::Complete)
    }

    fn apply_document(
        &self,
        attempt: &mut Attempt,
        document: DocumentPii,
        result: CheckResult,
    ) -> Result<Applied, FlowError> {
        attempt.sticky.first_name = Some(document.first_name.clone());
        attempt.sticky.last_name = Some(document.last_name.clone());
        attempt.sticky.address = Some(document.address.clone());
        attempt.sticky.document_type = Some(document.document_type);

        let passed = result.success;
        let reasons = result.reasons.clone();
        if passed {
            attempt.components.merge(&ProofingComponents {
                document_check: Some(result.vendor),
                document_type: result.document_type.or(Some(document.document_type)),
                ..ProofingComponents::default()
            })?;
            attempt.sensitive.document =
                Some(sensitive::seal(&self.server_key, &document, self.rng.as_ref())?);
        } else {
            attempt.sensitive.document = None;
        }
        attempt.doc_auth_result = Some(result);

        Ok(if passed {
            Applied::Complete
        } else {
            Applied::Retry(reasons)
        })
    }

    fn apply_proofing(&self, attempt: &mut Attempt, result: ProofingResult) -> Result<Applied, FlowError> {
        if result.attempt_id != attempt.id {
            return Err(FlowError::StaleResult {
                expected: attempt.id,
                found: result.attempt_id,
            });
        }
        if result.is_service_unavailable() {
            return Ok(Applied::Deferred);
        }

        let applied = if result.device_fraud_hard_reject {
            Applied::Rejected
        } else if result.success {
            attempt.components.merge(&result.components)?;
            Applied::Complete
        } else {
            Applied::Retry(
                result
                    .checks
                    .values()
                    .filter(|c| !c.success)
                    .flat_map(|c| {
                        if c.timed_out {
                            vec![Reason::new(format!("{}_timed_out", c.kind))]
                        } else {
                            c.reasons.clone()
                        }
                    })
                    .collect(),
            )
        };
        attempt.proofing_result = Some(result);
        Ok(applied)
    }

    /// Cancel the flow.
    ///
    /// Start over and exit abandon the attempt: sensitive and sticky fields
    /// are cleared and any late proofing result for it is fenced off. The
    /// caller is responsible for the attempt's pending profile.
    pub fn cancel(
        &self,
        mut attempt: Attempt,
        mode: CancelMode,
        now: Timestamp,
    ) -> Result<Transition, FlowError> {
        let resume_at = match mode {
            CancelMode::KeepGoing => {
                if !attempt.is_in_progress() {
                    return Err(FlowError::AttemptClosed(attempt.id));
                }
                let next = self.next_step(&attempt);
                return Ok(Transition::new(
                    attempt,
                    StepOutcome::Cancelled {
                        mode,
                        resume_at: Some(next),
                    },
                ));
            }
            CancelMode::StartOver => Some(Step::Welcome),
            CancelMode::Exit => None,
        };

        attempt.status = AttemptStatus::Abandoned;
        attempt.updated_at = now;
        attempt.sensitive.clear();
        attempt.sticky = StickyFields::default();
        attempt.doc_auth_result = None;
        attempt.proofing_result = None;
        tracing::info!(attempt_id = %attempt.id, mode = mode.as_str(), "attempt abandoned");

        let event = IdvEvent::AttemptCancelled {
            attempt_id: attempt.id,
            mode: mode.as_str(),
        };
        Ok(Transition::new(attempt, StepOutcome::Cancelled { mode, resume_at }).with_event(event))
    }
}

enum Applied {
    Complete,
    Retry(Vec<Reason>),
    Deferred,
    Rejected,
}

/// Drop the completion of `step` and of everything after it, with the data
/// those steps produced. Returns how many later completions were dropped.
fn invalidate_from(attempt: &mut Attempt, step: Step) -> Result<usize, FlowError> {
    let before = attempt.completions.len();
    attempt.completions.retain(|s, _| s.ordinal() < step.ordinal());
    let dropped = before - attempt.completions.len() - 1;

    let keeps = |s: Step| attempt.completions.contains_key(&s);
    let keep_document = keeps(Step::DocumentCapture);
    let keep_ssn = keeps(Step::Ssn);
    let keep_proofing = keeps(Step::VerifyInfo);
    let keep_choice = keeps(Step::AddressConfirmationChoice);
    let keep_phone = keeps(Step::PhoneBranch);

    if !keep_document {
        attempt.doc_auth_result = None;
        attempt.sensitive.document = None;
    }
    if !keep_ssn {
        attempt.sensitive.ssn = None;
    }
    if !keep_proofing {
        attempt.proofing_result = None;
    }
    if !keep_choice {
        attempt.address_method = None;
    }

    // Components are rebuilt from what survived.
    let mut components = ProofingComponents::default();
    if let Some(doc) = attempt.doc_auth_result.as_ref().filter(|r| r.success) {
        components.merge(&ProofingComponents {
            document_check: Some(doc.vendor),
            document_type: doc.document_type.or(attempt.sticky.document_type),
            ..ProofingComponents::default()
        })?;
    }
    if let Some(result) = attempt.proofing_result.as_ref().filter(|r| r.success) {
        components.merge(&result.components)?;
    }
    if keep_phone {
        components.address_check = attempt.components.address_check;
    } else {
        attempt.phone_confirmed_at = None;
    }
    attempt.components = components;
    Ok(dropped)
}
