//! Confirmation by an in-person visit.

use std::sync::Arc;

use async_trait::async_trait;
use idv_crypto::{generate_numeric_code, random_hex, random_u64, RandomSource};
use idv_store::{update_enrollment_with, update_profile_with, IdvStore};
use idv_types::{
    AddressMethod, Applicant, Clock, DeactivationReason, Effect, EnrollmentId, EnrollmentStatus,
    IdvEvent, IdvParams, InPersonEnrollment, Notification, Profile, ProfileId, Timestamp,
};
use idv_vendors::{InPersonProofer, ServiceStatus};

use crate::{
    AddressConfirmation, AddressError, AddressStatus, AddressSubject, InitiateParams, Outcome,
    PendingToken,
};

const ENROLLMENT_CODE_LENGTH: usize = 16;
const UNIQUE_ID_BYTES: usize = 9;

pub struct InPersonConfirmation {
    store: Arc<dyn IdvStore>,
    proofer: Arc<dyn InPersonProofer>,
    status: Arc<ServiceStatus>,
    rng: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    validity_secs: u64,
}

impl InPersonConfirmation {
    pub fn new(
        store: Arc<dyn IdvStore>,
        proofer: Arc<dyn InPersonProofer>,
        status: Arc<ServiceStatus>,
        rng: Arc<dyn RandomSource>,
        clock: Arc<dyn Clock>,
        params: &IdvParams,
    ) -> Self {
        Self {
            store,
            proofer,
            status,
            rng,
            clock,
            validity_secs: params.in_person_enrollment_validity_secs(),
        }
    }

    fn token(&self, enrollment: &InPersonEnrollment) -> PendingToken {
        let start = enrollment
            .enrollment_established_at
            .unwrap_or(enrollment.created_at);
        PendingToken::Enrollment {
            enrollment_id: enrollment.id,
            enrollment_code: enrollment.enrollment_code.clone(),
            expires_at: start.plus_secs(self.validity_secs),
        }
    }

    /// Register the applicant with the provider and put the profile into
    /// pending-in-person. Calling again while the enrollment is pending
    /// returns the same enrollment.
    pub async fn enroll(
        &self,
        profile_id: ProfileId,
        applicant: &Applicant,
    ) -> Result<Outcome<PendingToken>, AddressError> {
        if self.status.in_person_outage() {
            return Err(AddressError::InPersonUnavailable);
        }
        let profile = self.store.get_profile(profile_id)?;
        if profile.deactivation_reason.is_terminal() || profile.fraud_rejected() {
            return Err(AddressError::ProfileClosed(profile_id));
        }
        if let Some(existing) = self.store.enrollment_for_profile(profile_id)? {
            if existing.is_pending() {
                return Ok(Outcome::quiet(self.token(&existing)));
            }
            return Err(AddressError::ProfileClosed(profile_id));
        }

        let now = self.clock.now();
        let rng = self.rng.as_ref();
        let enrollment = InPersonEnrollment::new(
            EnrollmentId::new(random_u64(rng)?),
            profile.user_id,
            profile_id,
            generate_numeric_code(rng, ENROLLMENT_CODE_LENGTH)?,
            random_hex(rng, UNIQUE_ID_BYTES)?,
            now,
        );
        self.proofer
            .schedule_in_person_enrollment(&enrollment.unique_id, &enrollment.enrollment_code, applicant)
            .await?;
        self.store.insert_enrollment(&enrollment)?;

        update_profile_with(self.store.as_ref(), profile_id, |p| {
            p.in_person_verification_pending_at = Some(now);
            p.deactivation_reason = p
                .deactivation_reason
                .escalate(DeactivationReason::InPersonVerificationPending);
            true
        })?;
        tracing::info!(%profile_id, enrollment_id = %enrollment.id, "in-person enrollment established");

        let effects = vec![
            Effect::notify(
                profile.user_id,
                Notification::InPersonReadyToVerify {
                    enrollment_code: enrollment.enrollment_code.clone(),
                },
            ),
            IdvEvent::InPersonEnrollmentUpdated {
                enrollment_id: enrollment.id,
                status: EnrollmentStatus::Pending,
            }
            .into(),
            IdvEvent::ProfilePending {
                profile_id,
                reason: DeactivationReason::InPersonVerificationPending,
            }
            .into(),
        ];
        Ok(Outcome::new(self.token(&enrollment), effects))
    }

    /// User cancelled the visit. The profile can no longer complete.
    pub fn cancel(
        &self,
        profile_id: ProfileId,
    ) -> Result<Outcome<Option<InPersonEnrollment>>, AddressError> {
        let now = self.clock.now();
        let Some(enrollment) = self.store.enrollment_for_profile(profile_id)? else {
            return Ok(Outcome::quiet(None));
        };
        let mut effects = Vec::new();
        let enrollment = finish_enrollment(
            self.store.as_ref(),
            enrollment.id,
            EnrollmentStatus::Cancelled,
            now,
            &mut effects,
        )?;
        cancel_profile(self.store.as_ref(), profile_id, &mut effects)?;
        Ok(Outcome::new(Some(enrollment), effects))
    }
}

/// Move an enrollment to a terminal status, recording the change.
pub(crate) fn finish_enrollment(
    store: &dyn IdvStore,
    id: EnrollmentId,
    status: EnrollmentStatus,
    now: Timestamp,
    effects: &mut Vec<Effect>,
) -> Result<InPersonEnrollment, AddressError> {
    let mut moved = false;
    let enrollment = update_enrollment_with(store, id, |e| {
        moved = e.transition(status, now);
        if moved {
            e.status_check_completed_at = Some(now);
        }
        moved
    })?;
    if moved {
        tracing::info!(enrollment_id = %id, %status, "in-person enrollment finished");
        effects.push(
            IdvEvent::InPersonEnrollmentUpdated {
                enrollment_id: id,
                status,
            }
            .into(),
        );
    }
    Ok(enrollment)
}

/// Clear the in-person marker and mark the verification cancelled, keeping
/// any stronger reason already recorded.
pub(crate) fn cancel_profile(
    store: &dyn IdvStore,
    profile_id: ProfileId,
    effects: &mut Vec<Effect>,
) -> Result<Profile, AddressError> {
    let profile = update_profile_with(store, profile_id, |p| {
        if p.active {
            return false;
        }
        p.in_person_verification_pending_at = None;
        p.deactivation_reason = p
            .deactivation_reason
            .escalate(DeactivationReason::VerificationCancelled);
        true
    })?;
    if !profile.active {
        effects.push(
            IdvEvent::ProfileDeactivated {
                profile_id,
                reason: profile.deactivation_reason,
            }
            .into(),
        );
    }
    Ok(profile)
}

#[async_trait]
impl AddressConfirmation for InPersonConfirmation {
    fn method(&self) -> AddressMethod {
        AddressMethod::InPerson
    }

    async fn initiate(
        &self,
        subject: &AddressSubject,
        params: InitiateParams,
    ) -> Result<Outcome<PendingToken>, AddressError> {
        match params {
            InitiateParams::InPerson { applicant } => {
                self.enroll(subject.profile(AddressMethod::InPerson)?, &applicant)
                    .await
            }
            _ => Err(AddressError::WrongParams(AddressMethod::InPerson)),
        }
    }

    fn status(&self, subject: &AddressSubject) -> Result<AddressStatus, AddressError> {
        let profile_id = subject.profile(AddressMethod::InPerson)?;
        Ok(match self.store.enrollment_for_profile(profile_id)? {
            Some(e) if e.status == EnrollmentStatus::Passed => AddressStatus::Verified,
            Some(e) if e.is_pending() => AddressStatus::Pending,
            _ => AddressStatus::Failed,
        })
    }
}
