//! Confirmation by mailed letter.

use std::sync::Arc;

use async_trait::async_trait;
use idv_crypto::{generate_gpo_code, random_u64, Fingerprinter, RandomSource};
use idv_ratelimit::RateLimiter;
use idv_store::{update_profile_with, IdvStore};
use idv_types::{
    AddressCheck, AddressMethod, Clock, DeactivationReason, Effect, GpoCodeId, GpoConfirmationCode,
    IdvEvent, IdvParams, Notification, Profile, ProfileId, ProofingComponents, RateLimitType,
    Timestamp, TypesError,
};

use crate::{
    AddressConfirmation, AddressError, AddressStatus, AddressSubject, InitiateParams, Outcome,
    PendingToken,
};

#[derive(Clone, Debug)]
pub enum GpoCheck {
    /// The marker is cleared and the address check recorded; the profile is
    /// not active yet.
    Verified(Profile),
    /// The code matched a letter whose validity window has closed.
    Expired,
    Incorrect { remaining: u32 },
}

pub struct GpoConfirmation {
    store: Arc<dyn IdvStore>,
    limiter: RateLimiter,
    fingerprinter: Arc<Fingerprinter>,
    rng: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    code_length: usize,
    validity_secs: u64,
}

impl GpoConfirmation {
    pub fn new(
        store: Arc<dyn IdvStore>,
        limiter: RateLimiter,
        fingerprinter: Arc<Fingerprinter>,
        rng: Arc<dyn RandomSource>,
        clock: Arc<dyn Clock>,
        params: &IdvParams,
    ) -> Self {
        Self {
            store,
            limiter,
            fingerprinter,
            rng,
            clock,
            code_length: params.gpo_code_length,
            validity_secs: params.gpo_code_validity_secs(),
        }
    }

    fn open_profile(&self, id: ProfileId) -> Result<Profile, AddressError> {
        let profile = self.store.get_profile(id)?;
        if profile.deactivation_reason.is_terminal() || profile.fraud_rejected() {
            return Err(AddressError::ProfileClosed(id));
        }
        Ok(profile)
    }

    /// Queue a letter and put the profile into pending-by-mail.
    pub fn request_letter(&self, profile_id: ProfileId) -> Result<Outcome<PendingToken>, AddressError> {
        self.send_letter(profile_id, false)
    }

    /// Queue another letter for a profile already waiting on one. Earlier
    /// codes stay valid.
    pub fn resend(&self, profile_id: ProfileId) -> Result<Outcome<PendingToken>, AddressError> {
        self.send_letter(profile_id, true)
    }

    fn send_letter(&self, profile_id: ProfileId, resend: bool) -> Result<Outcome<PendingToken>, AddressError> {
        let profile = self.open_profile(profile_id)?;
        if profile.active || (resend && !profile.gpo_verification_pending()) {
            return Err(AddressError::NotPending {
                profile: profile_id,
                method: AddressMethod::Gpo,
            });
        }
        let now = self.clock.now();
        self.limiter
            .attempt(profile.user_id, RateLimitType::GpoLetter, now)?;

        let code = generate_gpo_code(self.rng.as_ref(), self.code_length)?;
        let record = GpoConfirmationCode {
            id: GpoCodeId::new(random_u64(self.rng.as_ref())?),
            profile_id,
            otp_fingerprint: self.fingerprinter.fingerprint(&code),
            created_at: now,
            code_sent_at: now,
        };
        self.store.insert_gpo_code(&record)?;

        let mut newly_pending = false;
        update_profile_with(self.store.as_ref(), profile_id, |p| {
            newly_pending = !p.gpo_verification_pending();
            if newly_pending {
                p.gpo_verification_pending_at = Some(now);
            }
            p.gpo_verification_expired_at = None;
            p.deactivation_reason = p
                .deactivation_reason
                .escalate(DeactivationReason::GpoVerificationPending);
            true
        })?;
        tracing::info!(%profile_id, resend, "gpo letter queued");

        let mut effects = vec![
            Effect::notify(profile.user_id, Notification::GpoLetter { code }),
            IdvEvent::GpoLetterRequested { profile_id, resend }.into(),
        ];
        if newly_pending {
            effects.push(
                IdvEvent::ProfilePending {
                    profile_id,
                    reason: DeactivationReason::GpoVerificationPending,
                }
                .into(),
            );
        }
        Ok(Outcome::new(
            PendingToken::LetterQueued {
                code_id: record.id,
                expires_at: now.plus_secs(self.validity_secs),
            },
            effects,
        ))
    }

    /// Check a code typed in from a letter. Any unexpired letter for the
    /// profile is accepted.
    pub fn verify_code(&self, profile_id: ProfileId, code: &str) -> Result<Outcome<GpoCheck>, AddressError> {
        let profile = self.open_profile(profile_id)?;
        if !profile.gpo_verification_pending() {
            return Err(AddressError::NotPending {
                profile: profile_id,
                method: AddressMethod::Gpo,
            });
        }
        let now = self.clock.now();
        let user = profile.user_id;
        self.limiter
            .ensure_unlimited(user, &[RateLimitType::VerifyGpoKey], now)?;

        let codes = self.store.gpo_codes_for_profile(profile_id)?;
        let matched: Vec<&GpoConfirmationCode> = codes
            .iter()
            .filter(|c| self.fingerprinter.matches(code, &c.otp_fingerprint))
            .collect();

        if matched.iter().any(|c| !c.is_expired(self.validity_secs, now)) {
            let profile = self.confirm(profile_id)?;
            self.store.delete_gpo_codes_for_profile(profile_id)?;
            tracing::info!(%profile_id, "gpo code confirmed");
            let event = IdvEvent::GpoCodeSubmitted {
                profile_id,
                success: true,
            };
            return Ok(Outcome::new(GpoCheck::Verified(profile), vec![event.into()]));
        }

        let event = Effect::from(IdvEvent::GpoCodeSubmitted {
            profile_id,
            success: false,
        });
        if !matched.is_empty() {
            return Ok(Outcome::new(GpoCheck::Expired, vec![event]));
        }

        let left = self.limiter.attempt(user, RateLimitType::VerifyGpoKey, now)?;
        let mut effects = vec![event];
        if left.remaining == 0 {
            effects.push(
                IdvEvent::RateLimited {
                    user_id: user,
                    kind: RateLimitType::VerifyGpoKey,
                }
                .into(),
            );
        }
        Ok(Outcome::new(
            GpoCheck::Incorrect {
                remaining: left.remaining,
            },
            effects,
        ))
    }

    fn confirm(&self, profile_id: ProfileId) -> Result<Profile, AddressError> {
        let gpo = ProofingComponents {
            address_check: Some(AddressCheck::GpoLetter),
            ..ProofingComponents::default()
        };
        let mut conflict: Option<TypesError> = None;
        let profile = update_profile_with(self.store.as_ref(), profile_id, |p| {
            if let Err(e) = p.proofing_components.merge(&gpo) {
                conflict = Some(e);
                return false;
            }
            p.gpo_verification_pending_at = None;
            if p.deactivation_reason == DeactivationReason::GpoVerificationPending {
                p.deactivation_reason = DeactivationReason::None;
            }
            true
        })?;
        match conflict {
            Some(e) => Err(e.into()),
            None => Ok(profile),
        }
    }

    /// Expire pending-by-mail profiles with no letter left inside its
    /// validity window. Returns the profiles that expired.
    pub fn expire_stale(&self) -> Result<Vec<ProfileId>, AddressError> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for profile in self.store.iter_profiles()? {
            if !profile.gpo_verification_pending() || !self.all_letters_expired(&profile, now)? {
                continue;
            }
            update_profile_with(self.store.as_ref(), profile.id, |p| {
                if !p.gpo_verification_pending() {
                    return false;
                }
                p.gpo_verification_pending_at = None;
                p.gpo_verification_expired_at = Some(now);
                if p.deactivation_reason == DeactivationReason::GpoVerificationPending {
                    p.deactivation_reason = DeactivationReason::None;
                }
                true
            })?;
            tracing::info!(profile_id = %profile.id, "gpo verification expired");
            expired.push(profile.id);
        }
        Ok(expired)
    }

    fn all_letters_expired(&self, profile: &Profile, now: Timestamp) -> Result<bool, AddressError> {
        let codes = self.store.gpo_codes_for_profile(profile.id)?;
        if codes.is_empty() {
            let since = profile.gpo_verification_pending_at.unwrap_or(profile.created_at);
            return Ok(since.has_expired(self.validity_secs, now));
        }
        Ok(codes.iter().all(|c| c.is_expired(self.validity_secs, now)))
    }
}

#[async_trait]
impl AddressConfirmation for GpoConfirmation {
    fn method(&self) -> AddressMethod {
        AddressMethod::Gpo
    }

    async fn initiate(
        &self,
        subject: &AddressSubject,
        params: InitiateParams,
    ) -> Result<Outcome<PendingToken>, AddressError> {
        match params {
            InitiateParams::Gpo => self.request_letter(subject.profile(AddressMethod::Gpo)?),
            _ => Err(AddressError::WrongParams(AddressMethod::Gpo)),
        }
    }

    fn status(&self, subject: &AddressSubject) -> Result<AddressStatus, AddressError> {
        let profile = self.store.get_profile(subject.profile(AddressMethod::Gpo)?)?;
        Ok(if profile.proofing_components.address_check == Some(AddressCheck::GpoLetter) {
            AddressStatus::Verified
        } else if profile.gpo_verification_pending() && profile.is_pending() {
            AddressStatus::Pending
        } else {
            AddressStatus::Failed
        })
    }
}
