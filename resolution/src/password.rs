//! Password resets against pending and active profiles.
//!
//! A reset bumps the user's password epoch first, so any profile write that
//! races with it is refused by the store's epoch check. Then every profile
//! still sealed under the old password is deactivated:
//!
//! - an active profile gets `password_reset` and can be restored with the
//!   personal key, which seals a second copy of the PII;
//! - any other live profile gets `encryption_error`, and its in-person
//!   enrollment is cancelled. The user must proof again.

use std::sync::Arc;

use idv_crypto::{normalize_code, open_with_password, seal_with_password, RandomSource};
use idv_ratelimit::RateLimiter;
use idv_store::{update_enrollment_with, update_profile_with, IdvStore};
use idv_types::{
    Clock, DeactivationReason, Effect, EnrollmentStatus, IdvEvent, Outcome, Profile, ProfileId,
    RateLimitType, UserId,
};

use crate::engine::{activate, deactivated};
use crate::ResolutionError;

pub struct PasswordResetHandler {
    store: Arc<dyn IdvStore>,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RandomSource>,
}

impl PasswordResetHandler {
    pub fn new(
        store: Arc<dyn IdvStore>,
        limiter: RateLimiter,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            store,
            limiter,
            clock,
            rng,
        }
    }

    /// Returns the profiles that were deactivated.
    pub fn on_password_reset(
        &self,
        user: UserId,
    ) -> Result<Outcome<Vec<ProfileId>>, ResolutionError> {
        let now = self.clock.now();
        let user = self.store.bump_password_epoch(user, now)?;
        tracing::info!(user_id = %user.id, epoch = user.password_epoch, "password reset");

        let mut affected = Vec::new();
        let mut effects = Vec::new();
        for profile in self.store.profiles_for_user(user.id)? {
            let Some(reason) = reset_reason(&profile) else {
                continue;
            };
            let stored = update_profile_with(self.store.as_ref(), profile.id, |p| {
                let Some(reason) = reset_reason(p) else {
                    return false;
                };
                p.active = false;
                p.deactivation_reason = p.deactivation_reason.escalate(reason);
                true
            })?;
            if reason == DeactivationReason::EncryptionError {
                self.cancel_enrollment(profile.id, &mut effects)?;
            }
            effects.push(deactivated(profile.id, stored.deactivation_reason));
            affected.push(profile.id);
        }
        Ok(Outcome::new(affected, effects))
    }

    fn cancel_enrollment(
        &self,
        profile_id: ProfileId,
        effects: &mut Vec<Effect>,
    ) -> Result<(), ResolutionError> {
        let Some(enrollment) = self.store.enrollment_for_profile(profile_id)? else {
            return Ok(());
        };
        let now = self.clock.now();
        let mut moved = false;
        update_enrollment_with(self.store.as_ref(), enrollment.id, |e| {
            moved = e.transition(EnrollmentStatus::Cancelled, now);
            moved
        })?;
        if moved {
            effects.push(
                IdvEvent::InPersonEnrollmentUpdated {
                    enrollment_id: enrollment.id,
                    status: EnrollmentStatus::Cancelled,
                }
                .into(),
            );
        }
        Ok(())
    }

    /// Recover the profile deactivated by the last reset: open the recovery
    /// copy with the personal key, seal it again under the new password and
    /// reactivate.
    pub fn restore_with_personal_key(
        &self,
        user: UserId,
        personal_key: &str,
        new_password: &[u8],
    ) -> Result<Outcome<Profile>, ResolutionError> {
        let now = self.clock.now();
        self.limiter
            .ensure_unlimited(user, &[RateLimitType::VerifyPersonalKey], now)?;

        let profile = self
            .store
            .profiles_for_user(user)?
            .into_iter()
            .filter(|p| p.deactivation_reason == DeactivationReason::PasswordReset && !p.active)
            .max_by_key(|p| p.activated_at)
            .ok_or(ResolutionError::NothingToRestore(user))?;
        let recovery = profile
            .encrypted_pii_recovery
            .as_ref()
            .ok_or(ResolutionError::NothingToRestore(user))?;

        let pii = match open_with_password(recovery, normalize_code(personal_key).as_bytes()) {
            Ok(pii) => pii,
            Err(_) => {
                let left = self
                    .limiter
                    .attempt(user, RateLimitType::VerifyPersonalKey, now)?;
                tracing::info!(user_id = %user, remaining = left.remaining, "personal key mismatch");
                return Err(ResolutionError::PersonalKeyMismatch {
                    remaining: left.remaining,
                });
            }
        };

        let epoch = self.store.get_user(user)?.password_epoch;
        let sealed = seal_with_password(&pii, new_password, self.rng.as_ref())?;
        update_profile_with(self.store.as_ref(), profile.id, |p| {
            p.encrypted_pii = Some(sealed.clone());
            p.pii_key_epoch = epoch;
            p.deactivation_reason = DeactivationReason::None;
            true
        })?;
        tracing::info!(profile_id = %profile.id, "pii restored with personal key");
        activate(self.store.as_ref(), profile.id, now)
    }
}

/// The reason a reset applies to `profile`, or `None` when the profile is
/// already closed or already waiting on the personal key.
fn reset_reason(profile: &Profile) -> Option<DeactivationReason> {
    if profile.active {
        return Some(DeactivationReason::PasswordReset);
    }
    if profile.deactivation_reason.is_terminal()
        || profile.fraud_rejected()
        || profile.deactivation_reason == DeactivationReason::PasswordReset
    {
        return None;
    }
    Some(DeactivationReason::EncryptionError)
}
