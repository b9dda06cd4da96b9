//! Nullable store: thread-safe in-memory storage for testing.
//!
//! All tables sit behind one mutex, so every trait method is trivially atomic
//! and compound operations (activation, cascade delete) need no extra care.

use idv_store::{
    Activation, AttemptStore, AuditStore, EnrollmentStore, GpoCodeStore, PhoneOtpStore,
    ProfileStore, ProofingJobStore, RateLimitStore, StoreError, UserStore,
};
use idv_types::{
    Attempt, AttemptId, DeactivationReason, EnrollmentId, FraudReviewRecord, GpoConfirmationCode,
    InPersonEnrollment, PhoneOtpChallenge, Profile, ProfileId, ProofingJob, RateLimitKey,
    RateLimitRecord, Timestamp, User, UserId,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    profiles: BTreeMap<ProfileId, Profile>,
    enrollments: BTreeMap<EnrollmentId, InPersonEnrollment>,
    gpo_codes: Vec<GpoConfirmationCode>,
    attempts: HashMap<AttemptId, Attempt>,
    current_attempts: HashMap<UserId, AttemptId>,
    rate_limits: HashMap<RateLimitKey, RateLimitRecord>,
    jobs: HashMap<AttemptId, ProofingJob>,
    otps: HashMap<AttemptId, PhoneOtpChallenge>,
    audit: Vec<FraudReviewRecord>,
    /// Applied to the stored profile just before the next `update_profile`.
    interleaved_write: Option<ProfileWrite>,
}

type ProfileWrite = Box<dyn FnOnce(&mut Profile) + Send>;

/// An in-memory implementation of every `idv-store` trait.
#[derive(Default)]
pub struct NullStore {
    tables: Mutex<Tables>,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("null store mutex poisoned".into()))
    }

    /// Make another writer win the race against the next `update_profile`:
    /// `write` is applied to the stored profile (bumping its version) right
    /// before the caller's compare-and-swap is checked.
    pub fn interleave_profile_write(&self, write: impl FnOnce(&mut Profile) + Send + 'static) {
        if let Ok(mut t) = self.tables() {
            t.interleaved_write = Some(Box::new(write));
        }
    }

    /// Number of active profiles for `user`. Test helper for the
    /// single-active invariant.
    pub fn active_count(&self, user: UserId) -> usize {
        self.tables()
            .map(|t| {
                t.profiles
                    .values()
                    .filter(|p| p.user_id == user && p.active)
                    .count()
            })
            .unwrap_or(0)
    }
}

fn check_version(entity: String, stored: u64, incoming: u64) -> Result<(), StoreError> {
    if stored != incoming {
        return Err(StoreError::Conflict {
            entity,
            expected: incoming,
            found: stored,
        });
    }
    Ok(())
}

impl UserStore for NullStore {
    fn put_user(&self, user: &User) -> Result<(), StoreError> {
        self.tables()?.users.insert(user.id, user.clone());
        Ok(())
    }

    fn get_user(&self, id: UserId) -> Result<User, StoreError> {
        self.tables()?
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn bump_password_epoch(&self, id: UserId, now: Timestamp) -> Result<User, StoreError> {
        let mut t = self.tables()?;
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        user.password_epoch += 1;
        user.password_reset_at = Some(now);
        Ok(user.clone())
    }
}

impl ProfileStore for NullStore {
    fn insert_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        if t.profiles.contains_key(&profile.id) {
            return Err(StoreError::Duplicate(profile.id.to_string()));
        }
        let user = t
            .users
            .get(&profile.user_id)
            .ok_or_else(|| StoreError::NotFound(profile.user_id.to_string()))?;
        if profile.pii_key_epoch != user.password_epoch {
            return Err(StoreError::StaleKeyEpoch {
                profile: profile.id.to_string(),
                sealed: profile.pii_key_epoch,
                current: user.password_epoch,
            });
        }
        t.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    fn get_profile(&self, id: ProfileId) -> Result<Profile, StoreError> {
        self.tables()?
            .profiles
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn update_profile(&self, profile: &Profile) -> Result<Profile, StoreError> {
        let mut t = self.tables()?;
        let interleaved = t.interleaved_write.take();
        let stored = t
            .profiles
            .get_mut(&profile.id)
            .ok_or_else(|| StoreError::NotFound(profile.id.to_string()))?;
        if let Some(write) = interleaved {
            write(stored);
            stored.version += 1;
        }
        check_version(profile.id.to_string(), stored.version, profile.version)?;
        let mut next = profile.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    fn activate_profile(&self, profile: &Profile) -> Result<Activation, StoreError> {
        let mut t = self.tables()?;
        let stored = t
            .profiles
            .get(&profile.id)
            .ok_or_else(|| StoreError::NotFound(profile.id.to_string()))?;
        check_version(profile.id.to_string(), stored.version, profile.version)?;
        let user = t
            .users
            .get(&profile.user_id)
            .ok_or_else(|| StoreError::NotFound(profile.user_id.to_string()))?;
        if profile.pii_key_epoch != user.password_epoch {
            return Err(StoreError::StaleKeyEpoch {
                profile: profile.id.to_string(),
                sealed: profile.pii_key_epoch,
                current: user.password_epoch,
            });
        }

        let mut superseded = Vec::new();
        for other in t.profiles.values_mut() {
            if other.user_id == profile.user_id && other.id != profile.id && other.active {
                other.active = false;
                other.deactivation_reason = other
                    .deactivation_reason
                    .escalate(DeactivationReason::Superseded);
                other.version += 1;
                superseded.push(other.id);
            }
        }

        let mut next = profile.clone();
        next.active = true;
        next.version += 1;
        t.profiles.insert(next.id, next.clone());
        t.gpo_codes.retain(|c| c.profile_id != profile.id);

        Ok(Activation {
            profile: next,
            superseded,
        })
    }

    fn profiles_for_user(&self, user: UserId) -> Result<Vec<Profile>, StoreError> {
        Ok(self
            .tables()?
            .profiles
            .values()
            .filter(|p| p.user_id == user)
            .cloned()
            .collect())
    }

    fn active_profile(&self, user: UserId) -> Result<Option<Profile>, StoreError> {
        Ok(self
            .tables()?
            .profiles
            .values()
            .find(|p| p.user_id == user && p.active)
            .cloned())
    }

    fn iter_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(self.tables()?.profiles.values().cloned().collect())
    }

    fn delete_profile(&self, id: ProfileId) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        if t.profiles.remove(&id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        t.gpo_codes.retain(|c| c.profile_id != id);
        t.enrollments.retain(|_, e| e.profile_id != id);
        Ok(())
    }
}

impl EnrollmentStore for NullStore {
    fn insert_enrollment(&self, enrollment: &InPersonEnrollment) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        if t.enrollments.contains_key(&enrollment.id) {
            return Err(StoreError::Duplicate(enrollment.id.to_string()));
        }
        if t
            .enrollments
            .values()
            .any(|e| e.profile_id == enrollment.profile_id)
        {
            return Err(StoreError::Duplicate(format!(
                "enrollment for {}",
                enrollment.profile_id
            )));
        }
        t.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(())
    }

    fn get_enrollment(&self, id: EnrollmentId) -> Result<InPersonEnrollment, StoreError> {
        self.tables()?
            .enrollments
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn enrollment_for_profile(
        &self,
        profile: ProfileId,
    ) -> Result<Option<InPersonEnrollment>, StoreError> {
        Ok(self
            .tables()?
            .enrollments
            .values()
            .find(|e| e.profile_id == profile)
            .cloned())
    }

    fn enrollments_for_user(&self, user: UserId) -> Result<Vec<InPersonEnrollment>, StoreError> {
        Ok(self
            .tables()?
            .enrollments
            .values()
            .filter(|e| e.user_id == user)
            .cloned()
            .collect())
    }

    fn pending_enrollments(&self) -> Result<Vec<InPersonEnrollment>, StoreError> {
        Ok(self
            .tables()?
            .enrollments
            .values()
            .filter(|e| e.is_pending())
            .cloned()
            .collect())
    }

    fn update_enrollment(
        &self,
        enrollment: &InPersonEnrollment,
    ) -> Result<InPersonEnrollment, StoreError> {
        let mut t = self.tables()?;
        let stored = t
            .enrollments
            .get_mut(&enrollment.id)
            .ok_or_else(|| StoreError::NotFound(enrollment.id.to_string()))?;
        check_version(enrollment.id.to_string(), stored.version, enrollment.version)?;
        let mut next = enrollment.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }
}

impl GpoCodeStore for NullStore {
    fn insert_gpo_code(&self, code: &GpoConfirmationCode) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        if !t.profiles.contains_key(&code.profile_id) {
            return Err(StoreError::NotFound(code.profile_id.to_string()));
        }
        t.gpo_codes.push(code.clone());
        Ok(())
    }

    fn gpo_codes_for_profile(
        &self,
        profile: ProfileId,
    ) -> Result<Vec<GpoConfirmationCode>, StoreError> {
        let mut codes: Vec<_> = self
            .tables()?
            .gpo_codes
            .iter()
            .filter(|c| c.profile_id == profile)
            .cloned()
            .collect();
        codes.sort_by_key(|c| (c.code_sent_at, c.id));
        Ok(codes)
    }

    fn delete_gpo_codes_for_profile(&self, profile: ProfileId) -> Result<(), StoreError> {
        self.tables()?.gpo_codes.retain(|c| c.profile_id != profile);
        Ok(())
    }
}

impl AttemptStore for NullStore {
    fn put_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        self.tables()?.attempts.insert(attempt.id, attempt.clone());
        Ok(())
    }

    fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StoreError> {
        self.tables()?
            .attempts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn current_attempt_id(&self, user: UserId) -> Result<Option<AttemptId>, StoreError> {
        Ok(self.tables()?.current_attempts.get(&user).copied())
    }

    fn set_current_attempt(&self, user: UserId, id: Option<AttemptId>) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        match id {
            Some(id) => t.current_attempts.insert(user, id),
            None => t.current_attempts.remove(&user),
        };
        Ok(())
    }
}

impl RateLimitStore for NullStore {
    fn get_rate_limit(&self, key: &RateLimitKey) -> Result<Option<RateLimitRecord>, StoreError> {
        Ok(self.tables()?.rate_limits.get(key).copied())
    }

    fn compare_and_swap_rate_limit(
        &self,
        key: &RateLimitKey,
        expected: Option<&RateLimitRecord>,
        new: Option<&RateLimitRecord>,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables()?;
        if t.rate_limits.get(key) != expected {
            return Ok(false);
        }
        match new {
            Some(record) => t.rate_limits.insert(*key, *record),
            None => t.rate_limits.remove(key),
        };
        Ok(true)
    }
}

impl ProofingJobStore for NullStore {
    fn put_job(&self, job: &ProofingJob) -> Result<(), StoreError> {
        self.tables()?.jobs.insert(job.attempt_id, job.clone());
        Ok(())
    }

    fn get_job(&self, attempt: AttemptId) -> Result<Option<ProofingJob>, StoreError> {
        Ok(self.tables()?.jobs.get(&attempt).cloned())
    }

    fn delete_job(&self, attempt: AttemptId) -> Result<(), StoreError> {
        self.tables()?.jobs.remove(&attempt);
        Ok(())
    }
}

impl PhoneOtpStore for NullStore {
    fn put_otp(&self, challenge: &PhoneOtpChallenge) -> Result<(), StoreError> {
        self.tables()?
            .otps
            .insert(challenge.attempt_id, challenge.clone());
        Ok(())
    }

    fn get_otp(&self, attempt: AttemptId) -> Result<Option<PhoneOtpChallenge>, StoreError> {
        Ok(self.tables()?.otps.get(&attempt).cloned())
    }

    fn delete_otp(&self, attempt: AttemptId) -> Result<(), StoreError> {
        self.tables()?.otps.remove(&attempt);
        Ok(())
    }
}

impl AuditStore for NullStore {
    fn append_fraud_review(&self, record: &FraudReviewRecord) -> Result<(), StoreError> {
        self.tables()?.audit.push(record.clone());
        Ok(())
    }

    fn fraud_reviews_for_profile(
        &self,
        profile: ProfileId,
    ) -> Result<Vec<FraudReviewRecord>, StoreError> {
        Ok(self
            .tables()?
            .audit
            .iter()
            .filter(|r| r.profile_id == profile)
            .cloned()
            .collect())
    }
}
