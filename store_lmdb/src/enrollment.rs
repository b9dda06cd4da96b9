//! LMDB implementation of EnrollmentStore.

use heed::RwTxn;
use idv_store::{EnrollmentStore, StoreError};
use idv_types::{EnrollmentId, InPersonEnrollment, ProfileId, UserId};

use crate::environment::{all_values, encode, get_value, LmdbStore};
use crate::LmdbError;

impl LmdbStore {
    pub(crate) fn delete_enrollment_in(
        &self,
        wtxn: &mut RwTxn<'_>,
        profile: ProfileId,
    ) -> Result<(), LmdbError> {
        let id: Option<[u8; 8]> = self
            .enrollment_by_profile_db
            .get(wtxn, &profile.to_be_bytes())?
            .and_then(|b| <[u8; 8]>::try_from(b).ok());
        if let Some(id) = id {
            self.enrollments_db.delete(wtxn, &id)?;
            self.enrollment_by_profile_db
                .delete(wtxn, &profile.to_be_bytes())?;
        }
        Ok(())
    }
}

impl EnrollmentStore for LmdbStore {
    fn insert_enrollment(&self, enrollment: &InPersonEnrollment) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let key = enrollment.id.to_be_bytes();
        let profile_key = enrollment.profile_id.to_be_bytes();
        if self
            .enrollments_db
            .get(&wtxn, &key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(enrollment.id.to_string()));
        }
        if self
            .enrollment_by_profile_db
            .get(&wtxn, &profile_key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(format!(
                "enrollment for {}",
                enrollment.profile_id
            )));
        }
        self.enrollments_db
            .put(&mut wtxn, &key, &encode(enrollment)?)
            .map_err(LmdbError::from)?;
        self.enrollment_by_profile_db
            .put(&mut wtxn, &profile_key, &key)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_enrollment(&self, id: EnrollmentId) -> Result<InPersonEnrollment, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        get_value(&self.enrollments_db, &rtxn, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn enrollment_for_profile(
        &self,
        profile: ProfileId,
    ) -> Result<Option<InPersonEnrollment>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let Some(id) = self
            .enrollment_by_profile_db
            .get(&rtxn, &profile.to_be_bytes())
            .map_err(LmdbError::from)?
        else {
            return Ok(None);
        };
        Ok(get_value(&self.enrollments_db, &rtxn, id)?)
    }

    fn enrollments_for_user(&self, user: UserId) -> Result<Vec<InPersonEnrollment>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let all: Vec<InPersonEnrollment> = all_values(&self.enrollments_db, &rtxn)?;
        Ok(all.into_iter().filter(|e| e.user_id == user).collect())
    }

    fn pending_enrollments(&self) -> Result<Vec<InPersonEnrollment>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let all: Vec<InPersonEnrollment> = all_values(&self.enrollments_db, &rtxn)?;
        Ok(all.into_iter().filter(|e| e.is_pending()).collect())
    }

    fn update_enrollment(
        &self,
        enrollment: &InPersonEnrollment,
    ) -> Result<InPersonEnrollment, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let key = enrollment.id.to_be_bytes();
        let stored: InPersonEnrollment = get_value(&self.enrollments_db, &wtxn, &key)?
            .ok_or_else(|| StoreError::NotFound(enrollment.id.to_string()))?;
        if stored.version != enrollment.version {
            return Err(StoreError::Conflict {
                entity: enrollment.id.to_string(),
                expected: enrollment.version,
                found: stored.version,
            });
        }
        let mut next = enrollment.clone();
        next.version += 1;
        self.enrollments_db
            .put(&mut wtxn, &key, &encode(&next)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(next)
    }
}
