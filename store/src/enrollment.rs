//! In-person enrollment storage trait.

use crate::StoreError;
use idv_types::{EnrollmentId, InPersonEnrollment, ProfileId, UserId};

pub trait EnrollmentStore {
    fn insert_enrollment(&self, enrollment: &InPersonEnrollment) -> Result<(), StoreError>;

    fn get_enrollment(&self, id: EnrollmentId) -> Result<InPersonEnrollment, StoreError>;

    fn enrollment_for_profile(
        &self,
        profile: ProfileId,
    ) -> Result<Option<InPersonEnrollment>, StoreError>;

    fn enrollments_for_user(&self, user: UserId) -> Result<Vec<InPersonEnrollment>, StoreError>;

    /// Enrollments still awaiting a result from the proofing provider.
    fn pending_enrollments(&self) -> Result<Vec<InPersonEnrollment>, StoreError>;

    /// Compare-and-swap write on `version`; returns the stored copy.
    fn update_enrollment(
        &self,
        enrollment: &InPersonEnrollment,
    ) -> Result<InPersonEnrollment, StoreError>;
}

/// Compare-and-swap read-modify-write of an enrollment, re-reading on
/// conflict. `modify` returning `false` leaves the stored copy untouched.
pub fn update_enrollment_with<S, F>(
    store: &S,
    id: EnrollmentId,
    mut modify: F,
) -> Result<InPersonEnrollment, StoreError>
where
    S: EnrollmentStore + ?Sized,
    F: FnMut(&mut InPersonEnrollment) -> bool,
{
    let mut last = None;
    for _ in 0..crate::profile::MAX_CAS_ROUNDS {
        let mut enrollment = store.get_enrollment(id)?;
        if !modify(&mut enrollment) {
            return Ok(enrollment);
        }
        match store.update_enrollment(&enrollment) {
            Ok(stored) => return Ok(stored),
            Err(e) if e.is_conflict() => last = Some(e),
            Err(e) => return Err(e),
        }
    }
    Err(last.unwrap_or_else(|| StoreError::Backend(format!("enrollment {id} kept changing"))))
}
