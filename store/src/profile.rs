//! Profile storage trait.

use crate::StoreError;
use idv_types::{Profile, ProfileId, UserId};

/// Outcome of a committed activation.
#[derive(Clone, Debug)]
pub struct Activation {
    /// The activated profile as stored.
    pub profile: Profile,
    /// Previously active profiles deactivated in the same transaction.
    pub superseded: Vec<ProfileId>,
}

pub trait ProfileStore {
    /// Insert a new profile. Fails with `Duplicate` if the id exists and with
    /// `StaleKeyEpoch` if `pii_key_epoch` is behind the user's password epoch.
    fn insert_profile(&self, profile: &Profile) -> Result<(), StoreError>;

    fn get_profile(&self, id: ProfileId) -> Result<Profile, StoreError>;

    /// Compare-and-swap write. `profile.version` must equal the stored version;
    /// the stored copy gets `version + 1` and is returned.
    fn update_profile(&self, profile: &Profile) -> Result<Profile, StoreError>;

    /// Activate `profile` in one transaction:
    /// - compare-and-swap on `profile.version`
    /// - refuse with `StaleKeyEpoch` if the user's password epoch moved on
    /// - store it with `active = true`
    /// - deactivate every other active profile of the user as superseded
    /// - delete the profile's mailed confirmation codes
    fn activate_profile(&self, profile: &Profile) -> Result<Activation, StoreError>;

    fn profiles_for_user(&self, user: UserId) -> Result<Vec<Profile>, StoreError>;

    fn active_profile(&self, user: UserId) -> Result<Option<Profile>, StoreError>;

    fn iter_profiles(&self) -> Result<Vec<Profile>, StoreError>;

    /// Delete a profile together with its mailed codes and enrollment.
    fn delete_profile(&self, id: ProfileId) -> Result<(), StoreError>;
}

/// How many times a read-modify-write re-reads after losing a race.
pub const MAX_CAS_ROUNDS: usize = 16;

/// Read the profile, let `modify` change it, and write it back with
/// compare-and-swap, re-reading on conflict. `modify` returning `false`
/// leaves the stored copy untouched.
pub fn update_profile_with<S, F>(store: &S, id: ProfileId, mut modify: F) -> Result<Profile, StoreError>
where
    S: ProfileStore + ?Sized,
    F: FnMut(&mut Profile) -> bool,
{
    let mut last = None;
    for _ in 0..MAX_CAS_ROUNDS {
        let mut profile = store.get_profile(id)?;
        if !modify(&mut profile) {
            return Ok(profile);
        }
        match store.update_profile(&profile) {
            Ok(stored) => return Ok(stored),
            Err(e) if e.is_conflict() => last = Some(e),
            Err(e) => return Err(e),
        }
    }
    Err(last.unwrap_or_else(|| StoreError::Backend(format!("profile {id} kept changing"))))
}
