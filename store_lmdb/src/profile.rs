//! LMDB implementation of ProfileStore.
//!
//! `profiles_by_user` holds `user ++ profile` keys so a user's profiles are a
//! prefix scan. Activation and cascade delete each run in one write
//! transaction.

use heed::RwTxn;
use idv_store::{Activation, ProfileStore, StoreError};
use idv_types::{DeactivationReason, Profile, ProfileId, User, UserId};

use crate::environment::{all_values, composite_key, encode, get_value, prefix_keys, LmdbStore};
use crate::LmdbError;

impl LmdbStore {
    fn user_profile_ids(&self, txn: &heed::RoTxn<'_>, user: UserId) -> Result<Vec<ProfileId>, LmdbError> {
        let keys = prefix_keys(&self.profiles_by_user_db, txn, &user.to_be_bytes())?;
        Ok(keys
            .iter()
            .filter_map(|k| k.get(8..16))
            .filter_map(|b| <[u8; 8]>::try_from(b).ok())
            .map(|b| ProfileId::new(u64::from_be_bytes(b)))
            .collect())
    }

    fn write_profile(&self, wtxn: &mut RwTxn<'_>, profile: &Profile) -> Result<(), LmdbError> {
        self.profiles_db
            .put(wtxn, &profile.id.to_be_bytes(), &encode(profile)?)?;
        Ok(())
    }

    fn check_key_epoch(&self, txn: &heed::RoTxn<'_>, profile: &Profile) -> Result<(), StoreError> {
        let user: User = get_value(&self.users_db, txn, &profile.user_id.to_be_bytes())?
            .ok_or_else(|| StoreError::NotFound(profile.user_id.to_string()))?;
        if user.password_epoch != profile.pii_key_epoch {
            return Err(StoreError::StaleKeyEpoch {
                profile: profile.id.to_string(),
                sealed: profile.pii_key_epoch,
                current: user.password_epoch,
            });
        }
        Ok(())
    }

    fn load_for_swap(&self, txn: &heed::RoTxn<'_>, profile: &Profile) -> Result<Profile, StoreError> {
        let stored: Profile = get_value(&self.profiles_db, txn, &profile.id.to_be_bytes())?
            .ok_or_else(|| StoreError::NotFound(profile.id.to_string()))?;
        if stored.version != profile.version {
            return Err(StoreError::Conflict {
                entity: profile.id.to_string(),
                expected: profile.version,
                found: stored.version,
            });
        }
        Ok(stored)
    }
}

impl ProfileStore for LmdbStore {
    fn insert_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let key = profile.id.to_be_bytes();
        if self
            .profiles_db
            .get(&wtxn, &key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(profile.id.to_string()));
        }
        self.check_key_epoch(&wtxn, profile)?;
        self.write_profile(&mut wtxn, profile)?;
        let index = composite_key(&[&profile.user_id.to_be_bytes(), &key]);
        self.profiles_by_user_db
            .put(&mut wtxn, &index, &[])
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_profile(&self, id: ProfileId) -> Result<Profile, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        get_value(&self.profiles_db, &rtxn, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn update_profile(&self, profile: &Profile) -> Result<Profile, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.load_for_swap(&wtxn, profile)?;
        let mut next = profile.clone();
        next.version += 1;
        self.write_profile(&mut wtxn, &next)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(next)
    }

    fn activate_profile(&self, profile: &Profile) -> Result<Activation, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.load_for_swap(&wtxn, profile)?;
        self.check_key_epoch(&wtxn, profile)?;

        let mut superseded = Vec::new();
        for other_id in self.user_profile_ids(&wtxn, profile.user_id)? {
            if other_id == profile.id {
                continue;
            }
            let other: Option<Profile> =
                get_value(&self.profiles_db, &wtxn, &other_id.to_be_bytes())?;
            let Some(mut other) = other else { continue };
            if !other.active {
                continue;
            }
            other.active = false;
            other.deactivation_reason = other
                .deactivation_reason
                .escalate(DeactivationReason::Superseded);
            other.version += 1;
            self.write_profile(&mut wtxn, &other)?;
            superseded.push(other_id);
        }

        let mut next = profile.clone();
        next.active = true;
        next.version += 1;
        self.write_profile(&mut wtxn, &next)?;
        self.delete_codes_in(&mut wtxn, profile.id)?;
        wtxn.commit().map_err(LmdbError::from)?;

        tracing::debug!(profile = %next.id, superseded = superseded.len(), "profile activated");
        Ok(Activation {
            profile: next,
            superseded,
        })
    }

    fn profiles_for_user(&self, user: UserId) -> Result<Vec<Profile>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut out = Vec::new();
        for id in self.user_profile_ids(&rtxn, user)? {
            if let Some(p) = get_value(&self.profiles_db, &rtxn, &id.to_be_bytes())? {
                out.push(p);
            }
        }
        Ok(out)
    }

    fn active_profile(&self, user: UserId) -> Result<Option<Profile>, StoreError> {
        Ok(self
            .profiles_for_user(user)?
            .into_iter()
            .find(|p| p.active))
    }

    fn iter_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(all_values(&self.profiles_db, &rtxn)?)
    }

    fn delete_profile(&self, id: ProfileId) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let key = id.to_be_bytes();
        let profile: Profile = get_value(&self.profiles_db, &wtxn, &key)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.profiles_db
            .delete(&mut wtxn, &key)
            .map_err(LmdbError::from)?;
        let index = composite_key(&[&profile.user_id.to_be_bytes(), &key]);
        self.profiles_by_user_db
            .delete(&mut wtxn, &index)
            .map_err(LmdbError::from)?;
        self.delete_codes_in(&mut wtxn, id)?;
        self.delete_enrollment_in(&mut wtxn, id)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
