//! LMDB implementation of GpoCodeStore.

use heed::RwTxn;
use idv_store::{GpoCodeStore, StoreError};
use idv_types::{GpoConfirmationCode, ProfileId};

use crate::environment::{composite_key, encode, prefix_keys, prefix_values, LmdbStore};
use crate::LmdbError;

impl LmdbStore {
    pub(crate) fn delete_codes_in(
        &self,
        wtxn: &mut RwTxn<'_>,
        profile: ProfileId,
    ) -> Result<(), LmdbError> {
        let keys = prefix_keys(&self.gpo_codes_db, wtxn, &profile.to_be_bytes())?;
        for key in keys {
            self.gpo_codes_db.delete(wtxn, &key)?;
        }
        Ok(())
    }
}

impl GpoCodeStore for LmdbStore {
    fn insert_gpo_code(&self, code: &GpoConfirmationCode) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self
            .profiles_db
            .get(&wtxn, &code.profile_id.to_be_bytes())
            .map_err(LmdbError::from)?
            .is_none()
        {
            return Err(StoreError::NotFound(code.profile_id.to_string()));
        }
        let key = composite_key(&[
            &code.profile_id.to_be_bytes(),
            &code.code_sent_at.as_secs().to_be_bytes(),
            &code.id.to_be_bytes(),
        ]);
        self.gpo_codes_db
            .put(&mut wtxn, &key, &encode(code)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn gpo_codes_for_profile(
        &self,
        profile: ProfileId,
    ) -> Result<Vec<GpoConfirmationCode>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(prefix_values(&self.gpo_codes_db, &rtxn, &profile.to_be_bytes())?)
    }

    fn delete_gpo_codes_for_profile(&self, profile: ProfileId) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.delete_codes_in(&mut wtxn, profile)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
