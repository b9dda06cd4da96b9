//! LMDB implementation of PhoneOtpStore.

use idv_store::{PhoneOtpStore, StoreError};
use idv_types::{AttemptId, PhoneOtpChallenge};

use crate::environment::{encode, get_value, LmdbStore};
use crate::LmdbError;

impl PhoneOtpStore for LmdbStore {
    fn put_otp(&self, challenge: &PhoneOtpChallenge) -> Result<(), StoreError> {
        let bytes = encode(challenge)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.phone_otps_db
            .put(&mut wtxn, challenge.attempt_id.as_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_otp(&self, attempt: AttemptId) -> Result<Option<PhoneOtpChallenge>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(get_value(&self.phone_otps_db, &rtxn, attempt.as_bytes())?)
    }

    fn delete_otp(&self, attempt: AttemptId) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.phone_otps_db
            .delete(&mut wtxn, attempt.as_bytes())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
