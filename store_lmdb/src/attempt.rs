//! LMDB implementation of AttemptStore.

use idv_store::{AttemptStore, StoreError};
use idv_types::{Attempt, AttemptId, UserId};

use crate::environment::{encode, get_value, LmdbStore};
use crate::LmdbError;

impl AttemptStore for LmdbStore {
    fn put_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        let bytes = encode(attempt)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.attempts_db
            .put(&mut wtxn, attempt.id.as_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        get_value(&self.attempts_db, &rtxn, id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn current_attempt_id(&self, user: UserId) -> Result<Option<AttemptId>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let raw = self
            .current_attempts_db
            .get(&rtxn, &user.to_be_bytes())
            .map_err(LmdbError::from)?;
        match raw {
            None => Ok(None),
            Some(bytes) => <[u8; 16]>::try_from(bytes)
                .map(|b| Some(AttemptId::new(b)))
                .map_err(|_| StoreError::Corruption(format!("current attempt for {user}"))),
        }
    }

    fn set_current_attempt(&self, user: UserId, id: Option<AttemptId>) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let key = user.to_be_bytes();
        match id {
            Some(id) => self
                .current_attempts_db
                .put(&mut wtxn, &key, id.as_bytes())
                .map_err(LmdbError::from)?,
            None => {
                self.current_attempts_db
                    .delete(&mut wtxn, &key)
                    .map_err(LmdbError::from)?;
            }
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
