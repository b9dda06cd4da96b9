//! LMDB implementation of UserStore.

use idv_store::{StoreError, UserStore};
use idv_types::{Timestamp, User, UserId};

use crate::environment::{encode, get_value, LmdbStore};
use crate::LmdbError;

impl UserStore for LmdbStore {
    fn put_user(&self, user: &User) -> Result<(), StoreError> {
        let bytes = encode(user)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.users_db
            .put(&mut wtxn, &user.id.to_be_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_user(&self, id: UserId) -> Result<User, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        get_value(&self.users_db, &rtxn, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn bump_password_epoch(&self, id: UserId, now: Timestamp) -> Result<User, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut user: User = get_value(&self.users_db, &wtxn, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        user.password_epoch += 1;
        user.password_reset_at = Some(now);
        self.users_db
            .put(&mut wtxn, &id.to_be_bytes(), &encode(&user)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(user)
    }
}
