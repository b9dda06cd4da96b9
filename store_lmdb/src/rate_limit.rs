//! LMDB implementation of RateLimitStore.
//!
//! LMDB serializes write transactions, so reading and replacing the record
//! inside one write transaction is a true compare-and-swap.

use idv_store::{RateLimitStore, StoreError};
use idv_types::{RateLimitKey, RateLimitRecord};

use crate::environment::{encode, get_value, LmdbStore};
use crate::LmdbError;

impl RateLimitStore for LmdbStore {
    fn get_rate_limit(&self, key: &RateLimitKey) -> Result<Option<RateLimitRecord>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(get_value(&self.rate_limits_db, &rtxn, &key.to_bytes())?)
    }

    fn compare_and_swap_rate_limit(
        &self,
        key: &RateLimitKey,
        expected: Option<&RateLimitRecord>,
        new: Option<&RateLimitRecord>,
    ) -> Result<bool, StoreError> {
        let raw_key = key.to_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let current: Option<RateLimitRecord> = get_value(&self.rate_limits_db, &wtxn, &raw_key)?;
        if current.as_ref() != expected {
            return Ok(false);
        }
        match new {
            Some(record) => self
                .rate_limits_db
                .put(&mut wtxn, &raw_key, &encode(record)?)
                .map_err(LmdbError::from)?,
            None => {
                self.rate_limits_db
                    .delete(&mut wtxn, &raw_key)
                    .map_err(LmdbError::from)?;
            }
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(true)
    }
}
