//! LMDB implementation of AuditStore.
//!
//! Keys are `profile ++ seq`, where `seq` is the database length at append
//! time, so a prefix scan returns a profile's records in append order.

use idv_store::{AuditStore, StoreError};
use idv_types::{FraudReviewRecord, ProfileId};

use crate::environment::{composite_key, encode, prefix_values, LmdbStore};
use crate::LmdbError;

impl AuditStore for LmdbStore {
    fn append_fraud_review(&self, record: &FraudReviewRecord) -> Result<(), StoreError> {
        let bytes = encode(record)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let seq = self.fraud_reviews_db.len(&wtxn).map_err(LmdbError::from)?;
        let key = composite_key(&[&record.profile_id.to_be_bytes(), &seq.to_be_bytes()]);
        self.fraud_reviews_db
            .put(&mut wtxn, &key, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn fraud_reviews_for_profile(
        &self,
        profile: ProfileId,
    ) -> Result<Vec<FraudReviewRecord>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(prefix_values(
            &self.fraud_reviews_db,
            &rtxn,
            &profile.to_be_bytes(),
        )?)
    }
}
