//! Fraud review audit trail storage trait.

use crate::StoreError;
use idv_types::{FraudReviewRecord, ProfileId};

pub trait AuditStore {
    fn append_fraud_review(&self, record: &FraudReviewRecord) -> Result<(), StoreError>;

    /// Records for one profile, in append order.
    fn fraud_reviews_for_profile(
        &self,
        profile: ProfileId,
    ) -> Result<Vec<FraudReviewRecord>, StoreError>;
}
