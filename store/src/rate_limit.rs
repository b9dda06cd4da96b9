//! Rate-limit counter storage trait.

use crate::StoreError;
use idv_types::{RateLimitKey, RateLimitRecord};

pub trait RateLimitStore {
    fn get_rate_limit(&self, key: &RateLimitKey) -> Result<Option<RateLimitRecord>, StoreError>;

    /// Replace the record for `key` only if it still equals `expected`.
    /// `new = None` deletes the record. Returns whether the swap happened.
    fn compare_and_swap_rate_limit(
        &self,
        key: &RateLimitKey,
        expected: Option<&RateLimitRecord>,
        new: Option<&RateLimitRecord>,
    ) -> Result<bool, StoreError>;
}
