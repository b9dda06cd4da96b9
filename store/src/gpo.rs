//! Mailed confirmation code storage trait.

use crate::StoreError;
use idv_types::{GpoConfirmationCode, ProfileId};

pub trait GpoCodeStore {
    fn insert_gpo_code(&self, code: &GpoConfirmationCode) -> Result<(), StoreError>;

    /// Codes for a profile, oldest first.
    fn gpo_codes_for_profile(
        &self,
        profile: ProfileId,
    ) -> Result<Vec<GpoConfirmationCode>, StoreError>;

    fn delete_gpo_codes_for_profile(&self, profile: ProfileId) -> Result<(), StoreError>;
}
