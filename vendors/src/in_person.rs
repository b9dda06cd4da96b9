//! In-person proofing provider interface.

use async_trait::async_trait;
use idv_types::{Applicant, Timestamp};

use crate::VendorError;

/// Provider-side status of one enrollment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UspsStatus {
    /// The applicant has not visited yet.
    InProgress,
    Passed,
    Failed { fraud_suspected: bool },
    /// The provider's validity window closed without a visit.
    Expired,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UspsProofingResult {
    pub status: UspsStatus,
    /// When the visit ended, as reported by the provider.
    pub transaction_end: Option<Timestamp>,
}

impl UspsProofingResult {
    pub fn new(status: UspsStatus) -> Self {
        Self {
            status,
            transaction_end: None,
        }
    }
}

#[async_trait]
pub trait InPersonProofer: Send + Sync {
    /// Register an applicant with the provider under `unique_id`.
    async fn schedule_in_person_enrollment(
        &self,
        unique_id: &str,
        enrollment_code: &str,
        applicant: &Applicant,
    ) -> Result<(), VendorError>;

    async fn request_proofing_results(
        &self,
        unique_id: &str,
        enrollment_code: &str,
    ) -> Result<UspsProofingResult, VendorError>;
}
