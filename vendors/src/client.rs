//! The vendor check capability.

use async_trait::async_trait;
use idv_types::{Applicant, AttemptId, CheckKind, CheckResult, Vendor};

use crate::VendorError;

/// Everything a check may look at for one attempt.
#[derive(Clone, Debug)]
pub struct CheckRequest {
    pub attempt_id: AttemptId,
    pub applicant: Applicant,
    /// Device-profiling session from the browser.
    pub threatmetrix_session_id: Option<String>,
    pub request_ip: Option<String>,
}

/// One external check. Implementations translate their backend's answer into
/// a [`CheckResult`] and report failures to produce an answer as
/// [`VendorError`]. A business "no" is a `CheckResult` with `success = false`,
/// not an error.
#[async_trait]
pub trait VendorCheckClient: Send + Sync {
    fn vendor(&self) -> Vendor;

    fn kind(&self) -> CheckKind;

    async fn check(&self, request: &CheckRequest) -> Result<CheckResult, VendorError>;
}
