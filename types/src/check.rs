//! Structured results returned by vendor checks.
//!
//! Vendor clients translate whatever their backend returns into a
//! [`CheckResult`]. Nothing above the client boundary sees raw vendor errors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::{DocumentType, ReviewStatus, Vendor};

/// The checks a proofing attempt can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    DocumentAuth,
    /// Biographic resolution against credit-header style data.
    Resolution,
    /// State-ID (AAMVA) record check.
    SourceCheck,
    DeviceFraud,
    /// Phone-finder check that the phone belongs to the applicant.
    AddressCheck,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentAuth => "document_auth",
            Self::Resolution => "resolution",
            Self::SourceCheck => "source_check",
            Self::DeviceFraud => "device_fraud",
            Self::AddressCheck => "address_check",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A biographic attribute a vendor can vouch for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    FirstName,
    LastName,
    Dob,
    Address,
    Ssn,
    StateIdNumber,
}

/// One machine-readable failure reason.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub code: String,
    pub attribute: Option<Attribute>,
}

impl Reason {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            attribute: None,
        }
    }

    pub fn for_attribute(code: impl Into<String>, attribute: Attribute) -> Self {
        Self {
            code: code.into(),
            attribute: Some(attribute),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub vendor: Vendor,
    pub success: bool,
    pub transaction_id: Option<String>,
    pub reasons: Vec<Reason>,
    /// The vendor did not answer within the timeout after all retries.
    pub timed_out: bool,
    /// Classified transport or vendor error, if the call never produced a verdict.
    pub exception: Option<String>,
    /// Device-fraud verdict; `None` for other kinds.
    pub review_status: Option<ReviewStatus>,
    pub verified_attributes: BTreeSet<Attribute>,
    /// Attributes the vendor could not confirm but another source might.
    pub attributes_requiring_additional_verification: BTreeSet<Attribute>,
    pub can_pass_with_additional_verification: bool,
    /// Set by document authentication.
    pub document_type: Option<DocumentType>,
}

impl CheckResult {
    fn blank(kind: CheckKind, vendor: Vendor, success: bool) -> Self {
        Self {
            kind,
            vendor,
            success,
            transaction_id: None,
            reasons: Vec::new(),
            timed_out: false,
            exception: None,
            review_status: None,
            verified_attributes: BTreeSet::new(),
            attributes_requiring_additional_verification: BTreeSet::new(),
            can_pass_with_additional_verification: false,
            document_type: None,
        }
    }

    pub fn passed(kind: CheckKind, vendor: Vendor) -> Self {
        Self::blank(kind, vendor, true)
    }

    pub fn failed(kind: CheckKind, vendor: Vendor, reasons: Vec<Reason>) -> Self {
        let mut result = Self::blank(kind, vendor, false);
        result.reasons = reasons;
        result
    }

    /// Retries exhausted without a verdict.
    pub fn timed_out(kind: CheckKind, vendor: Vendor, exception: Option<String>) -> Self {
        let mut result = Self::blank(kind, vendor, false);
        result.timed_out = true;
        result.exception = exception;
        result
    }

    pub fn with_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }

    pub fn with_review_status(mut self, status: ReviewStatus) -> Self {
        self.review_status = Some(status);
        self
    }

    pub fn with_verified(mut self, attributes: impl IntoIterator<Item = Attribute>) -> Self {
        self.verified_attributes.extend(attributes);
        self
    }

    /// Device-fraud hard reject.
    pub fn is_hard_reject(&self) -> bool {
        self.kind == CheckKind::DeviceFraud && self.review_status == Some(ReviewStatus::Reject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_device_fraud_rejects_are_hard_rejects() {
        let fraud = CheckResult::passed(CheckKind::DeviceFraud, Vendor::Mock)
            .with_review_status(ReviewStatus::Reject);
        assert!(fraud.is_hard_reject());
        let other = CheckResult::passed(CheckKind::Resolution, Vendor::Mock)
            .with_review_status(ReviewStatus::Reject);
        assert!(!other.is_hard_reject());
    }

    #[test]
    fn timed_out_is_never_success() {
        let r = CheckResult::timed_out(CheckKind::Resolution, Vendor::LexisNexis, None);
        assert!(r.timed_out);
        assert!(!r.success);
    }
}
