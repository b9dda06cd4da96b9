//! Proofing components: which vendor or strategy satisfied each verification category.
//!
//! Components accumulate additively as steps complete. Within one attempt a
//! category, once set, can only be re-confirmed with the same value; a
//! different value is a conflict rather than a silent overwrite.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// A check strategy that can satisfy a category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    Mock,
    Aamva,
    LexisNexis,
    Usps,
    Socure,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Aamva => "aamva",
            Self::LexisNexis => "lexis_nexis",
            Self::Usps => "usps",
            Self::Socure => "socure",
        }
    }

    /// Parse the configuration spelling of a vendor.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mock" => Some(Self::Mock),
            "aamva" => Some(Self::Aamva),
            "lexis_nexis" | "lexisnexis" => Some(Self::LexisNexis),
            "usps" => Some(Self::Usps),
            "socure" => Some(Self::Socure),
            _ => None,
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    StateId,
    Passport,
}

/// How the claimed address was confirmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressCheck {
    /// Phone ownership confirmed by a phone-finder vendor plus OTP.
    Phone(Vendor),
    GpoLetter,
    InPerson,
}

/// Device-fraud review status reported by the device-profiling vendor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pass,
    Review,
    Reject,
}

/// Category names, as recorded on a profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentCategory {
    DocumentCheck,
    DocumentType,
    SourceCheck,
    ResolutionCheck,
    AddressCheck,
    Threatmetrix,
    ThreatmetrixReviewStatus,
}

impl ComponentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentCheck => "document_check",
            Self::DocumentType => "document_type",
            Self::SourceCheck => "source_check",
            Self::ResolutionCheck => "resolution_check",
            Self::AddressCheck => "address_check",
            Self::Threatmetrix => "threatmetrix",
            Self::ThreatmetrixReviewStatus => "threatmetrix_review_status",
        }
    }
}

/// Per-category record of the satisfying vendor/strategy for one attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofingComponents {
    pub document_check: Option<Vendor>,
    pub document_type: Option<DocumentType>,
    pub source_check: Option<Vendor>,
    pub resolution_check: Option<Vendor>,
    pub address_check: Option<AddressCheck>,
    pub threatmetrix: Option<bool>,
    pub threatmetrix_review_status: Option<ReviewStatus>,
}

impl ProofingComponents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `other` into `self`.
    ///
    /// Categories unset in `other` are left alone. Categories set in both must
    /// agree; on the first disagreement nothing is applied and a
    /// [`TypesError::ComponentConflict`] is returned.
    pub fn merge(&mut self, other: &ProofingComponents) -> Result<(), TypesError> {
        let mut merged = self.clone();
        set_once(
            &mut merged.document_check,
            &other.document_check,
            ComponentCategory::DocumentCheck,
        )?;
        set_once(
            &mut merged.document_type,
            &other.document_type,
            ComponentCategory::DocumentType,
        )?;
        set_once(
            &mut merged.source_check,
            &other.source_check,
            ComponentCategory::SourceCheck,
        )?;
        set_once(
            &mut merged.resolution_check,
            &other.resolution_check,
            ComponentCategory::ResolutionCheck,
        )?;
        set_once(
            &mut merged.address_check,
            &other.address_check,
            ComponentCategory::AddressCheck,
        )?;
        set_once(
            &mut merged.threatmetrix,
            &other.threatmetrix,
            ComponentCategory::Threatmetrix,
        )?;
        set_once(
            &mut merged.threatmetrix_review_status,
            &other.threatmetrix_review_status,
            ComponentCategory::ThreatmetrixReviewStatus,
        )?;
        *self = merged;
        Ok(())
    }

    /// Number of categories that have been satisfied.
    pub fn len(&self) -> usize {
        [
            self.document_check.is_some(),
            self.document_type.is_some(),
            self.source_check.is_some(),
            self.resolution_check.is_some(),
            self.address_check.is_some(),
            self.threatmetrix.is_some(),
            self.threatmetrix_review_status.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn set_once<T: Clone + PartialEq + fmt::Debug>(
    slot: &mut Option<T>,
    incoming: &Option<T>,
    category: ComponentCategory,
) -> Result<(), TypesError> {
    match (slot.as_ref(), incoming.as_ref()) {
        (_, None) => Ok(()),
        (None, Some(value)) => {
            *slot = Some(value.clone());
            Ok(())
        }
        (Some(existing), Some(value)) if existing == value => Ok(()),
        (Some(existing), Some(value)) => Err(TypesError::ComponentConflict {
            category: category.as_str(),
            existing: format!("{existing:?}"),
            incoming: format!("{value:?}"),
        }),
    }
}
