//! Personally identifiable information.
//!
//! PII types never print their contents through `Debug`, and zeroize on request.
//! Anything persisted outside a [`SealedBlob`] must be non-sensitive.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

use crate::DocumentType;

/// A Social Security number, digits only.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct Ssn(String);

impl Ssn {
    /// Build from user input, stripping separators. Validation lives with the step
    /// that accepts the input.
    pub fn new(raw: &str) -> Self {
        Self(raw.chars().filter(|c| c.is_ascii_digit()).collect())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn area(&self) -> &str {
        self.0.get(..3).unwrap_or("")
    }
}

impl fmt::Debug for Ssn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ssn(<redacted>)")
    }
}

/// A postal address. Not secret on its own; echoed back on revisit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct Address {
    pub address1: String,
    pub address2: Option<String>,
    pub city: String,
    pub state: String,
    pub zipcode: String,
}

/// Fields extracted from an identity document.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct DocumentPii {
    pub first_name: String,
    pub last_name: String,
    /// ISO-8601 date of birth.
    pub dob: String,
    pub address: Address,
    pub id_number: String,
    pub id_jurisdiction: String,
    #[zeroize(skip)]
    pub document_type: DocumentType,
}

impl fmt::Debug for DocumentPii {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentPii")
            .field("document_type", &self.document_type)
            .field("id_jurisdiction", &self.id_jurisdiction)
            .finish_non_exhaustive()
    }
}

/// Everything vendors receive about the person being proofed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct Applicant {
    pub document: DocumentPii,
    pub ssn: Ssn,
    pub phone: Option<String>,
}

impl fmt::Debug for Applicant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Applicant")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

/// Authenticated ciphertext plus the parameters needed to open it.
///
/// `salt` is empty when the key is not password-derived.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlob {
    pub salt: Vec<u8>,
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

impl fmt::Debug for SealedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedBlob({} bytes)", self.ciphertext.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssn_strips_separators() {
        let ssn = Ssn::new("123-45-6789");
        assert_eq!(ssn.expose(), "123456789");
        assert_eq!(ssn.area(), "123");
    }

    #[test]
    fn debug_output_never_contains_pii() {
        let applicant = Applicant {
            document: DocumentPii {
                first_name: "Fakey".into(),
                last_name: "McFakerson".into(),
                dob: "1938-10-06".into(),
                address: Address::default(),
                id_number: "1111111111111".into(),
                id_jurisdiction: "ND".into(),
                document_type: DocumentType::StateId,
            },
            ssn: Ssn::new("900-12-3456"),
            phone: Some("+15555550100".into()),
        };
        let printed = format!("{applicant:?}");
        assert!(!printed.contains("Fakey"));
        assert!(!printed.contains("900123456"));
        assert!(!printed.contains("1938"));
        assert!(!printed.contains("5555550100"));
    }
}
