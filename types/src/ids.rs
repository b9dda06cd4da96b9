//! Identifier newtypes.
//!
//! Numeric ids are opaque `u64`s allocated by the caller (random or sequence).
//! Attempt ids are 128-bit random tokens because they fence asynchronous
//! results and must never be guessable or reused.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub fn get(&self) -> u64 {
                self.0
            }

            /// Big-endian bytes, used as a storage key.
            pub fn to_be_bytes(&self) -> [u8; 8] {
                self.0.to_be_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

numeric_id!(
    /// A stable user identity. Survives resets, password changes and reproofing.
    UserId,
    "user"
);
numeric_id!(
    /// One verification outcome record.
    ProfileId,
    "profile"
);
numeric_id!(
    /// One in-person proofing enrollment.
    EnrollmentId,
    "enrollment"
);
numeric_id!(GpoCodeId, "gpo");

/// Identifier of one traversal of the step machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttemptId([u8; 16]);

impl AttemptId {
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the 32-character hex form produced by [`AttemptId::to_hex`].
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        let bytes = hex::decode(s).map_err(|e| TypesError::InvalidAttemptId(e.to_string()))?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| TypesError::InvalidAttemptId(format!("expected 16 bytes: {s}")))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt-{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_display_with_prefix() {
        assert_eq!(UserId::new(7).to_string(), "user-7");
        assert_eq!(ProfileId::new(42).to_string(), "profile-42");
    }

    #[test]
    fn attempt_id_hex_roundtrip() {
        let id = AttemptId::new([0xab; 16]);
        let parsed = AttemptId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn attempt_id_rejects_short_hex() {
        assert!(AttemptId::from_hex("abcd").is_err());
        assert!(AttemptId::from_hex("not hex").is_err());
    }
}
