//! Keyed fingerprints of one-time codes.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{normalize_code, CryptoError};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over the normalized code with a server-side secret.
#[derive(Clone)]
pub struct Fingerprinter {
    mac: HmacSha256,
}

impl Fingerprinter {
    pub fn new(secret: &[u8]) -> Result<Self, CryptoError> {
        if secret.len() < 16 {
            return Err(CryptoError::InvalidKey(
                "fingerprint secret shorter than 16 bytes".into(),
            ));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Hex fingerprint of `code` after normalization.
    pub fn fingerprint(&self, code: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(normalize_code(code).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time comparison of `code` against a stored fingerprint.
    pub fn matches(&self, code: &str, fingerprint: &str) -> bool {
        let Ok(expected) = hex::decode(fingerprint) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(normalize_code(code).as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

impl std::fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Fingerprinter(<secret>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> Fingerprinter {
        Fingerprinter::new(b"0123456789abcdef0123456789abcdef").unwrap()
    }

    #[test]
    fn fingerprint_ignores_formatting() {
        let f = fp();
        assert_eq!(f.fingerprint("abcd-efgh"), f.fingerprint("ABCDEFGH"));
        assert!(f.matches("abcd efgh", &f.fingerprint("ABCDEFGH")));
    }

    #[test]
    fn different_codes_do_not_match() {
        let f = fp();
        assert!(!f.matches("ABCDEFGX", &f.fingerprint("ABCDEFGH")));
        assert!(!f.matches("ABCDEFGH", "not-hex"));
    }

    #[test]
    fn fingerprint_never_contains_the_code() {
        let f = fp();
        assert!(!f.fingerprint("123456").contains("123456"));
    }

    #[test]
    fn short_secret_is_rejected() {
        assert!(Fingerprinter::new(b"short").is_err());
    }
}
