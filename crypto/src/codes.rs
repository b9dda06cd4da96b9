//! One-time code generation and normalization.
//!
//! Numeric OTPs are used for phone confirmation and in-person enrollment
//! codes. Mailed letter codes and personal keys use Crockford base32, which
//! drops `I`, `L`, `O` and `U` so handwritten or typed codes survive common
//! misreads after [`normalize_code`].

use crate::{CryptoError, RandomSource};

const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Draw `len` symbols uniformly from `alphabet` (rejection sampling).
fn random_symbols(
    rng: &dyn RandomSource,
    alphabet: &[u8],
    len: usize,
) -> Result<String, CryptoError> {
    let n = alphabet.len();
    let limit = 256 - (256 % n);
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 32];
    while out.len() < len {
        rng.fill_bytes(&mut buf)?;
        for byte in buf {
            if (byte as usize) < limit {
                out.push(alphabet[byte as usize % n] as char);
                if out.len() == len {
                    break;
                }
            }
        }
    }
    Ok(out)
}

pub fn generate_numeric_code(rng: &dyn RandomSource, len: usize) -> Result<String, CryptoError> {
    random_symbols(rng, b"0123456789", len)
}

pub fn generate_gpo_code(rng: &dyn RandomSource, len: usize) -> Result<String, CryptoError> {
    random_symbols(rng, CROCKFORD, len)
}

/// A 16-symbol personal key, shown to the user as four dash-separated groups.
pub fn generate_personal_key(rng: &dyn RandomSource) -> Result<String, CryptoError> {
    let raw = random_symbols(rng, CROCKFORD, 16)?;
    let groups: Vec<&str> = (0..4).map(|i| &raw[i * 4..i * 4 + 4]).collect();
    Ok(groups.join("-"))
}

/// Canonical form of a user-typed code: uppercase, separators removed,
/// Crockford lookalikes folded (`O`→`0`, `I`/`L`→`1`).
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| match c.to_ascii_uppercase() {
            'O' => '0',
            'I' | 'L' => '1',
            other => other,
        })
        .collect()
}
