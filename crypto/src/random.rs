//! Randomness source.

use idv_types::AttemptId;

use crate::CryptoError;

/// Source of random bytes. Production uses [`OsRandom`]; tests inject a
/// deterministic source.
pub trait RandomSource: Send + Sync {
    fn fill_bytes(&self, buf: &mut [u8]) -> Result<(), CryptoError>;
}

/// The operating system CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, buf: &mut [u8]) -> Result<(), CryptoError> {
        getrandom::getrandom(buf).map_err(|e| CryptoError::Random(e.to_string()))
    }
}

pub fn random_u64(rng: &dyn RandomSource) -> Result<u64, CryptoError> {
    let mut buf = [0u8; 8];
    rng.fill_bytes(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

/// A fresh 128-bit attempt id.
pub fn new_attempt_id(rng: &dyn RandomSource) -> Result<AttemptId, CryptoError> {
    let mut buf = [0u8; 16];
    rng.fill_bytes(&mut buf)?;
    Ok(AttemptId::new(buf))
}

/// `len` random bytes, hex encoded.
pub fn random_hex(rng: &dyn RandomSource, len: usize) -> Result<String, CryptoError> {
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf)?;
    Ok(hex::encode(buf))
}
