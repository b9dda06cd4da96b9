//! PII sealing.
//!
//! Two key sources are supported:
//! - a password (or personal key), stretched with Argon2 over a random salt
//! - the 32-byte server key, used for in-progress attempt fields
//!
//! Both seal with ChaCha20-Poly1305 under a random 96-bit nonce. Derived keys
//! are zeroized on drop.

use argon2::Argon2;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use idv_types::SealedBlob;
use zeroize::Zeroizing;

use crate::{CryptoError, RandomSource};

const SALT_LEN: usize = 16;

fn seal_with_key(
    key: &[u8; 32],
    salt: Vec<u8>,
    plaintext: &[u8],
    rng: &dyn RandomSource,
) -> Result<SealedBlob, CryptoError> {
    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let mut nonce = [0u8; 12];
    rng.fill_bytes(&mut nonce)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encrypt)?;
    Ok(SealedBlob {
        salt,
        nonce,
        ciphertext,
    })
}

fn open_with_key(key: &[u8; 32], blob: &SealedBlob) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(&blob.nonce), blob.ciphertext.as_slice())
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Decrypt)
}

fn derive_key(secret: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(secret, salt, key.as_mut())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Seal `plaintext` under a key stretched from `secret`.
pub fn seal_with_password(
    plaintext: &[u8],
    secret: &[u8],
    rng: &dyn RandomSource,
) -> Result<SealedBlob, CryptoError> {
    let mut salt = vec![0u8; SALT_LEN];
    rng.fill_bytes(&mut salt)?;
    let key = derive_key(secret, &salt)?;
    seal_with_key(&key, salt, plaintext, rng)
}

pub fn open_with_password(
    blob: &SealedBlob,
    secret: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if blob.salt.is_empty() {
        return Err(CryptoError::InvalidKey("blob was not sealed with a password".into()));
    }
    let key = derive_key(secret, &blob.salt)?;
    open_with_key(&key, blob)
}

/// Symmetric key held by the service for sealing in-progress attempt PII.
pub struct ServerKey(Zeroizing<[u8; 32]>);

impl ServerKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(hex::decode(s).map_err(|e| CryptoError::InvalidKey(e.to_string()))?);
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("server key must be 32 bytes".into()))?;
        Ok(Self::new(arr))
    }

    pub fn generate(rng: &dyn RandomSource) -> Result<Self, CryptoError> {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes)?;
        Ok(Self::new(bytes))
    }

    pub fn seal(&self, plaintext: &[u8], rng: &dyn RandomSource) -> Result<SealedBlob, CryptoError> {
        seal_with_key(&self.0, Vec::new(), plaintext, rng)
    }

    pub fn open(&self, blob: &SealedBlob) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        open_with_key(&self.0, blob)
    }
}

impl std::fmt::Debug for ServerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServerKey(<secret>)")
    }
}
