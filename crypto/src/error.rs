use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("randomness unavailable: {0}")]
    Random(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("encryption failed")]
    Encrypt,

    /// Wrong key or tampered ciphertext.
    #[error("decryption failed: authentication check failed")]
    Decrypt,
}
