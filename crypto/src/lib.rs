//! Cryptographic primitives for the identity-verification engine.
//!
//! - **OS randomness** behind a [`RandomSource`] seam for ids, OTPs and mailed codes
//! - **HMAC-SHA256** fingerprints so one-time codes are never stored in plaintext
//! - **Blake2b** digests of step payloads for idempotent resubmission
//! - **Argon2 + ChaCha20-Poly1305** sealing of PII under a password-derived key,
//!   a personal key, or the server key

pub mod codes;
pub mod encryption;
pub mod error;
pub mod fingerprint;
pub mod hash;
pub mod random;

pub use codes::{generate_gpo_code, generate_numeric_code, generate_personal_key, normalize_code};
pub use encryption::{open_with_password, seal_with_password, ServerKey};
pub use error::CryptoError;
pub use fingerprint::Fingerprinter;
pub use hash::{blake2b_256, blake2b_256_multi, payload_digest};
pub use random::{new_attempt_id, random_hex, random_u64, OsRandom, RandomSource};
