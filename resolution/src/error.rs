use idv_crypto::CryptoError;
use idv_ratelimit::RateLimitError;
use idv_store::StoreError;
use idv_types::{ProfileId, RateLimitType, Timestamp, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The review window closed; only the sweep may act on this profile now.
    #[error("review window for {profile} closed at {closed_at}")]
    ReviewWindowExpired {
        profile: ProfileId,
        closed_at: Timestamp,
    },

    #[error("profile {0} is not under fraud review")]
    NotUnderReview(ProfileId),

    #[error("profile {0} is not fraud rejected")]
    NotRejected(ProfileId),

    #[error("profile {profile} cannot be activated: {reason}")]
    NotActivatable { profile: ProfileId, reason: String },

    #[error("{0} has no profile recoverable with a personal key")]
    NothingToRestore(UserId),

    #[error("personal key did not match; {remaining} tries left")]
    PersonalKeyMismatch { remaining: u32 },

    #[error("{kind} is rate limited until {expires_at}")]
    RateLimited {
        kind: RateLimitType,
        expires_at: Timestamp,
    },

    #[error("{kind} counter kept changing under concurrent updates")]
    Contention { kind: RateLimitType },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<RateLimitError> for ResolutionError {
    fn from(e: RateLimitError) -> Self {
        match e {
            RateLimitError::Limited { kind, expires_at } => Self::RateLimited { kind, expires_at },
            RateLimitError::Contention { kind } => Self::Contention { kind },
            RateLimitError::Store(e) => Self::Store(e),
        }
    }
}
