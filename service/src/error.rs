use idv_address::AddressError;
use idv_crypto::CryptoError;
use idv_flow::FlowError;
use idv_proofing::ProofingError;
use idv_ratelimit::RateLimitError;
use idv_resolution::ResolutionError;
use idv_store::StoreError;
use idv_types::{RateLimitType, Step, Timestamp, UserId};
use idv_utils::{Classify, ErrorClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A fraud rejection keeps the user out until an operator reverses it.
    #[error("user {0} is blocked by a fraud rejection")]
    FraudRejected(UserId),

    #[error("user {0} has no attempt in progress")]
    NoAttempt(UserId),

    #[error("user {user} has no profile pending {what}")]
    NothingPending { user: UserId, what: &'static str },

    #[error("{requested} is not available until {expected} is reached")]
    WrongStep { requested: Step, expected: Step },

    /// Surfaced as a lockout screen with a cooldown.
    #[error("{kind} rate limited until {expires_at}")]
    RateLimited {
        kind: RateLimitType,
        expires_at: Timestamp,
    },

    #[error("{kind} counter kept changing under concurrent updates")]
    Contention { kind: RateLimitType },

    #[error("config error: {0}")]
    Config(String),

    #[error("flow error: {0}")]
    Flow(#[from] FlowError),

    #[error("proofing error: {0}")]
    Proofing(#[from] ProofingError),

    #[error("address confirmation error: {0}")]
    Address(#[from] AddressError),

    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ServiceError {
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Address(e) => e.is_rate_limited(),
            Self::Resolution(ResolutionError::RateLimited { .. }) => true,
            _ => false,
        }
    }

    /// Errors the user caused and can fix by resubmitting.
    pub fn is_user_input(&self) -> bool {
        matches!(self, Self::Flow(e) if e.is_user_input())
    }
}

impl From<RateLimitError> for ServiceError {
    fn from(e: RateLimitError) -> Self {
        match e {
            RateLimitError::Limited { kind, expires_at } => Self::RateLimited { kind, expires_at },
            RateLimitError::Store(e) => Self::Store(e),
            RateLimitError::Contention { kind } => Self::Contention { kind },
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl Classify for ServiceError {
    fn class(&self) -> ErrorClass {
        let transient = match self {
            Self::Contention { .. } => true,
            Self::Store(e) => e.is_transient(),
            Self::Proofing(ProofingError::Store(e)) => e.is_transient(),
            Self::Address(AddressError::Store(e)) | Self::Resolution(ResolutionError::Store(e)) => {
                e.is_transient()
            }
            Self::Address(AddressError::Vendor(e)) => e.class() == ErrorClass::Transient,
            _ => false,
        };
        if transient {
            ErrorClass::Transient
        } else {
            ErrorClass::Business
        }
    }
}
