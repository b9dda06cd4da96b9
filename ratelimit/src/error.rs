use idv_store::StoreError;
use idv_types::{RateLimitType, Timestamp};

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("{kind} is rate limited until {expires_at}")]
    Limited {
        kind: RateLimitType,
        expires_at: Timestamp,
    },

    #[error("{kind} counter kept changing under concurrent updates")]
    Contention { kind: RateLimitType },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl RateLimitError {
    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }
}
