use idv_store::StoreError;
use idv_types::{AttemptId, CheckKind};
use idv_utils::{Classify, ErrorClass};

#[derive(Debug, thiserror::Error)]
pub enum ProofingError {
    #[error("no vendor client configured for {0}")]
    NotConfigured(CheckKind),

    #[error("{0} is no longer the current attempt")]
    StaleAttempt(AttemptId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl Classify for ProofingError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Store(e) if e.is_transient() => ErrorClass::Transient,
            _ => ErrorClass::Business,
        }
    }
}
