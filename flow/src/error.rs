use idv_crypto::CryptoError;
use idv_types::{AttemptId, Step, TypesError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    /// Recoverable: the caller redirects to `redirect_to`.
    #[error("must complete {redirect_to} before {requested}")]
    StepOutOfOrder { requested: Step, redirect_to: Step },

    #[error("invalid ssn: {0}")]
    InvalidSsn(&'static str),

    #[error("invalid phone number: {0}")]
    InvalidPhone(&'static str),

    #[error("invalid input for {step}: {reason}")]
    InvalidInput { step: Step, reason: &'static str },

    #[error("attempt {0} is no longer in progress")]
    AttemptClosed(AttemptId),

    /// Earlier steps cannot change once the attempt produced a profile.
    #[error("attempt {0} already produced a profile")]
    ProfileAlreadyCreated(AttemptId),

    #[error("result for attempt {found} delivered to attempt {expected}")]
    StaleResult { expected: AttemptId, found: AttemptId },

    #[error("attempt {attempt} has no sealed {field}")]
    MissingPii { attempt: AttemptId, field: &'static str },

    #[error(transparent)]
    Components(#[from] TypesError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl FlowError {
    /// User-input errors: reported, step not advanced, no rate-limit penalty.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidSsn(_) | Self::InvalidPhone(_) | Self::InvalidInput { .. }
        )
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
