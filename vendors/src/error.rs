use idv_utils::{Classify, ErrorClass};
use thiserror::Error;

/// Raw failure from a vendor call, classified for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VendorError {
    #[error("vendor call timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    /// 5xx or maintenance response.
    #[error("vendor unavailable: {0}")]
    Unavailable(String),

    /// The vendor refused the request itself (bad input, unsupported document).
    #[error("request rejected by vendor: {0}")]
    Rejected(String),

    #[error("unexpected vendor response: {0}")]
    InvalidResponse(String),
}

impl VendorError {
    /// Short reason code recorded on the resulting check.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network(_) => "network_error",
            Self::Unavailable(_) => "vendor_unavailable",
            Self::Rejected(_) => "request_rejected",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

impl Classify for VendorError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Timeout | Self::Network(_) | Self::Unavailable(_) => ErrorClass::Transient,
            Self::Rejected(_) | Self::InvalidResponse(_) => ErrorClass::Business,
        }
    }
}
