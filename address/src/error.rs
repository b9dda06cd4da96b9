use idv_crypto::CryptoError;
use idv_ratelimit::RateLimitError;
use idv_store::StoreError;
use idv_types::{
    AddressMethod, AttemptId, OtpDelivery, ProfileId, RateLimitType, Reason, Timestamp, TypesError,
};
use idv_vendors::VendorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("{kind} is rate limited until {expires_at}")]
    RateLimited {
        kind: RateLimitType,
        expires_at: Timestamp,
    },

    #[error("{kind} counter kept changing under concurrent updates")]
    Contention { kind: RateLimitType },

    #[error("{0:?} delivery is unavailable")]
    DeliveryUnavailable(OtpDelivery),

    #[error("in-person proofing is unavailable")]
    InPersonUnavailable,

    #[error("phone could not be matched to the applicant")]
    PhoneNotVerified(Vec<Reason>),

    #[error("no outstanding code for attempt {0}")]
    NoChallenge(AttemptId),

    #[error("the code has expired")]
    CodeExpired,

    #[error("{method:?} confirmation needs a profile")]
    NoProfile { method: AddressMethod },

    #[error("parameters do not match {0:?} confirmation")]
    WrongParams(AddressMethod),

    #[error("profile {profile} is not pending {method:?} confirmation")]
    NotPending {
        profile: ProfileId,
        method: AddressMethod,
    },

    /// Deactivated for a reason nothing can clear.
    #[error("profile {0} can no longer be confirmed")]
    ProfileClosed(ProfileId),

    #[error("vendor error: {0}")]
    Vendor(#[from] VendorError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Components(#[from] TypesError),
}

impl AddressError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

impl From<RateLimitError> for AddressError {
    fn from(e: RateLimitError) -> Self {
        match e {
            RateLimitError::Limited { kind, expires_at } => Self::RateLimited { kind, expires_at },
            RateLimitError::Contention { kind } => Self::Contention { kind },
            RateLimitError::Store(e) => Self::Store(e),
        }
    }
}
