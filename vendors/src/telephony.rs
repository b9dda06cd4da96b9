//! Outbound OTP delivery.

use async_trait::async_trait;
use idv_types::OtpDelivery;

use crate::VendorError;

/// One delivered message, as recorded by test doubles.
#[derive(Clone, PartialEq, Eq)]
pub struct SentOtp {
    pub phone: String,
    pub code: String,
    pub delivery: OtpDelivery,
}

impl std::fmt::Debug for SentOtp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentOtp")
            .field("delivery", &self.delivery)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Telephony: Send + Sync {
    async fn send_otp(&self, phone: &str, code: &str, delivery: OtpDelivery) -> Result<(), VendorError>;
}
