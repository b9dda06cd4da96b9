//! Phone one-time-passcode challenge state.

use serde::{Deserialize, Serialize};

use crate::{AttemptId, Timestamp, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpDelivery {
    Sms,
    Voice,
}

/// The outstanding OTP for one attempt. A new send replaces the previous one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneOtpChallenge {
    pub attempt_id: AttemptId,
    pub user_id: UserId,
    /// E.164 phone number.
    pub phone: String,
    pub otp_fingerprint: String,
    pub delivery: OtpDelivery,
    pub sent_at: Timestamp,
    pub expires_at: Timestamp,
    pub confirmed_at: Option<Timestamp>,
    /// The phone-finder vendor confirmed the number belongs to the applicant.
    pub vendor_check_passed: bool,
}

impl PhoneOtpChallenge {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}
