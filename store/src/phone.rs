//! Phone OTP challenge storage trait.

use crate::StoreError;
use idv_types::{AttemptId, PhoneOtpChallenge};

pub trait PhoneOtpStore {
    /// Store the challenge for its attempt, replacing any earlier one.
    fn put_otp(&self, challenge: &PhoneOtpChallenge) -> Result<(), StoreError>;

    fn get_otp(&self, attempt: AttemptId) -> Result<Option<PhoneOtpChallenge>, StoreError>;

    fn delete_otp(&self, attempt: AttemptId) -> Result<(), StoreError>;
}
