//! Mailed one-time confirmation codes.

use serde::{Deserialize, Serialize};

use crate::{GpoCodeId, ProfileId, Timestamp};

/// A mailed code. Only its keyed fingerprint is stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpoConfirmationCode {
    pub id: GpoCodeId,
    pub profile_id: ProfileId,
    /// Hex HMAC of the normalized code.
    pub otp_fingerprint: String,
    pub created_at: Timestamp,
    pub code_sent_at: Timestamp,
}

impl GpoConfirmationCode {
    pub fn is_expired(&self, validity_secs: u64, now: Timestamp) -> bool {
        self.code_sent_at.has_expired(validity_secs, now)
    }
}
