//! Rate-limit keys and persisted counter state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{RateLimitRule, Timestamp, UserId};

/// Operation types that carry their own attempt budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitType {
    IdvDocAuth,
    IdvResolution,
    ProofSsn,
    ProofAddress,
    /// OTP sends.
    PhoneOtp,
    /// OTP verify attempts.
    PhoneConfirmation,
    VerifyGpoKey,
    GpoLetter,
    VerifyPersonalKey,
}

impl RateLimitType {
    pub const ALL: [RateLimitType; 9] = [
        Self::IdvDocAuth,
        Self::IdvResolution,
        Self::ProofSsn,
        Self::ProofAddress,
        Self::PhoneOtp,
        Self::PhoneConfirmation,
        Self::VerifyGpoKey,
        Self::GpoLetter,
        Self::VerifyPersonalKey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdvDocAuth => "idv_doc_auth",
            Self::IdvResolution => "idv_resolution",
            Self::ProofSsn => "proof_ssn",
            Self::ProofAddress => "proof_address",
            Self::PhoneOtp => "phone_otp",
            Self::PhoneConfirmation => "phone_confirmation",
            Self::VerifyGpoKey => "verify_gpo_key",
            Self::GpoLetter => "gpo_letter",
            Self::VerifyPersonalKey => "verify_personal_key",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Single-byte tag used in storage keys.
    pub fn tag(&self) -> u8 {
        match self {
            Self::IdvDocAuth => 1,
            Self::IdvResolution => 2,
            Self::ProofSsn => 3,
            Self::ProofAddress => 4,
            Self::PhoneOtp => 5,
            Self::PhoneConfirmation => 6,
            Self::VerifyGpoKey => 7,
            Self::GpoLetter => 8,
            Self::VerifyPersonalKey => 9,
        }
    }
}

impl fmt::Display for RateLimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RateLimitKey {
    pub user_id: UserId,
    pub kind: RateLimitType,
}

impl RateLimitKey {
    pub fn new(user_id: UserId, kind: RateLimitType) -> Self {
        Self { user_id, kind }
    }

    /// `user_id (8 bytes BE) ++ tag`.
    pub fn to_bytes(&self) -> [u8; 9] {
        let mut out = [0u8; 9];
        out[..8].copy_from_slice(&self.user_id.to_be_bytes());
        out[8] = self.kind.tag();
        out
    }
}

/// Counter state for one key. Absent state means zero attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub attempts: u32,
    pub last_attempt_at: Option<Timestamp>,
}

impl RateLimitRecord {
    /// Whether the window opened by the last attempt has closed.
    pub fn is_expired(&self, rule: &RateLimitRule, now: Timestamp) -> bool {
        match self.last_attempt_at {
            Some(at) => at.has_expired(rule.window_secs, now),
            None => true,
        }
    }

    /// Attempts counted in the live window.
    pub fn live_attempts(&self, rule: &RateLimitRule, now: Timestamp) -> u32 {
        if self.is_expired(rule, now) {
            0
        } else {
            self.attempts
        }
    }

    pub fn is_limited(&self, rule: &RateLimitRule, now: Timestamp) -> bool {
        self.live_attempts(rule, now) >= rule.max_attempts
    }

    pub fn expires_at(&self, rule: &RateLimitRule) -> Option<Timestamp> {
        self.last_attempt_at.map(|at| at.plus_secs(rule.window_secs))
    }

    /// The record after one more attempt at `now`.
    pub fn incremented(&self, rule: &RateLimitRule, now: Timestamp) -> RateLimitRecord {
        RateLimitRecord {
            attempts: self.live_attempts(rule, now).saturating_add(1),
            last_attempt_at: Some(now),
        }
    }
}
