//! Engine parameters: every tunable the workflow engine reads.
//!
//! One `IdvParams` value is built at startup and injected into each component's
//! constructor. Nothing reads configuration from a global.

use serde::{Deserialize, Serialize};

use crate::{RateLimitType, DAY_SECS};

/// Attempt budget for one rate-limited operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Attempts allowed inside one window. The `max_attempts`-th is still allowed.
    pub max_attempts: u32,
    /// Window length, measured from the most recent attempt.
    pub window_secs: u64,
}

impl RateLimitRule {
    pub const fn new(max_attempts: u32, window_secs: u64) -> Self {
        Self {
            max_attempts,
            window_secs,
        }
    }
}

/// One rule per [`RateLimitType`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitTable {
    pub idv_doc_auth: RateLimitRule,
    pub idv_resolution: RateLimitRule,
    pub proof_ssn: RateLimitRule,
    pub proof_address: RateLimitRule,
    pub phone_otp: RateLimitRule,
    pub phone_confirmation: RateLimitRule,
    pub verify_gpo_key: RateLimitRule,
    pub gpo_letter: RateLimitRule,
    pub verify_personal_key: RateLimitRule,
}

impl RateLimitTable {
    pub fn rule(&self, kind: RateLimitType) -> RateLimitRule {
        match kind {
            RateLimitType::IdvDocAuth => self.idv_doc_auth,
            RateLimitType::IdvResolution => self.idv_resolution,
            RateLimitType::ProofSsn => self.proof_ssn,
            RateLimitType::ProofAddress => self.proof_address,
            RateLimitType::PhoneOtp => self.phone_otp,
            RateLimitType::PhoneConfirmation => self.phone_confirmation,
            RateLimitType::VerifyGpoKey => self.verify_gpo_key,
            RateLimitType::GpoLetter => self.gpo_letter,
            RateLimitType::VerifyPersonalKey => self.verify_personal_key,
        }
    }
}

impl Default for RateLimitTable {
    fn default() -> Self {
        Self {
            idv_doc_auth: RateLimitRule::new(5, 6 * 3600),
            idv_resolution: RateLimitRule::new(5, 6 * 3600),
            proof_ssn: RateLimitRule::new(10, 3600),
            proof_address: RateLimitRule::new(5, 6 * 3600),
            phone_otp: RateLimitRule::new(10, 600),
            phone_confirmation: RateLimitRule::new(5, 600),
            verify_gpo_key: RateLimitRule::new(5, 600),
            gpo_letter: RateLimitRule::new(4, 30 * DAY_SECS),
            verify_personal_key: RateLimitRule::new(5, 900),
        }
    }
}

/// Bounded exponential backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryParams {
    /// Total tries including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: u32,
}

impl Default for RetryParams {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            multiplier: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdvParams {
    // ── Rate limiting ────────────────────────────────────────────────────
    pub rate_limits: RateLimitTable,

    // ── Vendor calls ─────────────────────────────────────────────────────
    /// Per-try timeout for every vendor call.
    pub vendor_timeout_ms: u64,
    /// Transient-failure retries at the vendor client layer.
    pub vendor_retry: RetryParams,
    /// Retries for background jobs (proofing, polling).
    pub job_retry: RetryParams,

    // ── Fraud review ─────────────────────────────────────────────────────
    /// Days a pending review stays reviewable. Default: 30.
    pub fraud_review_window_days: u64,
    /// Route device-fraud hard rejects to operator review instead of rejecting.
    pub hard_reject_routes_to_review: bool,

    // ── Address confirmation ─────────────────────────────────────────────
    pub otp_length: usize,
    pub otp_validity_secs: u64,
    pub gpo_code_length: usize,
    /// Days a mailed code stays valid. Default: 30.
    pub gpo_code_validity_days: u64,
    /// Days an in-person enrollment stays open. Default: 30.
    pub in_person_enrollment_validity_days: u64,
    pub in_person_poll_interval_secs: u64,

    // ── Background jobs ──────────────────────────────────────────────────
    /// A pending proofing job older than this is treated as lost.
    pub proofing_job_stale_after_secs: u64,
}

impl IdvParams {
    pub fn fraud_review_window_secs(&self) -> u64 {
        self.fraud_review_window_days.saturating_mul(DAY_SECS)
    }

    pub fn gpo_code_validity_secs(&self) -> u64 {
        self.gpo_code_validity_days.saturating_mul(DAY_SECS)
    }

    pub fn in_person_enrollment_validity_secs(&self) -> u64 {
        self.in_person_enrollment_validity_days.saturating_mul(DAY_SECS)
    }
}

impl Default for IdvParams {
    fn default() -> Self {
        Self {
            rate_limits: RateLimitTable::default(),
            vendor_timeout_ms: 15_000,
            vendor_retry: RetryParams::default(),
            job_retry: RetryParams {
                max_attempts: 5,
                initial_backoff_ms: 1_000,
                multiplier: 2,
            },
            fraud_review_window_days: 30,
            hard_reject_routes_to_review: false,
            otp_length: 6,
            otp_validity_secs: 600,
            gpo_code_length: 10,
            gpo_code_validity_days: 30,
            in_person_enrollment_validity_days: 30,
            in_person_poll_interval_secs: 3600,
            proofing_job_stale_after_secs: 900,
        }
    }
}
