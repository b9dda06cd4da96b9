//! Aggregated proofing outcome and background job state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{AttemptId, CheckKind, CheckResult, FraudPendingReason, ProofingComponents, Timestamp, UserId};

/// The single result of running every configured check for one attempt.
///
/// Synchronous and background execution produce this exact shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofingResult {
    /// Fencing token; results for any other attempt are discarded.
    pub attempt_id: AttemptId,
    pub success: bool,
    pub checks: BTreeMap<CheckKind, CheckResult>,
    /// Checks skipped because the vendor is in full outage.
    pub unavailable: Vec<CheckKind>,
    pub fraud_review_pending_reason: Option<FraudPendingReason>,
    pub device_fraud_hard_reject: bool,
    /// Components satisfied by the checks that passed.
    pub components: ProofingComponents,
    pub completed_at: Timestamp,
}

impl ProofingResult {
    /// Synthetic outcome when a required vendor is in full outage. No vendor was called.
    pub fn service_unavailable(
        attempt_id: AttemptId,
        unavailable: Vec<CheckKind>,
        now: Timestamp,
    ) -> Self {
        Self {
            attempt_id,
            success: false,
            checks: BTreeMap::new(),
            unavailable,
            fraud_review_pending_reason: None,
            device_fraud_hard_reject: false,
            components: ProofingComponents::default(),
            completed_at: now,
        }
    }

    pub fn is_service_unavailable(&self) -> bool {
        !self.unavailable.is_empty()
    }

    pub fn check(&self, kind: CheckKind) -> Option<&CheckResult> {
        self.checks.get(&kind)
    }

    pub fn any_timed_out(&self) -> bool {
        self.checks.values().any(|c| c.timed_out)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofingJobStatus {
    Pending,
    Completed(Box<ProofingResult>),
    /// Business-level failure or exhausted retries; not retried further.
    Failed(String),
}

/// A proofing run keyed by attempt id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofingJob {
    pub attempt_id: AttemptId,
    pub user_id: UserId,
    pub enqueued_at: Timestamp,
    pub status: ProofingJobStatus,
    pub tries: u32,
}

impl ProofingJob {
    pub fn pending(attempt_id: AttemptId, user_id: UserId, now: Timestamp) -> Self {
        Self {
            attempt_id,
            user_id,
            enqueued_at: now,
            status: ProofingJobStatus::Pending,
            tries: 0,
        }
    }

    pub fn result(&self) -> Option<&ProofingResult> {
        match &self.status {
            ProofingJobStatus::Completed(result) => Some(result),
            _ => None,
        }
    }
}
