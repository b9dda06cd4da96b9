//! Fraud review audit records.

use serde::{Deserialize, Serialize};

use crate::{ProfileId, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudReviewAction {
    Held,
    Passed,
    Rejected,
    /// Rejected by the sweep after the review window closed.
    AutoRejected,
    /// Operator lifted an earlier rejection.
    Reversed,
}

impl FraudReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Held => "held",
            Self::Passed => "passed",
            Self::Rejected => "rejected",
            Self::AutoRejected => "auto_rejected",
            Self::Reversed => "reversed",
        }
    }
}

/// Append-only entry describing one fraud review action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudReviewRecord {
    pub profile_id: ProfileId,
    pub action: FraudReviewAction,
    pub operator_reason: Option<String>,
    pub at: Timestamp,
}
