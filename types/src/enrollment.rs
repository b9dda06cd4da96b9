//! In-person proofing enrollment.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{EnrollmentId, ProfileId, Timestamp, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Pending,
    Passed,
    Failed,
    Cancelled,
    Expired,
}

impl EnrollmentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Terminal states after which the user may restart from the beginning.
    pub fn permits_restart(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled | Self::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InPersonEnrollment {
    pub id: EnrollmentId,
    pub user_id: UserId,
    pub profile_id: ProfileId,
    pub status: EnrollmentStatus,
    /// 16-digit code the user presents at the counter.
    pub enrollment_code: String,
    /// Identifier shared with the in-person proofing provider.
    pub unique_id: String,
    pub created_at: Timestamp,
    pub enrollment_established_at: Option<Timestamp>,
    pub status_check_attempted_at: Option<Timestamp>,
    pub status_check_completed_at: Option<Timestamp>,
    pub status_updated_at: Option<Timestamp>,
    pub proofed_at: Option<Timestamp>,
    pub version: u64,
}

impl InPersonEnrollment {
    pub fn new(
        id: EnrollmentId,
        user_id: UserId,
        profile_id: ProfileId,
        enrollment_code: String,
        unique_id: String,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id,
            profile_id,
            status: EnrollmentStatus::Pending,
            enrollment_code,
            unique_id,
            created_at: now,
            enrollment_established_at: Some(now),
            status_check_attempted_at: None,
            status_check_completed_at: None,
            status_updated_at: None,
            proofed_at: None,
            version: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == EnrollmentStatus::Pending
    }

    /// Move to `status`. Terminal states never change again; returns whether
    /// the status moved.
    pub fn transition(&mut self, status: EnrollmentStatus, now: Timestamp) -> bool {
        if self.status.is_terminal() || self.status == status {
            return false;
        }
        self.status = status;
        self.status_updated_at = Some(now);
        if status == EnrollmentStatus::Passed {
            self.proofed_at = Some(now);
        }
        true
    }

    pub fn has_expired(&self, validity_secs: u64, now: Timestamp) -> bool {
        let start = self.enrollment_established_at.unwrap_or(self.created_at);
        start.has_expired(validity_secs, now)
    }
}
