//! User: a stable identity that outlives profiles and attempts.

use serde::{Deserialize, Serialize};

use crate::{Timestamp, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Bumped on every password change. PII sealed under an older epoch is
    /// unrecoverable with the current password.
    pub password_epoch: u32,
    pub password_reset_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl User {
    pub fn new(id: UserId, now: Timestamp) -> Self {
        Self {
            id,
            password_epoch: 0,
            password_reset_at: None,
            created_at: now,
        }
    }
}
