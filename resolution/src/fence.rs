//! Attempt-id fencing for late results.

use std::sync::Arc;

use idv_store::IdvStore;
use idv_types::{AttemptId, AttemptStatus, Effect, IdvEvent, Profile, ProofingResult, UserId};

use crate::ResolutionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fence {
    Current,
    Stale { reason: &'static str },
}

impl Fence {
    pub fn is_current(&self) -> bool {
        matches!(self, Self::Current)
    }

    /// The analytics event recorded when a result is dropped.
    pub fn discard_event(&self, attempt_id: AttemptId) -> Option<Effect> {
        match self {
            Self::Current => None,
            Self::Stale { reason } => Some(
                IdvEvent::StaleResultDiscarded {
                    attempt_id,
                    reason,
                }
                .into(),
            ),
        }
    }
}

/// Decides whether a result may still change state. Always reads the
/// current attempt from the store, never from a caller's copy.
#[derive(Clone)]
pub struct AttemptFence {
    store: Arc<dyn IdvStore>,
}

impl AttemptFence {
    pub fn new(store: Arc<dyn IdvStore>) -> Self {
        Self { store }
    }

    pub fn check(&self, user: UserId, attempt_id: AttemptId) -> Result<Fence, ResolutionError> {
        if self.store.current_attempt_id(user)? != Some(attempt_id) {
            return Ok(stale(attempt_id, "not_current_attempt"));
        }
        let attempt = match self.store.get_attempt(attempt_id) {
            Ok(attempt) => attempt,
            Err(e) if e.is_not_found() => return Ok(stale(attempt_id, "unknown_attempt")),
            Err(e) => return Err(e.into()),
        };
        if attempt.status == AttemptStatus::Abandoned {
            return Ok(stale(attempt_id, "attempt_abandoned"));
        }
        Ok(Fence::Current)
    }

    /// Fence a proofing result: its attempt must be current, and it must not
    /// predate the attempt's start.
    pub fn check_result(
        &self,
        user: UserId,
        result: &ProofingResult,
    ) -> Result<Fence, ResolutionError> {
        let fence = self.check(user, result.attempt_id)?;
        if !fence.is_current() {
            return Ok(fence);
        }
        let attempt = self.store.get_attempt(result.attempt_id)?;
        if result.completed_at < attempt.started_at {
            return Ok(stale(result.attempt_id, "result_predates_attempt"));
        }
        Ok(Fence::Current)
    }

    /// A profile only accepts results produced by its own attempt.
    pub fn check_profile(profile: &Profile, attempt_id: AttemptId) -> Fence {
        if profile.attempt_id == attempt_id {
            Fence::Current
        } else {
            stale(attempt_id, "profile_of_other_attempt")
        }
    }
}

fn stale(attempt_id: AttemptId, reason: &'static str) -> Fence {
    tracing::info!(%attempt_id, reason, "discarding stale result");
    Fence::Stale { reason }
}
