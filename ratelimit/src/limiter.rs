//! The limiter itself.

use std::sync::Arc;

use idv_store::{IdvStore, RateLimitStore};
use idv_types::{RateLimitKey, RateLimitRecord, RateLimitRule, RateLimitTable, RateLimitType, Timestamp, UserId};

use crate::RateLimitError;

/// Bound on compare-and-swap retries before giving up with `Contention`.
const MAX_CAS_ROUNDS: u32 = 16;

/// Budget left after an accepted attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Remaining {
    pub remaining: u32,
    /// When the window opened by this attempt closes.
    pub expires_at: Timestamp,
}

pub struct RateLimiter<S: RateLimitStore + ?Sized = dyn IdvStore> {
    store: Arc<S>,
    table: RateLimitTable,
}

impl<S: RateLimitStore + ?Sized> Clone for RateLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            table: self.table.clone(),
        }
    }
}

impl<S: RateLimitStore + ?Sized> RateLimiter<S> {
    pub fn new(store: Arc<S>, table: RateLimitTable) -> Self {
        Self { store, table }
    }

    pub fn rule(&self, kind: RateLimitType) -> RateLimitRule {
        self.table.rule(kind)
    }

    fn record(&self, key: &RateLimitKey) -> Result<Option<RateLimitRecord>, RateLimitError> {
        Ok(self.store.get_rate_limit(key)?)
    }

    /// Check and count one attempt. The `max`-th attempt in a window is
    /// accepted; the next one inside the same window is refused and not counted.
    pub fn attempt(
        &self,
        user: UserId,
        kind: RateLimitType,
        now: Timestamp,
    ) -> Result<Remaining, RateLimitError> {
        let key = RateLimitKey::new(user, kind);
        let rule = self.rule(kind);

        for _ in 0..MAX_CAS_ROUNDS {
            let current = self.record(&key)?;
            let state = current.unwrap_or_default();
            if state.is_limited(&rule, now) {
                let expires_at = state.expires_at(&rule).unwrap_or(now);
                tracing::debug!(%user, %kind, %expires_at, "attempt refused");
                return Err(RateLimitError::Limited { kind, expires_at });
            }

            let next = state.incremented(&rule, now);
            if self
                .store
                .compare_and_swap_rate_limit(&key, current.as_ref(), Some(&next))?
            {
                let remaining = rule.max_attempts.saturating_sub(next.attempts);
                if remaining == 0 {
                    tracing::warn!(%user, %kind, attempts = next.attempts, "rate limit reached");
                }
                return Ok(Remaining {
                    remaining,
                    expires_at: now.plus_secs(rule.window_secs),
                });
            }
        }

        Err(RateLimitError::Contention { kind })
    }

    pub fn is_limited(
        &self,
        user: UserId,
        kind: RateLimitType,
        now: Timestamp,
    ) -> Result<bool, RateLimitError> {
        let rule = self.rule(kind);
        Ok(self
            .record(&RateLimitKey::new(user, kind))?
            .is_some_and(|r| r.is_limited(&rule, now)))
    }

    /// Refuse with `Limited` if any of `kinds` is currently locked out.
    pub fn ensure_unlimited(
        &self,
        user: UserId,
        kinds: &[RateLimitType],
        now: Timestamp,
    ) -> Result<(), RateLimitError> {
        for &kind in kinds {
            let rule = self.rule(kind);
            if let Some(record) = self.record(&RateLimitKey::new(user, kind))? {
                if record.is_limited(&rule, now) {
                    return Err(RateLimitError::Limited {
                        kind,
                        expires_at: record.expires_at(&rule).unwrap_or(now),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn remaining(
        &self,
        user: UserId,
        kind: RateLimitType,
        now: Timestamp,
    ) -> Result<u32, RateLimitError> {
        let rule = self.rule(kind);
        let live = self
            .record(&RateLimitKey::new(user, kind))?
            .map_or(0, |r| r.live_attempts(&rule, now));
        Ok(rule.max_attempts.saturating_sub(live))
    }

    /// End of the current window, or `None` when nothing is counted.
    pub fn expires_at(
        &self,
        user: UserId,
        kind: RateLimitType,
        now: Timestamp,
    ) -> Result<Option<Timestamp>, RateLimitError> {
        let rule = self.rule(kind);
        Ok(self
            .record(&RateLimitKey::new(user, kind))?
            .filter(|r| !r.is_expired(&rule, now))
            .and_then(|r| r.expires_at(&rule)))
    }

    /// Operator reset: drop the counter entirely.
    pub fn reset(&self, user: UserId, kind: RateLimitType) -> Result<(), RateLimitError> {
        let key = RateLimitKey::new(user, kind);
        for _ in 0..MAX_CAS_ROUNDS {
            let current = self.record(&key)?;
            if current.is_none() {
                return Ok(());
            }
            if self
                .store
                .compare_and_swap_rate_limit(&key, current.as_ref(), None)?
            {
                tracing::info!(%user, %kind, "rate limit reset");
                return Ok(());
            }
        }
        Err(RateLimitError::Contention { kind })
    }

    /// Lock the operation out for a full window starting now.
    pub fn increment_to_limited(
        &self,
        user: UserId,
        kind: RateLimitType,
        now: Timestamp,
    ) -> Result<(), RateLimitError> {
        let key = RateLimitKey::new(user, kind);
        let locked = RateLimitRecord {
            attempts: self.rule(kind).max_attempts,
            last_attempt_at: Some(now),
        };
        for _ in 0..MAX_CAS_ROUNDS {
            let current = self.record(&key)?;
            if self
                .store
                .compare_and_swap_rate_limit(&key, current.as_ref(), Some(&locked))?
            {
                tracing::info!(%user, %kind, "rate limit forced");
                return Ok(());
            }
        }
        Err(RateLimitError::Contention { kind })
    }
}
