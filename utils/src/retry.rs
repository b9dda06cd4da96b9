//! Explicit retry policy for vendor calls and background jobs.
//!
//! Every retried operation classifies its errors through [`Classify`]. Only
//! [`ErrorClass::Transient`] errors are retried; business rejections surface
//! on the first occurrence.

use idv_types::RetryParams;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Whether an error may succeed on a later try.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network failure, timeout, 5xx, lock contention.
    Transient,
    /// A definitive answer; retrying cannot change it.
    Business,
}

pub trait Classify {
    fn class(&self) -> ErrorClass;
}

/// Bounded exponential backoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries including the first. Never less than one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    pub fn from_params(params: &RetryParams) -> Self {
        Self {
            max_attempts: params.max_attempts.max(1),
            initial_backoff: Duration::from_millis(params.initial_backoff_ms),
            multiplier: params.multiplier.max(1),
        }
    }

    /// A single try, no retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Delay before try number `attempt + 1`, where `attempt` tries have failed.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exp);
        self.initial_backoff.saturating_mul(factor)
    }

    pub fn should_retry(&self, class: ErrorClass, attempts_made: u32) -> bool {
        class == ErrorClass::Transient && attempts_made < self.max_attempts
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display> {
    #[error("{op} gave up after {attempts} attempts: {last}")]
    Exhausted {
        op: &'static str,
        attempts: u32,
        last: E,
    },

    #[error("{op} rejected: {error}")]
    Rejected { op: &'static str, error: E },
}

impl<E: fmt::Display> RetryError<E> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Rejected { error, .. } => error,
        }
    }
}

/// Run `f` under `policy`. `f` receives the 1-based try number.
pub async fn retry_async<T, E, F, Fut>(
    policy: &RetryPolicy,
    op: &'static str,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    E: Classify + fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => match error.class() {
                ErrorClass::Business => return Err(RetryError::Rejected { op, error }),
                ErrorClass::Transient if policy.should_retry(ErrorClass::Transient, attempt) => {
                    let delay = policy.backoff_after(attempt);
                    tracing::debug!(op, attempt, delay_ms = delay.as_millis() as u64, %error, "retrying transient failure");
                    tokio::time::sleep(delay).await;
                }
                ErrorClass::Transient => {
                    tracing::warn!(op, attempts = attempt, %error, "retries exhausted");
                    return Err(RetryError::Exhausted {
                        op,
                        attempts: attempt,
                        last: error,
                    });
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError(ErrorClass);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }

    impl Classify for TestError {
        fn class(&self) -> ErrorClass {
            self.0
        }
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            multiplier: 2,
        }
    }

    #[test]
    fn backoff_grows_geometrically() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            multiplier: 3,
        };
        assert_eq!(policy.backoff_after(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(300));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(900));
    }

    #[test]
    fn from_params_never_allows_zero_tries() {
        let policy = RetryPolicy::from_params(&RetryParams {
            max_attempts: 0,
            initial_backoff_ms: 10,
            multiplier: 0,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.multiplier, 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let out = retry_async(&fast(3), "op", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TestError(ErrorClass::Transient))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn business_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = retry_async(&fast(5), "op", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TestError(ErrorClass::Business)) }
        })
        .await
        .unwrap_err();
        assert!(!err.is_exhausted());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count() {
        let err = retry_async(&fast(3), "op", |_| async {
            Err::<(), _>(TestError(ErrorClass::Transient))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
    }
}
