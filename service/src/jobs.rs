//! Named background jobs with retry on transient failure.

use std::future::Future;

use idv_types::IdvParams;
use idv_utils::{retry_async, RetryPolicy, StatsCounter};

use crate::ServiceError;

/// Counter names tracked across every job run.
pub const JOB_OUTCOMES: &[&str] = &["succeeded", "rejected", "exhausted"];

/// Runs a job body under the job retry policy. Transient store and vendor
/// errors are retried with backoff; business errors fail the run at once.
pub struct JobRunner {
    policy: RetryPolicy,
    stats: StatsCounter,
}

impl JobRunner {
    pub fn new(params: &IdvParams) -> Self {
        Self::with_policy(RetryPolicy::from_params(&params.job_retry))
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            policy,
            stats: StatsCounter::new(JOB_OUTCOMES),
        }
    }

    pub async fn run<T, F, Fut>(&self, job: &'static str, mut body: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        match retry_async(&self.policy, job, |_| body()).await {
            Ok(value) => {
                self.stats.increment("succeeded");
                tracing::debug!(job, "job finished");
                Ok(value)
            }
            Err(e) => {
                let outcome = if e.is_exhausted() { "exhausted" } else { "rejected" };
                self.stats.increment(outcome);
                let error = e.into_inner();
                tracing::warn!(job, outcome, %error, "job failed");
                Err(error)
            }
        }
    }

    pub fn stats(&self) -> &StatsCounter {
        &self.stats
    }
}
