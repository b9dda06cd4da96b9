//! Synchronous and background proofing jobs.
//!
//! Both modes persist the same [`ProofingJob`] record keyed by attempt id
//! and run the same orchestrator call, so the stored [`ProofingResult`] is
//! identical whichever mode a deployment uses.

use std::sync::Arc;

use idv_store::IdvStore;
use idv_types::{
    AttemptId, Clock, IdvParams, ProofingJob, ProofingJobStatus, ProofingResult, UserId,
};
use idv_utils::{retry_async, RetryError, RetryPolicy};
use idv_vendors::CheckRequest;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::{ProofingError, ProofingOrchestrator, ProofingPlan};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// The caller waits for every check.
    #[default]
    Synchronous,
    /// Checks run on a spawned task; the caller polls.
    Background,
}

pub enum Submission {
    Completed(ProofingResult),
    Queued(JoinHandle<()>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobPoll {
    Missing,
    Pending,
    Completed(ProofingResult),
    Failed(String),
    /// Still pending long after it was enqueued; the worker is presumed gone.
    Lost,
}

#[derive(Clone)]
pub struct ProofingJobs {
    orchestrator: Arc<ProofingOrchestrator>,
    store: Arc<dyn IdvStore>,
    clock: Arc<dyn Clock>,
    mode: ExecutionMode,
    retry: RetryPolicy,
    stale_after_secs: u64,
}

impl ProofingJobs {
    pub fn new(
        orchestrator: Arc<ProofingOrchestrator>,
        store: Arc<dyn IdvStore>,
        clock: Arc<dyn Clock>,
        mode: ExecutionMode,
        params: &IdvParams,
    ) -> Self {
        Self {
            orchestrator,
            store,
            clock,
            mode,
            retry: RetryPolicy::from_params(&params.job_retry),
            stale_after_secs: params.proofing_job_stale_after_secs,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn orchestrator(&self) -> &ProofingOrchestrator {
        &self.orchestrator
    }

    /// Record a pending job and run it according to the execution mode.
    pub async fn submit(
        &self,
        user: UserId,
        request: CheckRequest,
        plan: ProofingPlan,
    ) -> Result<Submission, ProofingError> {
        let job = ProofingJob::pending(request.attempt_id, user, self.clock.now());
        self.store.put_job(&job)?;
        tracing::info!(attempt_id = %job.attempt_id, mode = ?self.mode, "proofing job submitted");

        match self.mode {
            ExecutionMode::Synchronous => {
                let attempt_id = job.attempt_id;
                match self.execute(job, &request, &plan).await? {
                    Some(result) => Ok(Submission::Completed(result)),
                    None => Err(ProofingError::StaleAttempt(attempt_id)),
                }
            }
            ExecutionMode::Background => {
                let this = self.clone();
                let handle = tokio::spawn(async move {
                    let attempt_id = job.attempt_id;
                    if let Err(error) = this.execute(job, &request, &plan).await {
                        tracing::error!(%attempt_id, %error, "background proofing job failed");
                    }
                });
                Ok(Submission::Queued(handle))
            }
        }
    }

    /// The job is still the one recorded for its attempt, and the attempt is
    /// still the user's current one.
    fn is_current(&self, job: &ProofingJob) -> Result<bool, ProofingError> {
        let current = self.store.current_attempt_id(job.user_id)?;
        if current != Some(job.attempt_id) {
            return Ok(false);
        }
        Ok(self
            .store
            .get_job(job.attempt_id)?
            .is_some_and(|stored| stored.enqueued_at == job.enqueued_at))
    }

    async fn execute(
        &self,
        job: ProofingJob,
        request: &CheckRequest,
        plan: &ProofingPlan,
    ) -> Result<Option<ProofingResult>, ProofingError> {
        if !self.is_current(&job)? {
            tracing::warn!(attempt_id = %job.attempt_id, "discarding stale proofing job");
            return Ok(None);
        }

        let (status, outcome) = match self.orchestrator.run(job.attempt_id, request, plan).await {
            Ok(result) => (ProofingJobStatus::Completed(Box::new(result.clone())), Ok(Some(result))),
            Err(error) => (ProofingJobStatus::Failed(error.to_string()), Err(error)),
        };
        if !self.is_current(&job)? {
            tracing::warn!(attempt_id = %job.attempt_id, "attempt abandoned while checks ran, dropping result");
            return Ok(None);
        }
        let done = ProofingJob {
            status,
            tries: job.tries + 1,
            ..job
        };

        let store = &self.store;
        let done = &done;
        retry_async(&self.retry, "store_proofing_result", |_| async move {
            store.put_job(done).map_err(ProofingError::from)
        })
        .await
        .map_err(RetryError::into_inner)?;

        outcome
    }

    pub fn poll(&self, attempt_id: AttemptId) -> Result<JobPoll, ProofingError> {
        let Some(job) = self.store.get_job(attempt_id)? else {
            return Ok(JobPoll::Missing);
        };
        Ok(match job.status {
            ProofingJobStatus::Pending
                if job
                    .enqueued_at
                    .has_expired(self.stale_after_secs, self.clock.now()) =>
            {
                tracing::warn!(%attempt_id, "proofing job presumed lost");
                JobPoll::Lost
            }
            ProofingJobStatus::Pending => JobPoll::Pending,
            ProofingJobStatus::Completed(result) => JobPoll::Completed(*result),
            ProofingJobStatus::Failed(message) => JobPoll::Failed(message),
        })
    }

    /// Forget the job for an abandoned attempt.
    pub fn discard(&self, attempt_id: AttemptId) -> Result<(), ProofingError> {
        Ok(self.store.delete_job(attempt_id)?)
    }
}
