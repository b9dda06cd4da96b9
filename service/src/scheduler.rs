//! Periodic jobs: in-person status polling, the fraud-review sweep and
//! mailed-code expiry.
//!
//! Each job runs on its own task and stops on the shutdown broadcast. A
//! failed run is logged and the loop waits for the next tick.

use std::sync::Arc;
use std::time::Duration;

use idv_types::{IdvParams, DAY_SECS};
use tokio::task::JoinHandle;

use crate::jobs::JobRunner;
use crate::shutdown::ShutdownController;
use crate::{IdvService, ServiceError};

const FRAUD_SWEEP_INTERVAL_SECS: u64 = 3600;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Job {
    InPersonPoll,
    FraudSweep,
    GpoExpiry,
}

impl Job {
    pub const ALL: [Job; 3] = [Job::InPersonPoll, Job::FraudSweep, Job::GpoExpiry];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InPersonPoll => "in_person_poll",
            Self::FraudSweep => "fraud_sweep",
            Self::GpoExpiry => "gpo_expiry",
        }
    }
}

/// How often each job runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Intervals {
    pub in_person_poll: Duration,
    pub fraud_sweep: Duration,
    pub gpo_expiry: Duration,
}

impl Intervals {
    pub fn from_params(params: &IdvParams) -> Self {
        Self {
            in_person_poll: Duration::from_secs(params.in_person_poll_interval_secs.max(1)),
            fraud_sweep: Duration::from_secs(FRAUD_SWEEP_INTERVAL_SECS),
            gpo_expiry: Duration::from_secs(DAY_SECS),
        }
    }

    pub fn of(&self, job: Job) -> Duration {
        match job {
            Job::InPersonPoll => self.in_person_poll,
            Job::FraudSweep => self.fraud_sweep,
            Job::GpoExpiry => self.gpo_expiry,
        }
    }
}

pub struct Scheduler {
    service: Arc<IdvService>,
    runner: Arc<JobRunner>,
    intervals: Intervals,
}

impl Scheduler {
    pub fn new(service: Arc<IdvService>, params: &IdvParams) -> Self {
        Self::with_intervals(service, params, Intervals::from_params(params))
    }

    pub fn with_intervals(service: Arc<IdvService>, params: &IdvParams, intervals: Intervals) -> Self {
        Self {
            service,
            runner: Arc::new(JobRunner::new(params)),
            intervals,
        }
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    /// Run `job` once under the retry policy. Returns how many profiles the
    /// run touched.
    pub async fn run_once(&self, job: Job) -> Result<usize, ServiceError> {
        run_job(&self.service, &self.runner, job).await
    }

    /// Start every job loop.
    pub fn spawn(&self, shutdown: &ShutdownController) -> Vec<JoinHandle<()>> {
        Job::ALL
            .into_iter()
            .map(|job| self.spawn_job(job, shutdown))
            .collect()
    }

    fn spawn_job(&self, job: Job, shutdown: &ShutdownController) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let runner = Arc::clone(&self.runner);
        let period = self.intervals.of(job);
        let mut shutdown_rx = shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(job = job.as_str(), period_secs = period.as_secs(), "job scheduled");
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!(job = job.as_str(), "job shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        match run_job(&service, &runner, job).await {
                            Ok(0) => {}
                            Ok(touched) => tracing::info!(job = job.as_str(), touched, "job run finished"),
                            Err(e) => tracing::error!(job = job.as_str(), error = %e, "job run failed"),
                        }
                    }
                }
            }
        })
    }
}

async fn run_job(service: &IdvService, runner: &JobRunner, job: Job) -> Result<usize, ServiceError> {
    match job {
        Job::InPersonPoll => {
            let report = runner.run(job.as_str(), || service.poll_in_person()).await?;
            Ok(report.passed.len() + report.closed.len())
        }
        Job::FraudSweep => runner
            .run(job.as_str(), || async move { service.sweep_fraud_reviews() })
            .await
            .map(|swept| swept.len()),
        Job::GpoExpiry => runner
            .run(job.as_str(), || async move { service.expire_gpo_codes() })
            .await
            .map(|expired| expired.len()),
    }
}
