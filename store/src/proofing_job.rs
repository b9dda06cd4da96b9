//! Proofing job storage trait. Jobs are keyed by attempt id.

use crate::StoreError;
use idv_types::{AttemptId, ProofingJob};

pub trait ProofingJobStore {
    fn put_job(&self, job: &ProofingJob) -> Result<(), StoreError>;

    fn get_job(&self, attempt: AttemptId) -> Result<Option<ProofingJob>, StoreError>;

    fn delete_job(&self, attempt: AttemptId) -> Result<(), StoreError>;
}
