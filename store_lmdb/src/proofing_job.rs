//! LMDB implementation of ProofingJobStore.

use idv_store::{ProofingJobStore, StoreError};
use idv_types::{AttemptId, ProofingJob};

use crate::environment::{encode, get_value, LmdbStore};
use crate::LmdbError;

impl ProofingJobStore for LmdbStore {
    fn put_job(&self, job: &ProofingJob) -> Result<(), StoreError> {
        let bytes = encode(job)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.proofing_jobs_db
            .put(&mut wtxn, job.attempt_id.as_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_job(&self, attempt: AttemptId) -> Result<Option<ProofingJob>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(get_value(&self.proofing_jobs_db, &rtxn, attempt.as_bytes())?)
    }

    fn delete_job(&self, attempt: AttemptId) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.proofing_jobs_db
            .delete(&mut wtxn, attempt.as_bytes())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
