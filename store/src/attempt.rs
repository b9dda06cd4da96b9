//! In-progress attempt storage trait.

use crate::StoreError;
use idv_types::{Attempt, AttemptId, UserId};

pub trait AttemptStore {
    /// Insert or replace an attempt.
    fn put_attempt(&self, attempt: &Attempt) -> Result<(), StoreError>;

    fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StoreError>;

    /// The attempt a user's requests currently act on.
    fn current_attempt_id(&self, user: UserId) -> Result<Option<AttemptId>, StoreError>;

    fn set_current_attempt(&self, user: UserId, id: Option<AttemptId>) -> Result<(), StoreError>;
}
