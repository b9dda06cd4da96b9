//! User storage trait.

use crate::StoreError;
use idv_types::{Timestamp, User, UserId};

pub trait UserStore {
    /// Insert or replace a user.
    fn put_user(&self, user: &User) -> Result<(), StoreError>;

    fn get_user(&self, id: UserId) -> Result<User, StoreError>;

    /// Atomically advance the user's password epoch and record the reset time.
    /// Returns the updated user.
    fn bump_password_epoch(&self, id: UserId, now: Timestamp) -> Result<User, StoreError>;
}
