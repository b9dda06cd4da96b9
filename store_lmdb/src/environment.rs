//! LMDB environment setup and shared codec helpers.
//!
//! One heed environment holds every database. Values are bincode-encoded;
//! keys are big-endian ids so prefix scans come back in id order.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::LmdbError;

pub(crate) type Db = Database<Bytes, Bytes>;

const MAX_DBS: u32 = 16;

/// Default map size: 1 GiB.
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

/// The LMDB environment and all database handles.
pub struct LmdbStore {
    pub(crate) env: Env,
    pub(crate) users_db: Db,
    pub(crate) profiles_db: Db,
    /// `user ++ profile -> ()`
    pub(crate) profiles_by_user_db: Db,
    pub(crate) enrollments_db: Db,
    /// `profile -> enrollment`
    pub(crate) enrollment_by_profile_db: Db,
    /// `profile ++ sent_at ++ code -> GpoConfirmationCode`
    pub(crate) gpo_codes_db: Db,
    pub(crate) attempts_db: Db,
    /// `user -> attempt`
    pub(crate) current_attempts_db: Db,
    pub(crate) rate_limits_db: Db,
    pub(crate) proofing_jobs_db: Db,
    pub(crate) phone_otps_db: Db,
    /// `profile ++ seq -> FraudReviewRecord`
    pub(crate) fraud_reviews_db: Db,
}

impl LmdbStore {
    /// Open or create an LMDB environment at the given directory.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;
        // SAFETY: the environment is opened once per process for this path and
        // the memory map is never modified outside of heed transactions.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let users_db: Db = env.create_database(&mut wtxn, Some("users"))?;
        let profiles_db: Db = env.create_database(&mut wtxn, Some("profiles"))?;
        let profiles_by_user_db: Db = env.create_database(&mut wtxn, Some("profiles_by_user"))?;
        let enrollments_db: Db = env.create_database(&mut wtxn, Some("enrollments"))?;
        let enrollment_by_profile_db: Db =
            env.create_database(&mut wtxn, Some("enrollment_by_profile"))?;
        let gpo_codes_db: Db = env.create_database(&mut wtxn, Some("gpo_codes"))?;
        let attempts_db: Db = env.create_database(&mut wtxn, Some("attempts"))?;
        let current_attempts_db: Db = env.create_database(&mut wtxn, Some("current_attempts"))?;
        let rate_limits_db: Db = env.create_database(&mut wtxn, Some("rate_limits"))?;
        let proofing_jobs_db: Db = env.create_database(&mut wtxn, Some("proofing_jobs"))?;
        let phone_otps_db: Db = env.create_database(&mut wtxn, Some("phone_otps"))?;
        let fraud_reviews_db: Db = env.create_database(&mut wtxn, Some("fraud_reviews"))?;
        wtxn.commit()?;

        tracing::info!(path = %path.display(), map_size, "opened LMDB store");

        Ok(Self {
            env,
            users_db,
            profiles_db,
            profiles_by_user_db,
            enrollments_db,
            enrollment_by_profile_db,
            gpo_codes_db,
            attempts_db,
            current_attempts_db,
            rate_limits_db,
            proofing_jobs_db,
            phone_otps_db,
            fraud_reviews_db,
        })
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LmdbError> {
    Ok(bincode::serialize(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LmdbError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Build composite key `a ++ b`.
pub(crate) fn composite_key(parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

pub(crate) fn get_value<T: DeserializeOwned>(
    db: &Db,
    txn: &RoTxn<'_>,
    key: &[u8],
) -> Result<Option<T>, LmdbError> {
    db.get(txn, key)?.map(decode::<T>).transpose()
}

/// Decode every value whose key starts with `prefix`.
pub(crate) fn prefix_values<T: DeserializeOwned>(
    db: &Db,
    txn: &RoTxn<'_>,
    prefix: &[u8],
) -> Result<Vec<T>, LmdbError> {
    let mut out = Vec::new();
    for item in db.prefix_iter(txn, prefix)? {
        let (_key, value) = item?;
        out.push(decode(value)?);
    }
    Ok(out)
}

/// Every key that starts with `prefix`.
pub(crate) fn prefix_keys(db: &Db, txn: &RoTxn<'_>, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbError> {
    let mut out = Vec::new();
    for item in db.prefix_iter(txn, prefix)? {
        let (key, _value) = item?;
        out.push(key.to_vec());
    }
    Ok(out)
}

/// Decode every value in `db`.
pub(crate) fn all_values<T: DeserializeOwned>(db: &Db, txn: &RoTxn<'_>) -> Result<Vec<T>, LmdbError> {
    let mut out = Vec::new();
    for item in db.iter(txn)? {
        let (_key, value) = item?;
        out.push(decode(value)?);
    }
    Ok(out)
}
