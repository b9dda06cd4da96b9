//! LMDB storage backend for the identity-verification engine.
//!
//! Implements every storage trait from `idv-store` on a single `heed`
//! environment. Each logical store maps to one or more LMDB databases.

pub mod attempt;
pub mod audit;
pub mod enrollment;
pub mod environment;
pub mod error;
pub mod gpo;
pub mod phone;
pub mod profile;
pub mod proofing_job;
pub mod rate_limit;
pub mod user;

pub use environment::{LmdbStore, DEFAULT_MAP_SIZE};
pub use error::LmdbError;
