//! Error type for constructing and merging core values.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("proofing component {category} already set to {existing}, refusing {incoming}")]
    ComponentConflict {
        category: &'static str,
        existing: String,
        incoming: String,
    },

    #[error("invalid attempt id: {0}")]
    InvalidAttemptId(String),
}
