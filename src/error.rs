//! Engine error types.
//!
//! Storage code underneath returns `anyhow::Result` with context attached;
//! the engine surfaces those as [`EngineError::Storage`] so batch callers can
//! tell a retryable I/O failure apart from a consistency problem.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::segmentation::overlap::Overlap;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Persistence call failed (TransientIOError). Batch callers should retry
    /// the whole time range.
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    /// External scoring collaborator failed.
    #[error("scoring failed for '{details}': {message}")]
    Scoring { details: String, message: String },

    /// A member activity was already assigned by the other path.
    #[error("{already_assigned} of {expected} activities were already assigned to a session")]
    AssignmentConflict {
        expected: usize,
        already_assigned: usize,
    },

    /// A new session span would overlap a persisted session.
    #[error("session span {start} - {end} overlaps persisted session {existing_id}")]
    SpanConflict {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        existing_id: i64,
    },

    /// The Overlap Verifier found overlapping sessions and the configured
    /// policy rejects them.
    #[error("{} overlapping session pair(s) detected", .0.len())]
    ConsistencyViolation(Vec<Overlap>),

    #[error("invalid activity: {0}")]
    InvalidActivity(String),

    #[error("invalid configuration value for '{key}': {message}")]
    Config { key: String, message: String },
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// The other sessionization path claimed the data first; nothing was
    /// written and a later pass can retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::AssignmentConflict { .. } | EngineError::SpanConflict { .. }
        )
    }
}
