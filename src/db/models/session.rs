//! Session-related data models.
//!
//! A session is a maximal, contiguous span of activities judged to be one
//! sustained work episode. Rows are immutable once committed except for the
//! presentation-owned `is_displayed` flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which path committed the session boundaries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionOrigin {
    Streaming,
    Batch,
}

impl SessionOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOrigin::Streaming => "Streaming",
            SessionOrigin::Batch => "Batch",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub session_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_duration_sec: i64,
    /// `None` when the session has zero total duration (score indeterminate).
    pub productivity_score: Option<i32>,
    pub origin: SessionOrigin,
    pub is_displayed: bool,
    pub created_at: DateTime<Utc>,
}

/// Why an atomic session commit was rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitConflict {
    /// Members that were missing or already owned by another session.
    AlreadyAssigned {
        expected: usize,
        activity_ids: Vec<i64>,
    },
    /// The new span would overlap a persisted session.
    SpanOverlap {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        existing_id: i64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed(Vec<Session>),
    /// Nothing was written.
    Conflict(CommitConflict),
}
