//! Post-hoc non-overlap check for session sets.
//!
//! The verifier reports violations; it never repairs them. Whether a
//! violation also rejects the batch that produced it is decided by
//! [`OverlapPolicy`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::Session;
use crate::error::{EngineError, EngineResult};
use crate::segmentation::summary::SessionDraft;

const ENABLE_LOGS: bool = true;

use crate::log_error;

/// Anything with a half-open `[start, end)` span.
pub trait SessionSpan {
    /// Persisted id, if any.
    fn span_id(&self) -> Option<i64>;
    fn span_start(&self) -> DateTime<Utc>;
    fn span_end(&self) -> DateTime<Utc>;
}

impl SessionSpan for Session {
    fn span_id(&self) -> Option<i64> {
        Some(self.id)
    }

    fn span_start(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn span_end(&self) -> DateTime<Utc> {
        self.end_time
    }
}

impl SessionSpan for SessionDraft {
    fn span_id(&self) -> Option<i64> {
        None
    }

    fn span_start(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn span_end(&self) -> DateTime<Utc> {
        self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlap {
    pub earlier_id: Option<i64>,
    pub earlier_end: DateTime<Utc>,
    pub later_id: Option<i64>,
    pub later_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Log violations and carry on.
    #[default]
    Log,
    /// Log violations and fail the batch that produced them.
    Reject,
}

/// Sort by start and report every adjacent pair with `end > next.start`.
pub fn find_overlaps<S: SessionSpan>(sessions: &[S]) -> Vec<Overlap> {
    let mut ordered: Vec<&S> = sessions.iter().collect();
    ordered.sort_by_key(|s| (s.span_start(), s.span_end()));

    ordered
        .windows(2)
        .filter(|pair| pair[0].span_end() > pair[1].span_start())
        .map(|pair| Overlap {
            earlier_id: pair[0].span_id(),
            earlier_end: pair[0].span_end(),
            later_id: pair[1].span_id(),
            later_start: pair[1].span_start(),
        })
        .collect()
}

/// Run the verifier, log any violation, and apply `policy`.
pub fn verify_sessions<S: SessionSpan>(sessions: &[S], policy: OverlapPolicy) -> EngineResult<()> {
    let overlaps = find_overlaps(sessions);
    if overlaps.is_empty() {
        return Ok(());
    }

    for overlap in &overlaps {
        log_error!(
            "consistency violation: session {:?} ends at {} after session {:?} starts at {}",
            overlap.earlier_id,
            overlap.earlier_end,
            overlap.later_id,
            overlap.later_start
        );
    }

    match policy {
        OverlapPolicy::Log => Ok(()),
        OverlapPolicy::Reject => Err(EngineError::ConsistencyViolation(overlaps)),
    }
}
