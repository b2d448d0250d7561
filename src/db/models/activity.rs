//! Activity data models.
//!
//! An activity is one observed unit of work: a `(timestamp_start, duration,
//! details)` capture plus the score attached shortly afterwards.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lowest score the scorer or a user correction may assign.
pub const MIN_SCORE: i32 = -10;
/// Highest score the scorer or a user correction may assign.
pub const MAX_SCORE: i32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: i64,
    pub timestamp_start: DateTime<Utc>,
    pub duration_sec: i64,
    pub details: String,
    pub productivity_score: Option<i32>,
    pub user_provided: bool,
    pub reasoning: Option<String>,
    pub session_id: Option<i64>,
}

impl Activity {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.timestamp_start + Duration::seconds(self.duration_sec)
    }

    /// Scored, non-empty and not yet owned by a session.
    pub fn is_sessionizable(&self) -> bool {
        self.session_id.is_none() && self.duration_sec > 0 && self.productivity_score.is_some()
    }
}

/// Capture input before the store assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewActivity {
    pub timestamp_start: DateTime<Utc>,
    pub duration_sec: i64,
    pub details: String,
}

/// A user correction of a machine score, fed back to the scorer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreCorrection {
    pub details: String,
    pub prior_score: Option<i32>,
    pub corrected_score: i32,
}

pub fn is_valid_score(score: i32) -> bool {
    (MIN_SCORE..=MAX_SCORE).contains(&score)
}
