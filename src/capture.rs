//! JSON-lines capture input.
//!
//! One record per line:
//! `{"timestamp_start": "2024-03-04T08:00:00Z", "duration_sec": 60, "details": "Terminal | cargo"}`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::NewActivity;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub timestamp_start: DateTime<Utc>,
    pub duration_sec: i64,
    pub details: String,
}

impl From<CaptureRecord> for NewActivity {
    fn from(record: CaptureRecord) -> Self {
        NewActivity {
            timestamp_start: record.timestamp_start,
            duration_sec: record.duration_sec,
            details: record.details,
        }
    }
}

/// Parse one input line. Blank lines and `#` comments yield `Ok(None)`.
pub fn parse_capture_line(line: &str) -> EngineResult<Option<NewActivity>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let record: CaptureRecord = serde_json::from_str(trimmed)
        .map_err(|err| EngineError::InvalidActivity(format!("malformed capture record: {err}")))?;

    if record.duration_sec < 0 {
        return Err(EngineError::InvalidActivity(format!(
            "negative duration {} for '{}'",
            record.duration_sec, record.details
        )));
    }

    Ok(Some(record.into()))
}
