use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::db::models::SessionOrigin;

/// Fixed-width RFC 3339 (microseconds, `Z`), so stored timestamps compare
/// correctly as text in SQL range filters.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_origin(value: &str) -> Result<SessionOrigin> {
    match value {
        "Streaming" => Ok(SessionOrigin::Streaming),
        "Batch" => Ok(SessionOrigin::Batch),
        other => Err(anyhow!("unknown session origin {other}")),
    }
}

pub fn to_i64(value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_formatted_timestamps_sort_lexically() {
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap();
        let later = base + Duration::milliseconds(1500);
        let a = format_datetime(&base);
        let b = format_datetime(&later);
        assert_eq!(a, "2024-03-04T08:00:00.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_datetime(&b, "ts").unwrap(), later);
    }

    #[test]
    fn test_parse_origin() {
        assert_eq!(parse_origin("Batch").unwrap(), SessionOrigin::Batch);
        assert!(parse_origin("Manual").is_err());
    }
}
