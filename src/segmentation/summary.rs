use chrono::{DateTime, Utc};

use crate::db::models::{Activity, SessionOrigin};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// An activity paired with the score the engine used for it (absent scores
/// count as 0).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredActivity {
    pub activity: Activity,
    pub score: f64,
}

impl ScoredActivity {
    pub fn new(activity: Activity, score: Option<f64>) -> Self {
        Self {
            activity,
            score: score.unwrap_or(0.0),
        }
    }

    /// Uses the persisted score.
    pub fn from_stored(activity: Activity) -> Self {
        let score = activity.productivity_score.map(f64::from);
        Self::new(activity, score)
    }
}

/// Session boundaries and aggregates committed to but not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDraft {
    pub session_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_duration_sec: i64,
    pub productivity_score: Option<i32>,
    pub origin: SessionOrigin,
    pub member_ids: Vec<i64>,
}

impl SessionDraft {
    /// Aggregate members into a draft. Returns `None` for an empty member list.
    ///
    /// `start_time` is the earliest member start and `end_time` the latest
    /// member end, so every member span is contained in the session span.
    /// For time-ordered, non-overlapping members this is the first start and
    /// the last member's `start + duration`.
    pub fn from_members(
        session_name: String,
        origin: SessionOrigin,
        members: &[ScoredActivity],
    ) -> Option<Self> {
        let first = members.first()?;

        let mut start_time = first.activity.timestamp_start;
        let mut end_time = first.activity.end_time();
        let mut total_duration_sec = 0i64;
        let mut weighted = 0.0f64;

        for member in members {
            start_time = start_time.min(member.activity.timestamp_start);
            end_time = end_time.max(member.activity.end_time());
            total_duration_sec += member.activity.duration_sec;
            weighted += member.score * member.activity.duration_sec as f64;
        }

        let productivity_score = if total_duration_sec > 0 {
            Some((weighted / total_duration_sec as f64).round() as i32)
        } else {
            log_warn!(
                "data anomaly: session '{}' starting {} has zero total duration; score is indeterminate",
                session_name,
                start_time
            );
            None
        };

        Some(Self {
            session_name,
            start_time,
            end_time,
            total_duration_sec,
            productivity_score,
            origin,
            member_ids: members.iter().map(|m| m.activity.id).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn activity(id: i64, minute: i64, duration_sec: i64, score: Option<i32>) -> Activity {
        Activity {
            id,
            timestamp_start: Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
                + Duration::minutes(minute),
            duration_sec,
            details: format!("activity {id}"),
            productivity_score: score,
            user_provided: false,
            reasoning: None,
            session_id: None,
        }
    }

    #[test]
    fn test_duration_weighted_score() {
        let members = vec![
            ScoredActivity::from_stored(activity(1, 0, 60, Some(10))),
            ScoredActivity::from_stored(activity(2, 1, 180, Some(-2))),
        ];
        let draft =
            SessionDraft::from_members("s".into(), SessionOrigin::Batch, &members).unwrap();
        // (10*60 + -2*180) / 240 = 1.0
        assert_eq!(draft.productivity_score, Some(1));
        assert_eq!(draft.total_duration_sec, 240);
        assert_eq!(draft.start_time, members[0].activity.timestamp_start);
        assert_eq!(draft.end_time, members[1].activity.end_time());
        assert_eq!(draft.member_ids, vec![1, 2]);
    }

    #[test]
    fn test_rounds_to_nearest() {
        let members = vec![
            ScoredActivity::from_stored(activity(1, 0, 60, Some(3))),
            ScoredActivity::from_stored(activity(2, 1, 60, Some(4))),
            ScoredActivity::from_stored(activity(3, 2, 60, Some(4))),
        ];
        let draft =
            SessionDraft::from_members("s".into(), SessionOrigin::Batch, &members).unwrap();
        // 11 / 3 = 3.67
        assert_eq!(draft.productivity_score, Some(4));
    }

    #[test]
    fn test_missing_score_counts_as_zero() {
        let members = vec![
            ScoredActivity::from_stored(activity(1, 0, 60, Some(8))),
            ScoredActivity::new(activity(2, 1, 60, None), None),
        ];
        let draft =
            SessionDraft::from_members("s".into(), SessionOrigin::Streaming, &members).unwrap();
        assert_eq!(draft.productivity_score, Some(4));
    }

    #[test]
    fn test_zero_duration_is_indeterminate() {
        let members = vec![ScoredActivity::from_stored(activity(1, 0, 0, Some(8)))];
        let draft =
            SessionDraft::from_members("s".into(), SessionOrigin::Batch, &members).unwrap();
        assert_eq!(draft.total_duration_sec, 0);
        assert_eq!(draft.productivity_score, None);
    }

    #[test]
    fn test_empty_members_yield_no_draft() {
        assert!(SessionDraft::from_members("s".into(), SessionOrigin::Batch, &[]).is_none());
    }
}
