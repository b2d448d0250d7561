use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::models::{Activity, CommitOutcome, Session, SessionOrigin};
use crate::error::EngineResult;
use crate::segmentation::{
    name_session, partition, verify_sessions, BatchConfig, OverlapPolicy, ScoredActivity,
    SessionDraft,
};
use crate::sessionizer::conflict_error;
use crate::store::ActivityStore;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub activities_considered: usize,
    pub sessions: Vec<Session>,
    /// Activities that start in the range but end after it; left unassigned.
    pub straddling: Vec<i64>,
}

/// Partition the unsessionized activities lying wholly inside `[start, end)`
/// and commit every resulting session in one atomic write.
///
/// An activity that starts in the range but ends past `end` is left out:
/// any session containing it would reach beyond the range, which for a gap
/// range means into the next persisted session. It is logged and retried
/// by later passes, which succeed once the range grows past its end.
///
/// Either all groups of the range are persisted with their members assigned,
/// or nothing is; callers retry the whole range on failure.
pub async fn run_batch<S>(
    store: &S,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    config: &BatchConfig,
    policy: OverlapPolicy,
) -> EngineResult<BatchReport>
where
    S: ActivityStore + ?Sized,
{
    if end <= start {
        return Ok(BatchReport::default());
    }

    let (activities, straddlers): (Vec<Activity>, Vec<Activity>) = store
        .fetch_unsessionized_in_range(start, end)
        .await?
        .into_iter()
        .partition(|activity| activity.end_time() <= end);

    for activity in &straddlers {
        log_warn!(
            "data anomaly: activity {} ({} - {}) runs past range end {}; left unassigned",
            activity.id,
            activity.timestamp_start,
            activity.end_time(),
            end
        );
    }
    let straddling: Vec<i64> = straddlers.iter().map(|a| a.id).collect();

    let activities_considered = activities.len();
    if activities.is_empty() {
        return Ok(BatchReport {
            straddling,
            ..BatchReport::default()
        });
    }

    let drafts: Vec<SessionDraft> = partition(activities, config)
        .into_iter()
        .filter_map(|group| {
            let name = name_session(&group, config);
            let members: Vec<ScoredActivity> =
                group.into_iter().map(ScoredActivity::from_stored).collect();
            SessionDraft::from_members(name, SessionOrigin::Batch, &members)
        })
        .collect();

    verify_sessions(&drafts, policy)?;

    let sessions = match store.commit_sessions(&drafts).await? {
        CommitOutcome::Committed(sessions) => sessions,
        CommitOutcome::Conflict(conflict) => {
            let err = conflict_error(conflict);
            log_warn!("batch {} - {}: commit rolled back: {}", start, end, err);
            return Err(err);
        }
    };

    for session in &sessions {
        log_info!(
            "batch session {} '{}' committed: {} - {}, {}s, score {:?}",
            session.id,
            session.session_name,
            session.start_time,
            session.end_time,
            session.total_duration_sec,
            session.productivity_score
        );
    }

    // Post-commit check over everything persisted. Nothing can be rolled
    // back here, so violations are only reported.
    let persisted = store.fetch_sessions_ordered_by_start().await?;
    verify_sessions(&persisted, OverlapPolicy::Log)?;

    Ok(BatchReport {
        activities_considered,
        sessions,
        straddling,
    })
}
