use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};

use crate::db::models::{
    is_valid_score, Activity, CommitConflict, CommitOutcome, NewActivity, ScoreCorrection, Session,
};
use crate::segmentation::SessionDraft;
use crate::store::ActivityStore;

#[derive(Debug, Default)]
struct Tables {
    activities: Vec<Activity>,
    sessions: Vec<Session>,
    corrections: Vec<ScoreCorrection>,
}

/// In-process store with the same commit semantics as the SQLite one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

fn sorted(mut activities: Vec<Activity>) -> Vec<Activity> {
    activities.sort_by_key(|a| (a.timestamp_start, a.id));
    activities
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn insert_activity(&self, activity: &NewActivity) -> Result<Activity> {
        if activity.duration_sec < 0 {
            bail!("activity duration must not be negative: {}", activity.duration_sec);
        }

        let mut tables = self.lock()?;
        let id = tables.activities.last().map_or(1, |a| a.id + 1);
        let stored = Activity {
            id,
            timestamp_start: activity.timestamp_start,
            duration_sec: activity.duration_sec,
            details: activity.details.clone(),
            productivity_score: None,
            user_provided: false,
            reasoning: None,
            session_id: None,
        };
        tables.activities.push(stored.clone());
        Ok(stored)
    }

    async fn update_activity_score(
        &self,
        activity_id: i64,
        score: i32,
        user_provided: bool,
        reasoning: Option<String>,
    ) -> Result<()> {
        if !is_valid_score(score) {
            bail!("productivity score {score} is outside [-10, 10]");
        }

        let mut tables = self.lock()?;
        let activity = tables
            .activities
            .iter_mut()
            .find(|a| a.id == activity_id)
            .ok_or_else(|| anyhow!("activity {activity_id} not found"))?;
        activity.productivity_score = Some(score);
        activity.user_provided = user_provided;
        activity.reasoning = reasoning;
        Ok(())
    }

    async fn correct_activity_score(
        &self,
        activity_id: i64,
        score: i32,
    ) -> Result<ScoreCorrection> {
        if !is_valid_score(score) {
            bail!("productivity score {score} is outside [-10, 10]");
        }

        let mut tables = self.lock()?;
        let activity = tables
            .activities
            .iter_mut()
            .find(|a| a.id == activity_id)
            .ok_or_else(|| anyhow!("activity {activity_id} not found"))?;

        let correction = ScoreCorrection {
            details: activity.details.clone(),
            prior_score: activity.productivity_score,
            corrected_score: score,
        };
        activity.productivity_score = Some(score);
        activity.user_provided = true;
        activity.reasoning = None;

        tables.corrections.push(correction.clone());
        Ok(correction)
    }

    async fn list_corrections(&self, limit: usize) -> Result<Vec<ScoreCorrection>> {
        let tables = self.lock()?;
        Ok(tables.corrections.iter().rev().take(limit).cloned().collect())
    }

    async fn fetch_activities_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Activity>> {
        let tables = self.lock()?;
        Ok(sorted(
            tables
                .activities
                .iter()
                .filter(|a| a.timestamp_start >= start && a.timestamp_start < end)
                .cloned()
                .collect(),
        ))
    }

    async fn fetch_activities_by_id_range(
        &self,
        first_id: i64,
        last_id: i64,
    ) -> Result<Vec<Activity>> {
        let tables = self.lock()?;
        Ok(tables
            .activities
            .iter()
            .filter(|a| (first_id..=last_id).contains(&a.id))
            .cloned()
            .collect())
    }

    async fn fetch_unsessionized_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Activity>> {
        let tables = self.lock()?;
        Ok(sorted(
            tables
                .activities
                .iter()
                .filter(|a| a.is_sessionizable())
                .filter(|a| a.timestamp_start >= start && a.timestamp_start < end)
                .cloned()
                .collect(),
        ))
    }

    async fn commit_sessions(&self, drafts: &[SessionDraft]) -> Result<CommitOutcome> {
        let mut tables = self.lock()?;
        let created_at = Utc::now().trunc_subsecs(6);

        // Validate everything against a scratch copy, then swap it in.
        let mut sessions = tables.sessions.clone();
        let mut activities = tables.activities.clone();
        let mut committed = Vec::with_capacity(drafts.len());
        let mut next_id = sessions.iter().map(|s| s.id).max().unwrap_or(0) + 1;

        for draft in drafts {
            if let Some(existing) = sessions
                .iter()
                .filter(|s| s.start_time < draft.end_time && s.end_time > draft.start_time)
                .min_by_key(|s| s.start_time)
            {
                return Ok(CommitOutcome::Conflict(CommitConflict::SpanOverlap {
                    start: draft.start_time,
                    end: draft.end_time,
                    existing_id: existing.id,
                }));
            }

            let session_id = next_id;
            next_id += 1;

            let mut rejected = Vec::new();
            for member_id in &draft.member_ids {
                match activities
                    .iter_mut()
                    .find(|a| a.id == *member_id && a.session_id.is_none())
                {
                    Some(activity) => activity.session_id = Some(session_id),
                    None => rejected.push(*member_id),
                }
            }
            if !rejected.is_empty() {
                return Ok(CommitOutcome::Conflict(CommitConflict::AlreadyAssigned {
                    expected: draft.member_ids.len(),
                    activity_ids: rejected,
                }));
            }

            let session = Session {
                id: session_id,
                session_name: draft.session_name.clone(),
                start_time: draft.start_time,
                end_time: draft.end_time,
                total_duration_sec: draft.total_duration_sec,
                productivity_score: draft.productivity_score,
                origin: draft.origin,
                is_displayed: true,
                created_at,
            };
            sessions.push(session.clone());
            committed.push(session);
        }

        tables.sessions = sessions;
        tables.activities = activities;
        Ok(CommitOutcome::Committed(committed))
    }

    async fn fetch_sessions_ordered_by_start(&self) -> Result<Vec<Session>> {
        let tables = self.lock()?;
        let mut sessions = tables.sessions.clone();
        sessions.sort_by_key(|s| (s.start_time, s.id));
        Ok(sessions)
    }

    async fn fetch_session_activities(&self, session_id: i64) -> Result<Vec<Activity>> {
        let tables = self.lock()?;
        Ok(sorted(
            tables
                .activities
                .iter()
                .filter(|a| a.session_id == Some(session_id))
                .cloned()
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SessionOrigin;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_conflicting_commit_leaves_store_untouched() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for minute in 0..2 {
            let a = store
                .insert_activity(&NewActivity {
                    timestamp_start: base() + Duration::minutes(minute),
                    duration_sec: 60,
                    details: "x".into(),
                })
                .await
                .unwrap();
            ids.push(a.id);
        }

        let draft = |member_ids: Vec<i64>, start: i64, end: i64| SessionDraft {
            session_name: "Work Session".into(),
            start_time: base() + Duration::minutes(start),
            end_time: base() + Duration::minutes(end),
            total_duration_sec: 60,
            productivity_score: Some(5),
            origin: SessionOrigin::Streaming,
            member_ids,
        };

        let outcome = store
            .commit_sessions(&[draft(vec![ids[0]], 0, 1), draft(vec![ids[0]], 1, 2)])
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CommitOutcome::Conflict(CommitConflict::AlreadyAssigned { .. })
        ));
        assert!(store.fetch_sessions_ordered_by_start().await.unwrap().is_empty());
        assert!(store.fetch_session_activities(1).await.unwrap().is_empty());
    }
}
