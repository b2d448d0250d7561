//! Persistence seam shared by the streaming and batch paths.
//!
//! Both paths take the store as an explicit dependency so they can run
//! against SQLite in production and against [`MemoryStore`] in tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::models::{Activity, CommitOutcome, NewActivity, ScoreCorrection, Session};
use crate::db::Database;
use crate::segmentation::SessionDraft;

pub mod memory;

pub use memory::MemoryStore;

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn insert_activity(&self, activity: &NewActivity) -> Result<Activity>;

    async fn update_activity_score(
        &self,
        activity_id: i64,
        score: i32,
        user_provided: bool,
        reasoning: Option<String>,
    ) -> Result<()>;

    async fn correct_activity_score(&self, activity_id: i64, score: i32)
        -> Result<ScoreCorrection>;

    async fn list_corrections(&self, limit: usize) -> Result<Vec<ScoreCorrection>>;

    /// `start <= timestamp_start < end`, ordered by start then id.
    async fn fetch_activities_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Activity>>;

    /// Inclusive on both ends, ordered by id.
    async fn fetch_activities_by_id_range(&self, first_id: i64, last_id: i64)
        -> Result<Vec<Activity>>;

    /// Scored, non-empty, unassigned activities starting in `[start, end)`.
    async fn fetch_unsessionized_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Activity>>;

    /// Insert the sessions and claim their members atomically; see
    /// [`CommitOutcome`].
    async fn commit_sessions(&self, drafts: &[SessionDraft]) -> Result<CommitOutcome>;

    async fn fetch_sessions_ordered_by_start(&self) -> Result<Vec<Session>>;

    async fn fetch_session_activities(&self, session_id: i64) -> Result<Vec<Activity>>;
}

#[async_trait]
impl ActivityStore for Database {
    async fn insert_activity(&self, activity: &NewActivity) -> Result<Activity> {
        Database::insert_activity(self, activity).await
    }

    async fn update_activity_score(
        &self,
        activity_id: i64,
        score: i32,
        user_provided: bool,
        reasoning: Option<String>,
    ) -> Result<()> {
        Database::update_activity_score(self, activity_id, score, user_provided, reasoning).await
    }

    async fn correct_activity_score(
        &self,
        activity_id: i64,
        score: i32,
    ) -> Result<ScoreCorrection> {
        Database::correct_activity_score(self, activity_id, score).await
    }

    async fn list_corrections(&self, limit: usize) -> Result<Vec<ScoreCorrection>> {
        Database::list_corrections(self, limit).await
    }

    async fn fetch_activities_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Activity>> {
        Database::fetch_activities_by_time_range(self, start, end).await
    }

    async fn fetch_activities_by_id_range(
        &self,
        first_id: i64,
        last_id: i64,
    ) -> Result<Vec<Activity>> {
        Database::fetch_activities_by_id_range(self, first_id, last_id).await
    }

    async fn fetch_unsessionized_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Activity>> {
        Database::fetch_unsessionized_in_range(self, start, end).await
    }

    async fn commit_sessions(&self, drafts: &[SessionDraft]) -> Result<CommitOutcome> {
        Database::commit_sessions(self, drafts).await
    }

    async fn fetch_sessions_ordered_by_start(&self) -> Result<Vec<Session>> {
        Database::fetch_sessions_ordered_by_start(self).await
    }

    async fn fetch_session_activities(&self, session_id: i64) -> Result<Vec<Activity>> {
        Database::fetch_session_activities(self, session_id).await
    }
}
