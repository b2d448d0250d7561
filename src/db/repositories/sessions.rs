use anyhow::{Context, Result};
use chrono::{SubsecRound, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_origin, to_i64},
    models::{CommitConflict, CommitOutcome, Session},
};
use crate::segmentation::SessionDraft;

fn row_to_session(row: &Row) -> Result<Session> {
    let start_time: String = row.get("start_time")?;
    let end_time: String = row.get("end_time")?;
    let created_at: String = row.get("created_at")?;
    let origin: String = row.get("origin")?;

    Ok(Session {
        id: row.get("id")?,
        session_name: row.get("session_name")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_datetime(&end_time, "end_time")?,
        total_duration_sec: row.get("total_duration_sec")?,
        productivity_score: row.get("productivity_score")?,
        origin: parse_origin(&origin)?,
        is_displayed: row.get("is_displayed")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    /// Insert sessions and assign their members in a single transaction.
    ///
    /// Assignment is compare-and-set: a member is only claimed while its
    /// `session_id` is still NULL. If any member is already claimed, or any new
    /// span overlaps a persisted session (including one inserted earlier in
    /// the same call), the transaction is rolled back and nothing is written.
    pub async fn commit_sessions(&self, drafts: &[SessionDraft]) -> Result<CommitOutcome> {
        let drafts = drafts.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let created_at = Utc::now().trunc_subsecs(6);
            let mut committed = Vec::with_capacity(drafts.len());

            for draft in &drafts {
                let start = format_datetime(&draft.start_time);
                let end = format_datetime(&draft.end_time);

                let overlapping: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM sessions
                         WHERE start_time < ?1 AND end_time > ?2
                         ORDER BY start_time ASC
                         LIMIT 1",
                        params![end, start],
                        |row| row.get(0),
                    )
                    .optional()?;

                if let Some(existing_id) = overlapping {
                    return Ok(CommitOutcome::Conflict(CommitConflict::SpanOverlap {
                        start: draft.start_time,
                        end: draft.end_time,
                        existing_id,
                    }));
                }

                tx.execute(
                    "INSERT INTO sessions (
                        session_name,
                        start_time,
                        end_time,
                        total_duration_sec,
                        productivity_score,
                        origin,
                        is_displayed,
                        created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
                    params![
                        draft.session_name,
                        start,
                        end,
                        draft.total_duration_sec,
                        draft.productivity_score,
                        draft.origin.as_str(),
                        format_datetime(&created_at),
                    ],
                )
                .context("failed to insert session")?;
                let session_id = tx.last_insert_rowid();

                let mut rejected = Vec::new();
                {
                    let mut assign = tx.prepare_cached(
                        "UPDATE activities
                         SET session_id = ?1
                         WHERE id = ?2 AND session_id IS NULL",
                    )?;
                    for activity_id in &draft.member_ids {
                        if assign.execute(params![session_id, activity_id])? == 0 {
                            rejected.push(*activity_id);
                        }
                    }
                }

                if !rejected.is_empty() {
                    return Ok(CommitOutcome::Conflict(CommitConflict::AlreadyAssigned {
                        expected: draft.member_ids.len(),
                        activity_ids: rejected,
                    }));
                }

                committed.push(Session {
                    id: session_id,
                    session_name: draft.session_name.clone(),
                    start_time: draft.start_time,
                    end_time: draft.end_time,
                    total_duration_sec: draft.total_duration_sec,
                    productivity_score: draft.productivity_score,
                    origin: draft.origin,
                    is_displayed: true,
                    created_at,
                });
            }

            tx.commit().context("failed to commit sessions")?;
            Ok(CommitOutcome::Committed(committed))
        })
        .await
    }

    pub async fn get_session(&self, session_id: i64) -> Result<Option<Session>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_name, start_time, end_time, total_duration_sec,
                        productivity_score, origin, is_displayed, created_at
                 FROM sessions
                 WHERE id = ?1",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    pub async fn fetch_sessions_ordered_by_start(&self) -> Result<Vec<Session>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_name, start_time, end_time, total_duration_sec,
                        productivity_score, origin, is_displayed, created_at
                 FROM sessions
                 ORDER BY start_time ASC, id ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }

    pub async fn list_sessions_paginated(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Session>> {
        let limit = to_i64(limit)?;
        let offset = to_i64(offset)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_name, start_time, end_time, total_duration_sec,
                        productivity_score, origin, is_displayed, created_at
                 FROM sessions
                 ORDER BY start_time DESC
                 LIMIT ?1 OFFSET ?2",
            )?;

            let mut rows = stmt.query(params![limit, offset])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{NewActivity, SessionOrigin};
    use chrono::{DateTime, Duration, TimeZone};
    use tempfile::TempDir;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap()
    }

    async fn seed(db: &Database, minutes: std::ops::Range<i64>) -> Vec<i64> {
        let mut ids = Vec::new();
        for minute in minutes {
            let activity = db
                .insert_activity(&NewActivity {
                    timestamp_start: base() + Duration::minutes(minute),
                    duration_sec: 60,
                    details: format!("minute {minute}"),
                })
                .await
                .unwrap();
            db.update_activity_score(activity.id, 6, false, None).await.unwrap();
            ids.push(activity.id);
        }
        ids
    }

    fn draft(start_min: i64, end_min: i64, member_ids: Vec<i64>) -> SessionDraft {
        SessionDraft {
            session_name: "Work Session".into(),
            start_time: base() + Duration::minutes(start_min),
            end_time: base() + Duration::minutes(end_min),
            total_duration_sec: (end_min - start_min) * 60,
            productivity_score: Some(6),
            origin: SessionOrigin::Batch,
            member_ids,
        }
    }

    fn setup() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("sessions.sqlite3")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn test_commit_assigns_members() {
        let (_dir, db) = setup();
        let ids = seed(&db, 0..3).await;

        let outcome = db.commit_sessions(&[draft(0, 3, ids.clone())]).await.unwrap();
        let sessions = match outcome {
            CommitOutcome::Committed(sessions) => sessions,
            other => panic!("expected commit, got {other:?}"),
        };
        assert_eq!(sessions.len(), 1);

        let members = db.fetch_session_activities(sessions[0].id).await.unwrap();
        assert_eq!(members.iter().map(|a| a.id).collect::<Vec<_>>(), ids);

        let stored = db.fetch_sessions_ordered_by_start().await.unwrap();
        assert_eq!(stored, sessions);
        assert_eq!(db.get_session(sessions[0].id).await.unwrap(), Some(sessions[0].clone()));
    }

    #[tokio::test]
    async fn test_already_assigned_member_rolls_back_everything() {
        let (_dir, db) = setup();
        let ids = seed(&db, 0..4).await;

        db.commit_sessions(&[draft(0, 2, ids[..2].to_vec())]).await.unwrap();

        // Second batch: one clean session plus one that re-claims ids[1].
        let outcome = db
            .commit_sessions(&[draft(2, 4, ids[2..].to_vec()), draft(10, 11, vec![ids[1]])])
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CommitOutcome::Conflict(CommitConflict::AlreadyAssigned {
                expected: 1,
                activity_ids: vec![ids[1]],
            })
        );

        assert_eq!(db.fetch_sessions_ordered_by_start().await.unwrap().len(), 1);
        let unassigned = db
            .fetch_unsessionized_in_range(base(), base() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(unassigned.len(), 2);
    }

    #[tokio::test]
    async fn test_overlapping_span_is_refused() {
        let (_dir, db) = setup();
        let ids = seed(&db, 0..4).await;

        db.commit_sessions(&[draft(0, 3, ids[..3].to_vec())]).await.unwrap();
        let outcome = db.commit_sessions(&[draft(2, 4, vec![ids[3]])]).await.unwrap();
        assert!(matches!(
            outcome,
            CommitOutcome::Conflict(CommitConflict::SpanOverlap { .. })
        ));

        // Touching spans are fine.
        let outcome = db.commit_sessions(&[draft(3, 4, vec![ids[3]])]).await.unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed(_)));
    }

    #[tokio::test]
    async fn test_pagination_is_newest_first() {
        let (_dir, db) = setup();
        let ids = seed(&db, 0..3).await;
        db.commit_sessions(&[
            draft(0, 1, vec![ids[0]]),
            draft(1, 2, vec![ids[1]]),
            draft(2, 3, vec![ids[2]]),
        ])
        .await
        .unwrap();

        let page = db.list_sessions_paginated(2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(page[0].start_time > page[1].start_time);
    }
}
