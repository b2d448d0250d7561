use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, to_i64},
    models::{is_valid_score, Activity, NewActivity, ScoreCorrection},
};

const ACTIVITY_COLUMNS: &str = "id, timestamp_start, duration_sec, details, productivity_score, \
     user_provided, reasoning, session_id";

fn row_to_activity(row: &Row) -> Result<Activity> {
    let timestamp_start: String = row.get("timestamp_start")?;

    Ok(Activity {
        id: row.get("id")?,
        timestamp_start: parse_datetime(&timestamp_start, "timestamp_start")?,
        duration_sec: row.get("duration_sec")?,
        details: row.get("details")?,
        productivity_score: row.get("productivity_score")?,
        user_provided: row.get("user_provided")?,
        reasoning: row.get("reasoning")?,
        session_id: row.get("session_id")?,
    })
}

fn collect_activities(
    conn: &rusqlite::Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Activity>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut activities = Vec::new();
    while let Some(row) = rows.next()? {
        activities.push(row_to_activity(row)?);
    }
    Ok(activities)
}

impl Database {
    pub async fn insert_activity(&self, activity: &NewActivity) -> Result<Activity> {
        if activity.duration_sec < 0 {
            bail!("activity duration must not be negative: {}", activity.duration_sec);
        }

        let record = activity.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO activities (timestamp_start, duration_sec, details, user_provided)
                 VALUES (?1, ?2, ?3, 0)",
                params![
                    format_datetime(&record.timestamp_start),
                    record.duration_sec,
                    record.details,
                ],
            )
            .context("failed to insert activity")?;

            Ok(Activity {
                id: conn.last_insert_rowid(),
                timestamp_start: record.timestamp_start,
                duration_sec: record.duration_sec,
                details: record.details,
                productivity_score: None,
                user_provided: false,
                reasoning: None,
                session_id: None,
            })
        })
        .await
    }

    pub async fn get_activity(&self, activity_id: i64) -> Result<Option<Activity>> {
        self.execute(move |conn| {
            let sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![activity_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_activity(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn update_activity_score(
        &self,
        activity_id: i64,
        score: i32,
        user_provided: bool,
        reasoning: Option<String>,
    ) -> Result<()> {
        if !is_valid_score(score) {
            bail!("productivity score {score} is outside [-10, 10]");
        }

        self.execute(move |conn| {
            let rows_affected = conn
                .execute(
                    "UPDATE activities
                     SET productivity_score = ?1,
                         user_provided = ?2,
                         reasoning = ?3
                     WHERE id = ?4",
                    params![score, user_provided, reasoning, activity_id],
                )
                .context("failed to update activity score")?;

            if rows_affected == 0 {
                bail!("activity {activity_id} not found");
            }
            Ok(())
        })
        .await
    }

    /// Overwrite the score with a user-provided one and record the correction.
    pub async fn correct_activity_score(
        &self,
        activity_id: i64,
        score: i32,
    ) -> Result<ScoreCorrection> {
        if !is_valid_score(score) {
            bail!("productivity score {score} is outside [-10, 10]");
        }

        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let existing: Option<(String, Option<i32>)> = tx
                .query_row(
                    "SELECT details, productivity_score FROM activities WHERE id = ?1",
                    params![activity_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((details, prior_score)) = existing else {
                bail!("activity {activity_id} not found");
            };

            tx.execute(
                "UPDATE activities
                 SET productivity_score = ?1,
                     user_provided = 1,
                     reasoning = NULL
                 WHERE id = ?2",
                params![score, activity_id],
            )?;

            tx.execute(
                "INSERT INTO score_corrections (activity_id, details, prior_score, corrected_score, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    activity_id,
                    details,
                    prior_score,
                    score,
                    format_datetime(&Utc::now()),
                ],
            )?;

            tx.commit().context("failed to commit score correction")?;

            Ok(ScoreCorrection {
                details,
                prior_score,
                corrected_score: score,
            })
        })
        .await
    }

    /// Most recent corrections first.
    pub async fn list_corrections(&self, limit: usize) -> Result<Vec<ScoreCorrection>> {
        let limit = to_i64(limit)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT details, prior_score, corrected_score
                 FROM score_corrections
                 ORDER BY id DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut corrections = Vec::new();
            while let Some(row) = rows.next()? {
                corrections.push(ScoreCorrection {
                    details: row.get(0)?,
                    prior_score: row.get(1)?,
                    corrected_score: row.get(2)?,
                });
            }
            Ok(corrections)
        })
        .await
    }

    /// Activities with `start <= timestamp_start < end`, oldest first.
    pub async fn fetch_activities_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Activity>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {ACTIVITY_COLUMNS} FROM activities
                 WHERE timestamp_start >= ?1 AND timestamp_start < ?2
                 ORDER BY timestamp_start ASC, id ASC"
            );
            collect_activities(conn, &sql, params![format_datetime(&start), format_datetime(&end)])
        })
        .await
    }

    /// Activities with `first_id <= id <= last_id`, ascending by id.
    pub async fn fetch_activities_by_id_range(
        &self,
        first_id: i64,
        last_id: i64,
    ) -> Result<Vec<Activity>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {ACTIVITY_COLUMNS} FROM activities
                 WHERE id >= ?1 AND id <= ?2
                 ORDER BY id ASC"
            );
            collect_activities(conn, &sql, params![first_id, last_id])
        })
        .await
    }

    /// Scored, non-empty, unassigned activities starting in `[start, end)`.
    pub async fn fetch_unsessionized_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Activity>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {ACTIVITY_COLUMNS} FROM activities
                 WHERE session_id IS NULL
                   AND duration_sec > 0
                   AND productivity_score IS NOT NULL
                   AND timestamp_start >= ?1 AND timestamp_start < ?2
                 ORDER BY timestamp_start ASC, id ASC"
            );
            collect_activities(conn, &sql, params![format_datetime(&start), format_datetime(&end)])
        })
        .await
    }

    pub async fn fetch_session_activities(&self, session_id: i64) -> Result<Vec<Activity>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {ACTIVITY_COLUMNS} FROM activities
                 WHERE session_id = ?1
                 ORDER BY timestamp_start ASC, id ASC"
            );
            collect_activities(conn, &sql, params![session_id])
        })
        .await
    }
}
