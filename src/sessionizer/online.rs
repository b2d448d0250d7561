use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::db::models::{Activity, CommitOutcome, NewActivity, Session, SessionOrigin};
use crate::error::{EngineError, EngineResult};
use crate::scoring::Scorer;
use crate::segmentation::{
    name_session, BatchConfig, ScoredActivity, Segmenter, SegmenterEvent, SessionDraft,
};
use crate::sessionizer::conflict_error;
use crate::store::ActivityStore;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Corrections replayed to the scorer with every request.
const CORRECTIONS_LIMIT: usize = 50;

/// The streaming segmenter bound to a store and a scorer.
///
/// Exactly one instance should exist per activity source. All methods take
/// `&mut self`, so feeding the segmenter is serialized by construction,
/// including across the awaits on scoring and persistence.
pub struct OnlineSessionizer {
    store: Arc<dyn ActivityStore>,
    scorer: Arc<dyn Scorer>,
    segmenter: Segmenter,
    batch_config: BatchConfig,
}

impl OnlineSessionizer {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        scorer: Arc<dyn Scorer>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            scorer,
            segmenter: Segmenter::new(config.segmenter.clone()),
            batch_config: config.batch.clone(),
        }
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    /// Start of the open session, if one is accumulating.
    pub fn open_since(&self) -> Option<DateTime<Utc>> {
        self.segmenter
            .state()
            .open_session
            .as_ref()
            .and_then(|members| members.first())
            .map(|first| first.activity.timestamp_start)
    }

    /// Persist a captured activity, score it, and feed it to the segmenter.
    ///
    /// Scoring problems never stall the stream: the activity is fed with a
    /// score of 0 and left unscored in the store. Returns the session closed
    /// by this activity, if any.
    pub async fn ingest(&mut self, capture: NewActivity) -> EngineResult<Option<Session>> {
        let mut activity = self.store.insert_activity(&capture).await?;
        let score = self.score_activity(&activity).await;

        if let Some(score) = score {
            activity.productivity_score = Some(score);
        }

        self.process_minute(activity, score.map(f64::from)).await
    }

    async fn score_activity(&self, activity: &Activity) -> Option<i32> {
        let corrections = match self.store.list_corrections(CORRECTIONS_LIMIT).await {
            Ok(corrections) => corrections,
            Err(err) => {
                log_warn!("could not load score corrections, scoring without them: {err:#}");
                Vec::new()
            }
        };

        let result = match self.scorer.score(&activity.details, &corrections).await {
            Ok(result) => result,
            Err(err) => {
                log_warn!(
                    "scorer failed for activity {}, falling back to 0: {}",
                    activity.id,
                    err
                );
                return None;
            }
        };

        if let Err(err) = self
            .store
            .update_activity_score(activity.id, result.score, false, Some(result.reasoning))
            .await
        {
            log_warn!("failed to persist score for activity {}: {err:#}", activity.id);
        }

        Some(result.score)
    }

    /// Feed one already-persisted activity. Absent scores count as 0.
    pub async fn process_minute(
        &mut self,
        activity: Activity,
        score: Option<f64>,
    ) -> EngineResult<Option<Session>> {
        match self.segmenter.process_minute(activity, score) {
            Some(SegmenterEvent::SessionOpened {
                activity_id,
                start_time,
            }) => {
                log_info!("session opened at activity {} ({})", activity_id, start_time);
                Ok(None)
            }
            Some(SegmenterEvent::SessionClosed { members }) => self.persist(members).await,
            None => Ok(None),
        }
    }

    /// Close the open session without waiting for a break run, e.g. at
    /// shutdown or end of input.
    pub async fn flush(&mut self) -> EngineResult<Option<Session>> {
        match self.segmenter.take_open_session() {
            Some(members) => {
                log_info!("flushing open session with {} member(s)", members.len());
                self.persist(members).await
            }
            None => Ok(None),
        }
    }

    /// Segmenter state is already reset when this runs. On failure the
    /// members stay unassigned in the store and the gap reconciler picks
    /// them up on its next pass.
    async fn persist(&mut self, members: Vec<ScoredActivity>) -> EngineResult<Option<Session>> {
        let name = name_session(members.iter().map(|m| &m.activity), &self.batch_config);
        let Some(draft) = SessionDraft::from_members(name, SessionOrigin::Streaming, &members)
        else {
            return Ok(None);
        };

        let outcome = match self.store.commit_sessions(std::slice::from_ref(&draft)).await {
            Ok(outcome) => outcome,
            Err(err) => {
                log_error!(
                    "failed to persist streaming session {} - {}; {} activities left for reconciliation: {err:#}",
                    draft.start_time,
                    draft.end_time,
                    draft.member_ids.len()
                );
                return Err(EngineError::Storage(err));
            }
        };

        match outcome {
            CommitOutcome::Committed(mut sessions) => {
                let session = sessions.pop();
                if let Some(session) = &session {
                    log_info!(
                        "session {} '{}' closed: {} - {}, {} activities, {}s, score {:?}",
                        session.id,
                        session.session_name,
                        session.start_time,
                        session.end_time,
                        draft.member_ids.len(),
                        session.total_duration_sec,
                        session.productivity_score
                    );
                }
                Ok(session)
            }
            CommitOutcome::Conflict(conflict) => {
                let err = conflict_error(conflict);
                log_warn!(
                    "streaming session {} - {} not persisted: {}",
                    draft.start_time,
                    draft.end_time,
                    err
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ScoreCorrection;
    use crate::scoring::ScoreResult;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    /// Replays a fixed score sequence; `None` entries simulate failures.
    struct ScriptedScorer {
        scores: Mutex<Vec<Option<i32>>>,
    }

    impl ScriptedScorer {
        fn new(mut scores: Vec<Option<i32>>) -> Self {
            scores.reverse();
            Self {
                scores: Mutex::new(scores),
            }
        }
    }

    #[async_trait]
    impl Scorer for ScriptedScorer {
        async fn score(
            &self,
            details: &str,
            _corrections: &[ScoreCorrection],
        ) -> EngineResult<ScoreResult> {
            let next = self.scores.lock().unwrap().pop().flatten();
            next.map(|score| ScoreResult::new(score, "scripted"))
                .ok_or_else(|| EngineError::Scoring {
                    details: details.to_string(),
                    message: "scripted failure".into(),
                })
        }
    }

    fn capture(minute: i64) -> NewActivity {
        NewActivity {
            timestamp_start: Utc.with_ymd_and_hms(2024, 3, 4, 7, 0, 0).unwrap()
                + Duration::minutes(minute),
            duration_sec: 60,
            details: format!("Editor | minute {minute}"),
        }
    }

    /// 60 warm-up minutes, 15 work minutes (opens on the last), 12 break
    /// minutes (closes on the last).
    fn workday_script() -> Vec<Option<i32>> {
        let mut scores: Vec<Option<i32>> = (0..60)
            .map(|i| Some(if i % 2 == 0 { -2 } else { 2 }))
            .collect();
        scores.extend(std::iter::repeat(Some(8)).take(15));
        scores.extend(std::iter::repeat(Some(-8)).take(12));
        scores
    }

    #[tokio::test]
    async fn test_ingest_opens_and_closes_a_session() {
        let store = Arc::new(MemoryStore::new());
        let scorer = Arc::new(ScriptedScorer::new(workday_script()));
        let mut online = OnlineSessionizer::new(store.clone(), scorer, &EngineConfig::default());

        let mut closed = Vec::new();
        for minute in 0..87 {
            if let Some(session) = online.ingest(capture(minute)).await.unwrap() {
                closed.push((minute, session));
            }
            if minute == 74 {
                assert_eq!(online.open_since(), Some(capture(74).timestamp_start));
            }
        }

        assert_eq!(closed.len(), 1);
        let (minute, session) = &closed[0];
        assert_eq!(*minute, 86);
        assert_eq!(session.origin, SessionOrigin::Streaming);
        assert_eq!(session.start_time, capture(74).timestamp_start);
        assert_eq!(session.end_time, capture(87).timestamp_start);
        assert_eq!(session.total_duration_sec, 13 * 60);

        let members = store.fetch_session_activities(session.id).await.unwrap();
        assert_eq!(members.len(), 13);
        assert!(online.open_since().is_none());
    }

    #[tokio::test]
    async fn test_scorer_failure_falls_back_to_zero() {
        let store = Arc::new(MemoryStore::new());
        let scorer = Arc::new(ScriptedScorer::new(vec![None]));
        let mut online = OnlineSessionizer::new(store.clone(), scorer, &EngineConfig::default());

        assert!(online.ingest(capture(0)).await.unwrap().is_none());
        assert_eq!(online.segmenter().state().signal.value(), Some(0.0));

        let stored = store.fetch_activities_by_id_range(1, 1).await.unwrap();
        assert_eq!(stored[0].productivity_score, None);
    }

    #[tokio::test]
    async fn test_flush_persists_open_session() {
        let store = Arc::new(MemoryStore::new());
        let mut script = workday_script();
        script.truncate(75);
        script.extend([Some(7), Some(7)]);
        let scorer = Arc::new(ScriptedScorer::new(script));
        let mut online = OnlineSessionizer::new(store.clone(), scorer, &EngineConfig::default());

        for minute in 0..77 {
            online.ingest(capture(minute)).await.unwrap();
        }
        let session = online.flush().await.unwrap().expect("open session flushed");
        assert_eq!(session.total_duration_sec, 3 * 60);
        assert!(online.flush().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_conflict_is_reported_and_state_cleared() {
        let store = Arc::new(MemoryStore::new());
        let scorer = Arc::new(ScriptedScorer::new(workday_script()));
        let mut online = OnlineSessionizer::new(store.clone(), scorer, &EngineConfig::default());

        for minute in 0..80 {
            online.ingest(capture(minute)).await.unwrap();
        }

        // The batch path claims part of the open session first.
        let open = online.segmenter().state().open_session.clone().unwrap();
        let stolen = SessionDraft::from_members(
            "Work Session".into(),
            SessionOrigin::Batch,
            &open[..1],
        )
        .unwrap();
        store.commit_sessions(&[stolen]).await.unwrap();

        let mut result = Ok(None);
        for minute in 80..87 {
            result = online.ingest(capture(minute)).await;
        }
        assert!(matches!(result, Err(ref err) if err.is_conflict()));
        assert!(!online.segmenter().is_accumulating());
    }
}
