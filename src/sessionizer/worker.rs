use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::capture::parse_capture_line;
use crate::config::EngineConfig;
use crate::sessionizer::gaps::{reconcile_gaps, reconcile_horizon};
use crate::sessionizer::online::OnlineSessionizer;
use crate::store::ActivityStore;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub activities_ingested: usize,
    pub lines_rejected: usize,
    pub streaming_sessions: usize,
    pub reconciled_sessions: usize,
    pub streaming_failures: usize,
}

/// Drive the online sessionizer from a JSON-lines reader while running the
/// gap reconciler every `reconcile.interval_secs`.
///
/// Ends at EOF or on cancellation; either way the open session is flushed
/// and one final reconcile pass runs.
pub async fn ingest_loop<R>(
    reader: R,
    sessionizer: &mut OnlineSessionizer,
    store: Arc<dyn ActivityStore>,
    config: &EngineConfig,
    cancel_token: CancellationToken,
) -> Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut ticker =
        tokio::time::interval(Duration::from_secs(config.reconcile.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; startup already reconciled.
    ticker.tick().await;

    let mut summary = IngestSummary::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read capture input")? else {
                    log_info!("capture input closed");
                    break;
                };

                let capture = match parse_capture_line(&line) {
                    Ok(Some(capture)) => capture,
                    Ok(None) => continue,
                    Err(err) => {
                        log_warn!("skipping capture line: {}", err);
                        summary.lines_rejected += 1;
                        continue;
                    }
                };

                summary.activities_ingested += 1;
                match sessionizer.ingest(capture).await {
                    Ok(Some(_)) => summary.streaming_sessions += 1,
                    Ok(None) => {}
                    Err(err) if err.is_conflict() => summary.streaming_failures += 1,
                    Err(err) => {
                        log_error!("streaming sessionizer error: {}", err);
                        summary.streaming_failures += 1;
                    }
                }
            }
            _ = ticker.tick() => {
                summary.reconciled_sessions +=
                    reconcile_once(store.as_ref(), config, sessionizer).await;
            }
            _ = cancel_token.cancelled() => {
                log_info!("ingest loop cancelled");
                break;
            }
        }
    }

    match sessionizer.flush().await {
        Ok(Some(_)) => summary.streaming_sessions += 1,
        Ok(None) => {}
        Err(err) => {
            log_warn!("final flush did not persist: {}", err);
            summary.streaming_failures += 1;
        }
    }
    summary.reconciled_sessions += reconcile_once(store.as_ref(), config, sessionizer).await;

    log_info!(
        "ingest finished: {} activities, {} rejected line(s), {} streaming session(s), {} reconciled session(s)",
        summary.activities_ingested,
        summary.lines_rejected,
        summary.streaming_sessions,
        summary.reconciled_sessions
    );

    Ok(summary)
}

async fn reconcile_once(
    store: &dyn ActivityStore,
    config: &EngineConfig,
    sessionizer: &OnlineSessionizer,
) -> usize {
    let until = reconcile_horizon(
        Utc::now(),
        config.reconcile.settle_secs,
        sessionizer.open_since(),
    );
    match reconcile_gaps(store, until, &config.batch, config.overlap_policy).await {
        Ok(report) => report.sessions_created.len(),
        Err(err) => {
            log_error!("reconcile pass failed, will retry next interval: {}", err);
            0
        }
    }
}

/// Periodic catch-up without a streaming source, until cancelled.
pub async fn reconcile_loop(
    store: Arc<dyn ActivityStore>,
    config: EngineConfig,
    cancel_token: CancellationToken,
) {
    let mut ticker =
        tokio::time::interval(Duration::from_secs(config.reconcile.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let until = reconcile_horizon(Utc::now(), config.reconcile.settle_secs, None);
                if let Err(err) =
                    reconcile_gaps(store.as_ref(), until, &config.batch, config.overlap_policy).await
                {
                    log_error!("reconcile pass failed, will retry next interval: {}", err);
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("reconcile loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::KeywordScorer;
    use crate::store::MemoryStore;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone};

    fn line(start: DateTime<Utc>, details: &str) -> String {
        format!(
            r#"{{"timestamp_start":"{}","duration_sec":60,"details":"{}"}}"#,
            start.to_rfc3339(),
            details
        )
    }

    #[tokio::test]
    async fn test_ingest_sessionizes_everything_by_eof() {
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap();
        let mut input = String::new();
        for minute in 0..30 {
            let details = if minute < 20 { "Terminal | cargo build" } else { "YouTube | music" };
            input.push_str(&line(base + ChronoDuration::minutes(minute), details));
            input.push('\n');
        }
        input.push_str("not json\n");

        let store: Arc<dyn ActivityStore> = Arc::new(MemoryStore::new());
        let config = EngineConfig::default();
        let mut online =
            OnlineSessionizer::new(store.clone(), Arc::new(KeywordScorer::new()), &config);

        let summary = ingest_loop(
            input.as_bytes(),
            &mut online,
            store.clone(),
            &config,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.activities_ingested, 30);
        assert_eq!(summary.lines_rejected, 1);

        let pending = store
            .fetch_unsessionized_in_range(base, base + ChronoDuration::hours(1))
            .await
            .unwrap();
        assert!(pending.is_empty());
        let sessions = store.fetch_sessions_ordered_by_start().await.unwrap();
        assert!(!sessions.is_empty());
        assert_eq!(
            summary.streaming_sessions + summary.reconciled_sessions,
            sessions.len()
        );
    }

    #[tokio::test]
    async fn test_reconcile_loop_stops_on_cancel() {
        let store: Arc<dyn ActivityStore> = Arc::new(MemoryStore::new());
        let token = CancellationToken::new();
        token.cancel();
        reconcile_loop(store, EngineConfig::default(), token).await;
    }
}
