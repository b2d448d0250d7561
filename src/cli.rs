use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use crate::config::{default_data_dir, EngineConfig, CONFIG_FILE};
use crate::db::Database;
use crate::scoring::KeywordScorer;
use crate::segmentation::{find_overlaps, verify_sessions, OverlapPolicy};
use crate::sessionizer::{
    ingest_loop, reconcile_gaps, reconcile_horizon, reconcile_loop, run_batch, OnlineSessionizer,
};
use crate::store::ActivityStore;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Parser)]
#[command(name = "flowtrack", version, about = "Work-session detection over activity streams")]
pub struct Cli {
    /// Config file (default: <data dir>/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path, overriding the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream JSON-lines captures through the online sessionizer
    Ingest {
        /// Read captures from a file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Sessionize every unsessionized gap once
    Reconcile {
        /// Leave activity newer than this many seconds alone
        #[arg(long)]
        settle_secs: Option<i64>,
    },
    /// Run periodic reconciliation until interrupted
    ///
    /// Runs without a streaming segmenter, so it cannot see a session held
    /// open by a separate `ingest` process. Activity inside such a session
    /// may be claimed here first and end up in batch sessions, and the
    /// streaming close then reports a conflict. Prefer `ingest`, which
    /// reconciles on the same schedule around its own open session.
    Watch,
    /// Partition one explicit time range
    Batch {
        /// RFC 3339 start (inclusive)
        #[arg(long)]
        from: DateTime<Utc>,
        /// RFC 3339 end (exclusive)
        #[arg(long)]
        to: DateTime<Utc>,
    },
    /// Check persisted sessions for overlaps
    Verify {
        /// Exit non-zero when an overlap is found
        #[arg(long)]
        strict: bool,
    },
    /// List sessions, newest first
    Sessions {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// List activities of a session or a time range
    Activities {
        #[arg(long, conflicts_with_all = ["from", "to"])]
        session: Option<i64>,
        #[arg(long, requires = "to")]
        from: Option<DateTime<Utc>>,
        #[arg(long, requires = "from")]
        to: Option<DateTime<Utc>>,
    },
    /// Override an activity's score
    Correct {
        activity_id: i64,
        #[arg(allow_hyphen_values = true, value_parser = clap::value_parser!(i32).range(-10..=10))]
        score: i32,
    },
    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },
}

struct Resolved {
    config: EngineConfig,
    config_path: PathBuf,
    db_path: PathBuf,
}

fn resolve(cli: &Cli) -> Result<Resolved> {
    let data_dir = default_data_dir()?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join(CONFIG_FILE));
    let config = EngineConfig::load(&config_path)?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| config.database_path(&data_dir));

    Ok(Resolved {
        config,
        config_path,
        db_path,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Logs overlaps among persisted sessions; startup continues regardless.
async fn startup_verify(db: &Database) -> Result<()> {
    let sessions = db.fetch_sessions_ordered_by_start().await?;
    verify_sessions(&sessions, OverlapPolicy::Log)?;
    log_info!("startup check: {} persisted session(s) verified", sessions.len());
    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

pub async fn execute(cli: Cli) -> Result<()> {
    let ctx = resolve(&cli)?;

    if let Commands::Config { write } = cli.command {
        if write {
            ctx.config.save(&ctx.config_path)?;
            log_info!("configuration written to {}", ctx.config_path.display());
        }
        return print_json(&ctx.config);
    }

    let db = Database::new(ctx.db_path.clone())?;
    startup_verify(&db).await?;

    let store: Arc<dyn ActivityStore> = Arc::new(db.clone());
    let config = ctx.config;

    match cli.command {
        Commands::Ingest { input } => {
            let mut online =
                OnlineSessionizer::new(store.clone(), Arc::new(KeywordScorer::new()), &config);
            let until = reconcile_horizon(Utc::now(), config.reconcile.settle_secs, None);
            reconcile_gaps(store.as_ref(), until, &config.batch, config.overlap_policy).await?;

            let token = cancel_on_ctrl_c();
            let summary = match input {
                Some(path) => {
                    let file = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("failed to open {}", path.display()))?;
                    ingest_loop(BufReader::new(file), &mut online, store.clone(), &config, token)
                        .await?
                }
                None => {
                    let stdin = BufReader::new(tokio::io::stdin());
                    ingest_loop(stdin, &mut online, store.clone(), &config, token).await?
                }
            };
            print_json(&summary)
        }
        Commands::Reconcile { settle_secs } => {
            let settle = settle_secs.unwrap_or(config.reconcile.settle_secs);
            let until = reconcile_horizon(Utc::now(), settle, None);
            let report =
                reconcile_gaps(store.as_ref(), until, &config.batch, config.overlap_policy)
                    .await?;
            print_json(&report)
        }
        Commands::Watch => {
            log_info!(
                "reconciling every {}s, Ctrl-C to stop",
                config.reconcile.interval_secs
            );
            reconcile_loop(store, config, cancel_on_ctrl_c()).await;
            Ok(())
        }
        Commands::Batch { from, to } => {
            if to <= from {
                bail!("--to must be after --from");
            }
            let report =
                run_batch(store.as_ref(), from, to, &config.batch, config.overlap_policy).await?;
            print_json(&report)
        }
        Commands::Verify { strict } => {
            let sessions = db.fetch_sessions_ordered_by_start().await?;
            let overlaps = find_overlaps(&sessions);
            print_json(&overlaps)?;
            if strict && !overlaps.is_empty() {
                bail!("{} overlapping session pair(s)", overlaps.len());
            }
            Ok(())
        }
        Commands::Sessions { limit, offset } => {
            print_json(&db.list_sessions_paginated(limit, offset).await?)
        }
        Commands::Activities { session, from, to } => {
            let activities = match (session, from, to) {
                (Some(session_id), _, _) => db.fetch_session_activities(session_id).await?,
                (None, Some(from), Some(to)) => db.fetch_activities_by_time_range(from, to).await?,
                _ => bail!("pass --session <id> or --from/--to"),
            };
            print_json(&activities)
        }
        Commands::Correct { activity_id, score } => {
            let correction = db.correct_activity_score(activity_id, score).await?;
            if let Some(activity) = db.get_activity(activity_id).await? {
                if activity.session_id.is_some() {
                    log_warn!(
                        "activity {} is already sessionized; the session score is not recomputed",
                        activity_id
                    );
                }
            }
            print_json(&correction)
        }
        Commands::Config { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_watch_help_warns_about_open_sessions() {
        let command = Cli::command();
        let watch = command
            .get_subcommands()
            .find(|sub| sub.get_name() == "watch")
            .unwrap();
        let long_about = watch.get_long_about().unwrap().to_string();
        assert!(long_about.contains("separate"));
        assert!(long_about.contains("batch sessions"));
    }

    #[test]
    fn test_negative_correction_score_parses() {
        let cli = Cli::try_parse_from(["flowtrack", "correct", "12", "-4"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Correct {
                activity_id: 12,
                score: -4
            }
        ));
    }
}
