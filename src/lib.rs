//! Sessionization engine: turns a stream of scored activities into
//! non-overlapping work sessions, online through a hysteresis segmenter and
//! offline through gap reconciliation.

pub mod capture;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod scoring;
pub mod segmentation;
pub mod sessionizer;
pub mod store;
pub mod utils;

use clap::Parser;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};

pub async fn run() -> anyhow::Result<()> {
    utils::logging::init_logging();

    log::info!("flowtrack starting up...");

    let cli = cli::Cli::parse();
    cli::execute(cli).await
}
