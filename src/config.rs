use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::EngineResult;
use crate::segmentation::{BatchConfig, OverlapPolicy, SegmenterConfig};

const APP_DIR: &str = "flowtrack";
const DEV_APP_DIR: &str = "flowtrack-dev";
const DATABASE_FILE: &str = "flowtrack.sqlite3";
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Seconds between catch-up passes while ingesting
    pub interval_secs: u64,

    /// Activity newer than this many seconds is left to the streaming path
    pub settle_secs: i64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1800,
            settle_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overrides the default `<data dir>/flowtrack.sqlite3`
    pub database_path: Option<PathBuf>,
    pub segmenter: SegmenterConfig,
    pub batch: BatchConfig,
    pub reconcile: ReconcileConfig,
    pub overlap_policy: OverlapPolicy,
}

impl EngineConfig {
    /// Missing file means defaults; an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config directory {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.segmenter.validate()?;
        self.batch.validate()?;
        Ok(())
    }

    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir.join(DATABASE_FILE))
    }
}

/// `~/.config/flowtrack`, or `flowtrack-dev` when `FLOWTRACK_ENV=dev`.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| anyhow!("could not resolve config directory"))?;
    let dev = std::env::var("FLOWTRACK_ENV")
        .map(|v| v.eq_ignore_ascii_case("dev"))
        .unwrap_or(false);
    Ok(base.join(if dev { DEV_APP_DIR } else { APP_DIR }))
}
