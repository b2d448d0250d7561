use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Tunables for the streaming segmenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// EMA smoothing factor applied to each new score
    pub ema_alpha: f64,

    /// Rolling score buffer capacity (240 = 4h at one sample per minute)
    pub buffer_capacity: usize,

    /// Below this many buffered samples the default thresholds apply
    pub min_samples: usize,

    /// Cold-start thresholds
    pub default_work_threshold: f64,
    pub default_break_threshold: f64,

    /// Consecutive above-band minutes needed to open a session
    pub hard_work_min: u32,

    /// Consecutive below-band minutes needed to close a session
    pub hard_break_min: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.3,
            buffer_capacity: 240,
            min_samples: 10,
            default_work_threshold: 20.0,
            default_break_threshold: 0.0,
            hard_work_min: 15,
            hard_break_min: 10,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(invalid("segmenter.ema_alpha", "must be in (0, 1]"));
        }
        if self.buffer_capacity == 0 {
            return Err(invalid("segmenter.buffer_capacity", "must be positive"));
        }
        if self.default_work_threshold < self.default_break_threshold {
            return Err(invalid(
                "segmenter.default_work_threshold",
                "must not be below default_break_threshold",
            ));
        }
        if self.hard_work_min == 0 || self.hard_break_min == 0 {
            return Err(invalid("segmenter.hard_work_min", "hysteresis minimums must be positive"));
        }
        Ok(())
    }
}

/// Tunables for the batch partitioner's flow grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Idle gap that always splits two activities into separate sessions
    pub gap_threshold_secs: i64,

    /// Activities this short never force a class change on their own
    pub micro_break_threshold_secs: i64,

    /// Scores at or above this count as productive
    pub productive_min_score: i32,

    /// Scores at or below this count as unproductive
    pub unproductive_max_score: i32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            gap_threshold_secs: 1800,
            micro_break_threshold_secs: 300,
            productive_min_score: 4,
            unproductive_max_score: -4,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.gap_threshold_secs < 0 {
            return Err(invalid("batch.gap_threshold_secs", "must not be negative"));
        }
        if self.micro_break_threshold_secs < 0 {
            return Err(invalid("batch.micro_break_threshold_secs", "must not be negative"));
        }
        if self.productive_min_score <= self.unproductive_max_score {
            return Err(invalid(
                "batch.productive_min_score",
                "must be greater than unproductive_max_score",
            ));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> EngineError {
    EngineError::Config {
        key: key.to_string(),
        message: message.to_string(),
    }
}
