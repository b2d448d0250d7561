use chrono::{DateTime, Utc};

use crate::db::models::Activity;
use crate::segmentation::{
    config::SegmenterConfig,
    ema::SmoothedSignal,
    rolling::{RollingStats, Thresholds},
    summary::ScoredActivity,
};

/// Live decision context of one streaming segmenter.
#[derive(Debug, Clone)]
pub struct SegmenterState {
    /// Members of the open session, in arrival order. `None` while idle.
    pub open_session: Option<Vec<ScoredActivity>>,
    pub signal: SmoothedSignal,
    pub stats: RollingStats,
    pub work_counter: u32,
    pub break_counter: u32,
}

impl SegmenterState {
    pub fn empty(config: &SegmenterConfig) -> Self {
        Self {
            open_session: None,
            signal: SmoothedSignal::new(config.ema_alpha),
            stats: RollingStats::new(
                config.buffer_capacity,
                config.min_samples,
                Thresholds {
                    work: config.default_work_threshold,
                    brk: config.default_break_threshold,
                },
            ),
            work_counter: 0,
            break_counter: 0,
        }
    }

    pub fn is_accumulating(&self) -> bool {
        self.open_session.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SegmenterEvent {
    SessionOpened {
        activity_id: i64,
        start_time: DateTime<Utc>,
    },
    SessionClosed { members: Vec<ScoredActivity> },
}

/// Hysteresis state machine over the smoothed score stream.
///
/// Idle until the EMA stays above the work threshold for `hard_work_min`
/// consecutive minutes, then accumulating until it stays below the break
/// threshold for `hard_break_min` minutes. Callers serialize calls; the
/// `&mut self` receiver makes one instance single-writer.
#[derive(Debug, Clone)]
pub struct Segmenter {
    config: SegmenterConfig,
    state: SegmenterState,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        let state = SegmenterState::empty(&config);
        Self { config, state }
    }

    pub fn state(&self) -> &SegmenterState {
        &self.state
    }

    pub fn is_accumulating(&self) -> bool {
        self.state.is_accumulating()
    }

    /// Feed one activity and its score (absent scores count as 0).
    pub fn process_minute(
        &mut self,
        activity: Activity,
        score: Option<f64>,
    ) -> Option<SegmenterEvent> {
        let scored = ScoredActivity::new(activity, score);
        let score = scored.score;
        let activity_id = scored.activity.id;
        let start_time = scored.activity.timestamp_start;

        // Accumulation happens on arrival, so the closing activity is a member.
        let mut pending = Some(scored);
        if let Some(members) = self.state.open_session.as_mut() {
            members.extend(pending.take());
        }

        let ema = self.state.signal.update(score);
        self.state.stats.push(score);
        let thresholds = self.state.stats.thresholds();

        if ema > thresholds.work {
            self.state.work_counter += 1;
            self.state.break_counter = 0;
        } else if ema < thresholds.brk {
            self.state.break_counter += 1;
            self.state.work_counter = 0;
        } else {
            self.state.work_counter = self.state.work_counter.saturating_sub(1);
            self.state.break_counter = self.state.break_counter.saturating_sub(1);
        }

        if self.state.is_accumulating() && self.state.break_counter >= self.config.hard_break_min {
            let members = self.take_open_session().unwrap_or_default();
            return Some(SegmenterEvent::SessionClosed { members });
        }

        if !self.state.is_accumulating() && self.state.work_counter >= self.config.hard_work_min {
            self.state.open_session = Some(pending.into_iter().collect());
            return Some(SegmenterEvent::SessionOpened {
                activity_id,
                start_time,
            });
        }

        None
    }

    /// Close whatever is open without a break run (shutdown, end of input).
    /// Transient state is reset either way.
    pub fn take_open_session(&mut self) -> Option<Vec<ScoredActivity>> {
        let members = self.state.open_session.take();
        self.reset();
        members
    }

    fn reset(&mut self) {
        self.state = SegmenterState::empty(&self.config);
    }
}
