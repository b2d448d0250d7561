use std::collections::VecDeque;

/// Work/break decision thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub work: f64,
    pub brk: f64,
}

/// Fixed-capacity FIFO of recent per-minute scores that supplies
/// percentile-based thresholds.
#[derive(Debug, Clone)]
pub struct RollingStats {
    scores: VecDeque<f64>,
    capacity: usize,
    min_samples: usize,
    defaults: Thresholds,
}

impl RollingStats {
    pub fn new(capacity: usize, min_samples: usize, defaults: Thresholds) -> Self {
        Self {
            scores: VecDeque::with_capacity(capacity),
            capacity,
            min_samples,
            defaults,
        }
    }

    /// Append a score, evicting the oldest once capacity is exceeded.
    pub fn push(&mut self, score: f64) {
        self.scores.push_back(score);
        while self.scores.len() > self.capacity {
            self.scores.pop_front();
        }
    }

    /// 75th percentile as the work threshold, 25th as the break threshold.
    ///
    /// Ranks are `floor(p * (n - 1))` into the sorted buffer with no
    /// interpolation. Cold start (fewer than `min_samples`) returns the
    /// configured defaults.
    pub fn thresholds(&self) -> Thresholds {
        let n = self.scores.len();
        if n < self.min_samples || n == 0 {
            return self.defaults;
        }

        let mut sorted: Vec<f64> = self.scores.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let i75 = (0.75 * (n - 1) as f64).floor() as usize;
        let i25 = (0.25 * (n - 1) as f64).floor() as usize;
        Thresholds {
            work: sorted[i75],
            brk: sorted[i25],
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn clear(&mut self) {
        self.scores.clear();
    }
}
