/// Exponential moving average of the per-minute score stream.
///
/// The first observation seeds the average exactly. There is no decay on
/// absence of input; callers feed one score per logical minute.
#[derive(Debug, Clone)]
pub struct SmoothedSignal {
    alpha: f64,
    ema: Option<f64>,
}

impl SmoothedSignal {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, ema: None }
    }

    pub fn update(&mut self, score: f64) -> f64 {
        let next = match self.ema {
            None => score,
            Some(prev) => self.alpha * score + (1.0 - self.alpha) * prev,
        };
        self.ema = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.ema
    }

    pub fn reset(&mut self) {
        self.ema = None;
    }
}
