use std::time::Duration;

/// Delay policy between polls: fixed cadence while healthy, capped
/// exponential growth once failures reach the degraded threshold.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    threshold: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, threshold: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            threshold: threshold.max(1),
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn is_degraded(&self, consecutive_failures: u32) -> bool {
        consecutive_failures >= self.threshold
    }

    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        if !self.is_degraded(consecutive_failures) {
            return self.base;
        }
        let exponent = (consecutive_failures - self.threshold + 1).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }
}
