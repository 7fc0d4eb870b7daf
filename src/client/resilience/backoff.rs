//! Exponential backoff strategy for retry policies.

use std::time::Duration;

/// Upper bound of the additive jitter, as a fraction of the capped delay.
const DEFAULT_JITTER: f64 = 0.1;

#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    /// Factor is clamped to `>= 1` and `max` to `>= initial`.
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            initial,
            max: max.max(initial),
            factor: if factor.is_finite() { factor.max(1.0) } else { 1.0 },
            jitter: DEFAULT_JITTER,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial
    }

    pub fn max_delay(&self) -> Duration {
        self.max
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// `min(initial * factor^(attempt-1), max)` without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial.as_nanos() as f64 * self.factor.powi(exponent);
        let max = self.max.as_nanos() as f64;
        if base >= max {
            return self.max;
        }
        // Nanosecond precision for ordinary delays; seconds beyond u64 nanos.
        let nanos = base.round();
        if nanos < u64::MAX as f64 {
            return Duration::from_nanos(nanos as u64);
        }
        Duration::try_from_secs_f64(base / 1e9).map_or(self.max, |d| d.min(self.max))
    }

    /// Base delay plus a uniformly drawn jitter in `[0, jitter * delay]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let offset = rand::random::<f64>() * self.jitter * base.as_secs_f64();
        base.saturating_add(Duration::try_from_secs_f64(offset).unwrap_or(Duration::ZERO))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(10), 2.0)
    }
}
