use std::time::Duration;

use rand::Rng;

/// Exponential reconnect backoff with jitter and a consecutive-failure cap.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_consecutive_failures: u32,
    jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 10)
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_consecutive_failures: u32) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            max_consecutive_failures: max_consecutive_failures.max(1),
            jitter: 0.25,
        }
    }

    /// Extra random delay as a fraction of the nominal one, clamped to `0..=1`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn max_consecutive_failures(&self) -> u32 {
        self.max_consecutive_failures
    }

    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures >= self.max_consecutive_failures
    }

    /// Delay before retry number `attempt` (1-based), before jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if self.jitter == 0.0 {
            return nominal;
        }
        let extra = rand::rng().random_range(0.0..=self.jitter);
        nominal.mul_f64(1.0 + extra)
    }
}
