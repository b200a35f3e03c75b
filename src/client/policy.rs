use std::time::Duration;

use rand::Rng;

/// Delay before the next reconnect attempt.
///
/// Attempt `n` (0-based) waits `min(base * factor^n, max)`, scaled by a
/// random factor in `[1 - jitter, 1 + jitter]` so that clients dropped at the
/// same moment do not all come back at the same moment. `factor = 1.0` with
/// `jitter = 0.0` gives a fixed delay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    base: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max: Duration, factor: f64, jitter: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            factor: if factor.is_finite() { factor.max(1.0) } else { 1.0 },
            jitter: if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 },
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, 1.0, 0.0)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay before retry number `attempt`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base.as_secs_f64() * self.factor.powi(exp);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        if self.jitter == 0.0 {
            return backoff;
        }
        let scale = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        Duration::try_from_secs_f64(backoff.as_secs_f64() * scale).unwrap_or(self.max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(60), 2.0, 0.2)
    }
}
