use std::time::Duration;

use rand::Rng;

/// Exponential reconnect delay: `min(base * 2^attempt + jitter, cap)`.
///
/// With `jitter <= base` the delay never decreases from one attempt to
/// the next, since each doubling adds at least `base`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter: Duration) -> Self {
        Self { base, cap, jitter }
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Delay before reconnect attempt `attempt` (zero-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self.base.saturating_mul(2u32.saturating_pow(attempt));
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            self.jitter.mul_f64(rand::thread_rng().gen_range(0.0..1.0))
        };
        exponential.saturating_add(jitter).min(self.cap)
    }
}
