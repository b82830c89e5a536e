//! BackoffPolicy - exponential backoff with jitter for the forwarder.
//!
//! ```text
//! Attempt    Delay (base=100ms, max=30s)   With jitter (±10%)
//! ─────────────────────────────────────────────────────────────
//!    0          100ms                         90ms - 110ms
//!    1          200ms                        180ms - 220ms
//!    2          400ms                        360ms - 440ms
//!   ...
//!   ≥9           30s                          27s - 33s
//! ```
//!
//! There is no retry limit. The forwarder keeps retrying a transient failure
//! until it succeeds or shutdown is requested.

use std::time::Duration;

use rand::Rng;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Delay schedule for consecutive failed attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Upper bound before jitter.
    pub max_delay: Duration,

    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, jitter_factor: f64) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Policy without jitter, for deterministic tests.
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, 0.0)
    }

    /// Delay before retry number `attempt` (0-indexed).
    ///
    /// `min(base * 2^attempt, max)`, then ± `jitter_factor`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        let jitter_range = delay.as_secs_f64() * self.jitter_factor;
        if jitter_range <= 0.0 {
            return delay;
        }

        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        Duration::from_secs_f64((delay.as_secs_f64() + jitter).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(60), 0.0);

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn delay_is_capped_at_max() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 0.0);

        assert_eq!(policy.delay_for(10), Duration::from_secs(1));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(10), 0.2);

        for _ in 0..100 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_millis(800), "{:?}", delay);
            assert!(delay <= Duration::from_millis(1200), "{:?}", delay);
        }
    }

    #[test]
    fn jitter_factor_is_clamped() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(1), 5.0);
        assert_eq!(policy.jitter_factor, 1.0);
    }
}
