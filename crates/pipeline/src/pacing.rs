//! Exponential pacing between generation calls.
//!
//! Providers rate-limit aggressively, so every call waits a short base
//! delay and retries of the same segment back off exponentially.

use std::time::Duration;

/// Tunable parameters for call pacing.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingConfig {
    /// Delay before every call, and the first retry delay.
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl PacingConfig {
    /// No waiting at all; used by dry runs and tests.
    pub fn none() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before the attempt with the given 1-based number.
    ///
    /// Attempt 1 waits `base_delay`; each later attempt grows by
    /// `multiplier`, clamped to `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let mut delay = self.base_delay.min(self.max_delay);
        for _ in 1..attempt {
            delay = next_delay(delay, self);
            if delay >= self.max_delay {
                break;
            }
        }
        delay
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`PacingConfig::max_delay`].
pub fn next_delay(current: Duration, config: &PacingConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_delay_doubles() {
        let config = PacingConfig::default();
        let d = next_delay(Duration::from_secs(1), &config);
        assert_eq!(d, Duration::from_secs(2));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = PacingConfig {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        let d = next_delay(Duration::from_secs(8), &config);
        assert_eq!(d, Duration::from_secs(10));
    }

    #[test]
    fn attempt_delays_follow_backoff() {
        let config = PacingConfig {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        };
        let delays: Vec<u64> = (1..=5)
            .map(|attempt| config.delay_for_attempt(attempt).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn none_never_waits() {
        let config = PacingConfig::none();
        assert_eq!(config.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(7), Duration::ZERO);
    }
}
