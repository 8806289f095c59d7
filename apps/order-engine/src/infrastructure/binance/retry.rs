//! Retry policy with exponential backoff for exchange API calls.
//!
//! | Retried | Surfaced immediately |
//! |---------|----------------------|
//! | HTTP 429 / 418 (rate limited, `Retry-After` honored) | HTTP 400 with an exchange error code |
//! | HTTP 408, 5xx | HTTP 401 / 403 |
//! | Connection failures, timeouts | Insufficient margin, invalid symbol |
//! | Codes -1001, -1003, -1021 | Any other exchange rejection |

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy for gateway calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first (default: 3).
    pub max_attempts: u32,
    /// Delay before the first retry (default: 1s).
    pub initial_backoff: Duration,
    /// Upper bound on any single delay (default: 30s).
    pub max_backoff: Duration,
    /// Growth factor between retries (default: 2.0).
    pub multiplier: f64,
    /// Random spread around each delay, 0.2 = ±20% (default: 0.0).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

/// Backoff calculator for one request.
#[derive(Debug)]
pub struct ExponentialBackoff {
    attempt: u32,
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoff {
    /// Start counting attempts for a new request.
    #[must_use]
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 1,
            max_attempts: policy.max_attempts.max(1),
            initial_backoff_ms: u64::try_from(policy.initial_backoff.as_millis()).unwrap_or(u64::MAX),
            max_backoff_ms: u64::try_from(policy.max_backoff.as_millis()).unwrap_or(u64::MAX),
            multiplier: policy.multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    ///
    /// The delay after attempt `n` is `initial * multiplier^(n-1)`, capped.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let base = self.base_backoff_ms();
        let delay = self.apply_jitter(base).min(self.max_backoff_ms);
        self.attempt += 1;
        Some(Duration::from_millis(delay))
    }

    /// Attempt currently in flight (1-based).
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    fn base_backoff_ms(&self) -> u64 {
        let exponent = i32::try_from(self.attempt - 1).unwrap_or(i32::MAX);
        let backoff = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let backoff = backoff as u64;
        backoff.min(self.max_backoff_ms)
    }

    fn apply_jitter(&self, backoff_ms: u64) -> u64 {
        if self.jitter_factor <= 0.0 {
            return backoff_ms;
        }
        let spread = backoff_ms as f64 * self.jitter_factor;
        let min = (backoff_ms as f64 - spread).max(0.0);
        let max = backoff_ms as f64 + spread;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jittered = rand::rng().random_range(min..=max) as u64;
        jittered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_one_second() {
        let mut backoff = ExponentialBackoff::new(&RetryPolicy::default());
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(2)));
        // Third attempt was the last one.
        assert_eq!(backoff.next_backoff(), None);
        assert_eq!(backoff.attempt(), 3);
    }

    #[test]
    fn respects_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            multiplier: 10.0,
            jitter_factor: 0.0,
        };
        let mut backoff = ExponentialBackoff::new(&policy);
        backoff.next_backoff();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn single_attempt_never_retries() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        assert_eq!(ExponentialBackoff::new(&policy).next_backoff(), None);
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1000),
            jitter_factor: 0.2,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let delay = ExponentialBackoff::new(&policy).next_backoff().unwrap();
            assert!(delay >= Duration::from_millis(800) && delay <= Duration::from_millis(1200));
        }
    }
}
