//! Retry policy shared by every retrying network call
//!
//! Exponential backoff with jitter and a hard cap on attempts.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Fraction (0.0-1.0) of the delay randomised around its nominal value
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately, used by tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    /// Nominal delay before retry number `retry` (1-based), without jitter
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (retry - 1).min(16);
        let base_ms = self.base_delay.as_millis() as u64;
        let capped = base_ms
            .saturating_mul(factor)
            .min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }

    /// Delay before retry number `retry` with jitter applied
    pub fn delay_for(&self, retry: u32) -> Duration {
        let nominal = self.nominal_delay(retry).as_millis() as u64;
        let jitter = self.jitter_factor.clamp(0.0, 1.0);
        let jitter_range = (nominal as f64 * jitter) as u64;

        if jitter_range == 0 {
            return Duration::from_millis(nominal);
        }

        let offset = rand::rng().random_range(0..jitter_range);
        Duration::from_millis(nominal.saturating_sub(jitter_range / 2) + offset)
    }
}
