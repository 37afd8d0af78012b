//! Retry policy for failed connection attempts

use std::time::Duration;

/// Bounded exponential backoff.
///
/// `delay(n) = min(initial_delay * 2^(n-1), max_delay)` for attempt `n >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Whether another automatic retry is allowed after `retry_count` retries
    pub fn allows_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_attempts
    }
}
