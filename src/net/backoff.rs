//! Bounded exponential backoff for channel reconnects.
//!
//! Attempt `n` (1-based) waits `min(base * 2^(n-1), max_delay)`. Once
//! `max_attempts` retries have been scheduled the policy yields nothing and
//! the caller must surface a terminal error.

use std::time::Duration;

pub const BASE_DELAY: Duration = Duration::from_millis(1_000);
pub const MAX_DELAY: Duration = Duration::from_millis(16_000);
pub const MAX_ATTEMPTS: u32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base: BASE_DELAY, max_delay: MAX_DELAY, max_attempts: MAX_ATTEMPTS }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt`, or `None` when the attempt is out of budget.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 1_u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        Some(self.base.saturating_mul(factor).min(self.max_delay))
    }
}

#[cfg(test)]
#[path = "backoff_test.rs"]
mod tests;
