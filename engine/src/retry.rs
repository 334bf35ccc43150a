//! Retry policy for the purchase commit loop.
//!
//! Transient infrastructure failures (including serialization conflicts from
//! the durable store) are retried with linear backoff; business outcomes are
//! final and never retried.

use std::time::Duration;

/// Linear-backoff retry policy: `backoff_step * (attempt + 1)` between
/// attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total number of attempts (not retries).
    pub attempts: u32,
    /// Backoff unit between attempts.
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            backoff_step: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after the given zero-based attempt fails.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_step * (attempt + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(0), Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(300));
    }
}
