//! Retry policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backoff::BackoffKind;

/// Retry policy configuration
///
/// `max_attempts` is the total attempt budget, including the first
/// attempt. A policy with `max_attempts = 1` never retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub max_attempts: u32,

    /// Backoff strategy between attempts
    pub backoff: BackoffKind,

    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffKind::Exponential,
            initial_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Create a policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffKind::Fixed,
            initial_delay: Duration::ZERO,
        }
    }

    /// Decide whether the given failed attempt (1-indexed) gets a retry,
    /// and if so, after what delay.
    ///
    /// Returns `None` once the attempt budget is exhausted. Pure: no
    /// clock, no external state.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        Some(self.backoff.delay_for(attempt, self.initial_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_retry_schedule() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff: BackoffKind::Exponential,
            initial_delay: Duration::from_millis(100),
        };

        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for_attempt(4), None);
    }

    #[test]
    fn test_exponential_lower_bound_holds_for_every_retry() {
        let d = Duration::from_millis(250);
        let policy = RetryPolicy {
            max_attempts: 8,
            backoff: BackoffKind::Exponential,
            initial_delay: d,
        };

        for n in 1..policy.max_attempts {
            let delay = policy.delay_for_attempt(n).unwrap();
            assert!(delay >= d * 2u32.pow(n - 1), "retry {} scheduled too early", n);
        }
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.delay_for_attempt(1), None);
    }

    #[test]
    fn test_fixed_backoff_delay() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: BackoffKind::Fixed,
            initial_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(3), None);
    }
}
