//! Backoff strategies for retry policies

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Fixed delay between retries
    Fixed,

    /// Exponential increase: delay = initial_delay * 2^(attempt-1)
    #[default]
    Exponential,
}

impl BackoffKind {
    /// Calculate the delay before the retry that follows the given failed
    /// attempt (1-indexed).
    ///
    /// Pure: a function of the attempt count and the initial delay only.
    pub fn delay_for(&self, attempt: u32, initial_delay: Duration) -> Duration {
        match self {
            BackoffKind::Fixed => initial_delay,
            BackoffKind::Exponential => {
                if attempt == 0 {
                    return Duration::ZERO;
                }
                // Saturate instead of overflowing for absurd attempt counts
                let multiplier = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                initial_delay.saturating_mul(multiplier)
            }
        }
    }
}
