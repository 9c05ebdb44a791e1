//! Token-bucket rate limiting

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// A windowed token bucket enforcing "at most `max` operations per window".
///
/// `acquire` suspends the caller until a token is available; tokens refill
/// in whole-window steps, so a drained bucket admits its next caller at the
/// start of the following window rather than trickling permits in.
#[derive(Debug)]
pub struct TokenBucket {
    max: u32,
    window: Duration,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    window_start: Instant,
}

impl TokenBucket {
    /// Create a bucket holding `max` tokens per `window`
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            state: Mutex::new(BucketState {
                tokens: max,
                window_start: Instant::now(),
            }),
        }
    }

    /// Take a token, suspending until one is available
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();

                if now.duration_since(state.window_start) >= self.window {
                    state.tokens = self.max;
                    state.window_start = now;
                }

                if state.tokens > 0 {
                    state.tokens -= 1;
                    return;
                }

                // Lock is released before sleeping
                (state.window_start + self.window).saturating_duration_since(now)
            };

            tokio::time::sleep(wait).await;
        }
    }

    /// Take a token without waiting; returns false when the window is spent
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if now.duration_since(state.window_start) >= self.window {
            state.tokens = self.max;
            state.window_start = now;
        }

        if state.tokens > 0 {
            state.tokens -= 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_acquire_exhausts_window() {
        let bucket = TokenBucket::new(3, Duration::from_secs(1));
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_next_window() {
        let bucket = TokenBucket::new(2, Duration::from_millis(500));
        bucket.acquire().await;
        bucket.acquire().await;

        let start = Instant::now();
        bucket.acquire().await;
        let waited = start.elapsed();

        assert!(waited >= Duration::from_millis(499), "waited only {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_refills_all_tokens() {
        let bucket = TokenBucket::new(2, Duration::from_millis(100));
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        tokio::time::advance(Duration::from_millis(101)).await;

        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }
}
