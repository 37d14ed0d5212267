//! Token bucket sized to the platform's hourly quota. Depletion blocks
//! callers instead of failing them, up to a configurable ceiling.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::client::GithubError;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    max_wait: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(requests_per_hour: u32, max_wait: Duration) -> Self {
        let capacity = f64::from(requests_per_hour.max(1));
        Self {
            capacity,
            refill_per_sec: capacity / 3600.0,
            max_wait,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, sleeping while the bucket is dry. Fails with
    /// `RateLimitExhausted` once the accumulated wait would exceed the
    /// configured ceiling.
    pub async fn acquire(&self) -> Result<(), GithubError> {
        let deadline = Instant::now() + self.max_wait;
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };

            if Instant::now() + wait > deadline {
                return Err(GithubError::RateLimitExhausted);
            }
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limit depleted, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokens_are_consumed_without_waiting_while_full() {
        let bucket = TokenBucket::new(3600, Duration::from_secs(1));
        for _ in 0..10 {
            bucket.acquire().await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn depleted_bucket_blocks_then_recovers() {
        // 3600/h refills one token per second.
        let bucket = TokenBucket::new(3600, Duration::from_secs(10));
        let mut state = bucket.state.lock().await;
        state.tokens = 0.0;
        state.last_refill = Instant::now();
        drop(state);

        let start = Instant::now();
        bucket.acquire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_past_ceiling_fails() {
        let bucket = TokenBucket::new(3600, Duration::from_millis(100));
        let mut state = bucket.state.lock().await;
        state.tokens = 0.0;
        state.last_refill = Instant::now();
        drop(state);

        let err = bucket.acquire().await.unwrap_err();
        assert!(matches!(err, GithubError::RateLimitExhausted));
    }
}
