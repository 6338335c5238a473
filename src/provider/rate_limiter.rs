//! Token-bucket rate limiter for outbound provider requests.
//!
//! `acquire` is an awaitable that suspends the caller until a token is
//! available; `drain` empties the bucket so every subsequent caller waits a
//! full refill interval. Uses the runtime clock so timing is deterministic
//! under test.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, waiting for a refill when the bucket is empty.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                // Time until one whole token has accumulated.
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Zero the bucket and restart the refill clock.
    pub fn drain(&self) {
        let mut state = self.state.lock();
        state.tokens = 0.0;
        state.last_refill = Instant::now();
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            state.last_refill = now;
        }
    }

    #[cfg(test)]
    fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn full_bucket_does_not_wait() {
        let bucket = TokenBucket::new(3, 1.0);
        let start = Instant::now();
        for _ in 0..3 {
            bucket.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_acquires_respect_refill_rate() {
        // capacity C, refill R: N acquires must take >= (N - C) / R seconds.
        let bucket = TokenBucket::new(2, 1.0);
        let start = Instant::now();
        for _ in 0..4 {
            bucket.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_forces_a_full_wait() {
        let bucket = TokenBucket::new(5, 2.0);
        bucket.drain();
        let start = Instant::now();
        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn refill_caps_at_capacity() {
        let bucket = TokenBucket::new(2, 10.0);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(bucket.available() <= 2.0);
    }
}
