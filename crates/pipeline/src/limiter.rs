//! RateLimiter - global admission limit in bytes/sec
//!
//! A token bucket refilled continuously, with one second of burst.
//! `admit` suspends the caller until enough tokens accumulate, which
//! pushes the wait back into the input the same way pool exhaustion
//! does.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[cfg(test)]
#[path = "limiter_test.rs"]
mod tests;

/// Byte-rate admission limiter. Zero rate disables it.
pub struct RateLimiter {
    bytes_per_sec: u64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl RateLimiter {
    pub fn new(bytes_per_sec: u64) -> Self {
        Self {
            bytes_per_sec,
            state: Mutex::new(BucketState {
                tokens: bytes_per_sec as f64,
                refilled_at: Instant::now(),
            }),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.bytes_per_sec > 0
    }

    /// Wait until `bytes` fit into the budget, then consume them.
    pub async fn admit(&self, bytes: usize) {
        if self.bytes_per_sec == 0 {
            return;
        }
        loop {
            let wait = {
                let mut state = self.state.lock();
                self.refill(&mut state);

                let needed = bytes as f64;
                if state.tokens >= needed {
                    state.tokens -= needed;
                    return;
                }
                // Oversized requests (> 1s of budget) drain whatever
                // is there and wait one refill; they are admitted
                // rather than starved forever.
                if needed > self.bytes_per_sec as f64 && state.tokens >= 0.0 {
                    state.tokens -= needed;
                    return;
                }
                let missing = needed - state.tokens;
                Duration::from_secs_f64(missing / self.bytes_per_sec as f64)
            };
            tokio::time::sleep(wait).await;
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
        state.refilled_at = now;
        let cap = self.bytes_per_sec as f64;
        state.tokens = (state.tokens + elapsed * cap).min(cap);
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("bytes_per_sec", &self.bytes_per_sec)
            .finish()
    }
}
