use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio::time::sleep;

use super::TokenAcquirer;
use crate::config::LimiterConfig;

/// Token bucket with a sustained refill rate and a burst capacity.
///
/// Tokens accumulate at `rate` per second up to `burst`; `acquire` takes
/// one token, sleeping until enough have accumulated. State is behind a
/// sync mutex held only for the refill arithmetic, never across an await.
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a bucket starting full. `rate` must be positive and `burst`
    /// at least 1; [`LimiterConfig::validate`] enforces both.
    pub fn new(rate: f64, burst: u32) -> Self {
        debug_assert!(rate > 0.0);
        debug_assert!(burst > 0);
        Self {
            rate,
            burst: f64::from(burst),
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::new(config.rate_per_second, config.burst)
    }

    /// Refills from elapsed time, then either takes a token or returns how
    /// long to sleep before retrying.
    fn try_take(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.last_refill = now;
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - state.tokens) / self.rate))
        }
    }
}

#[async_trait]
impl TokenAcquirer for TokenBucket {
    async fn acquire(&self) {
        while let Some(wait) = self.try_take() {
            sleep(wait).await;
        }
    }
}
