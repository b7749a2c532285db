use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use firmscout_core::config::{BucketConfig, RateLimitConfig};

struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

/// Token bucket with lazy refill. Tokens accrue `refill_rate` per elapsed
/// `refill_interval`, capped at `capacity`; nothing runs in the background.
pub struct TokenBucket {
    name: String,
    capacity: u64,
    refill_rate: u64,
    refill_interval: Duration,
    state: Mutex<BucketState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketStatus {
    pub name: String,
    pub tokens: u64,
    pub capacity: u64,
    pub refill_rate: u64,
}

impl TokenBucket {
    pub fn new(name: impl Into<String>, capacity: u64, refill_rate: u64, refill_interval: Duration) -> Self {
        Self {
            name: name.into(),
            capacity,
            refill_rate,
            refill_interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &BucketConfig) -> Self {
        Self::new(
            name,
            config.capacity,
            config.refill_rate,
            Duration::from_millis(config.refill_interval_ms),
        )
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed();
        if elapsed < self.refill_interval {
            return;
        }
        let intervals = (elapsed.as_nanos() / self.refill_interval.as_nanos()) as u64;
        state.tokens = (state.tokens + intervals * self.refill_rate).min(self.capacity);
        // Advance by whole intervals only, so partial progress is not lost.
        state.last_refill += self.refill_interval * intervals as u32;
    }

    /// Takes `n` tokens if available right now.
    pub fn acquire(&self, n: u64) -> bool {
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state);
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Retries `acquire` until it succeeds or `max_wait` elapses.
    pub async fn wait_for(&self, n: u64, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        loop {
            if self.acquire(n) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(bucket = %self.name, wanted = n, "token wait timed out");
                return false;
            }
            let poll = self.refill_interval.min(Duration::from_millis(100));
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    pub fn status(&self) -> BucketStatus {
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state);
        BucketStatus {
            name: self.name.clone(),
            tokens: state.tokens,
            capacity: self.capacity,
            refill_rate: self.refill_rate,
        }
    }
}

/// The three process-wide buckets, one per operation class. Buckets are
/// individually shareable because the stages each hold their own handle.
pub struct RateLimiters {
    pub search: std::sync::Arc<TokenBucket>,
    pub crawl: std::sync::Arc<TokenBucket>,
    pub extraction: std::sync::Arc<TokenBucket>,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            search: std::sync::Arc::new(TokenBucket::from_config("search", &config.search)),
            crawl: std::sync::Arc::new(TokenBucket::from_config("crawl", &config.crawl)),
            extraction: std::sync::Arc::new(TokenBucket::from_config("extraction", &config.extraction)),
        }
    }

    pub fn snapshot(&self) -> Vec<BucketStatus> {
        vec![
            self.search.status(),
            self.crawl.status(),
            self.extraction.status(),
        ]
    }
}
