use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::time::{self, Instant};

/// Token bucket parameters plus the idle-entry eviction policy for a
/// [`RateLimiter`].
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Tokens replenished per second. Must be positive.
    pub rate: f64,
    /// Bucket capacity.
    pub burst: u32,
    /// Keys idle for longer than this are removed by the sweep task.
    pub ttl: Duration,
    /// Interval between eviction sweeps.
    pub sweep_interval: Duration,
}

/// Enforces rate limits per key (e.g. device ID). Buckets are created
/// lazily on first use and inactive keys are swept after the configured
/// TTL, bounding memory across a growing device population.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    rate: f64,
    burst: f64,
    ttl: Duration,
}

struct Entry {
    bucket: Arc<Bucket>,
    seen: Instant,
}

struct Bucket {
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Creates a limiter and, when both `ttl` and `sweep_interval` are
    /// non-zero, spawns its background sweep task. The sweep holds only a
    /// weak handle and exits once every limiter clone is dropped.
    pub fn new(config: RateLimitConfig) -> Self {
        let inner = Arc::new(Inner {
            entries: Mutex::new(HashMap::new()),
            rate: config.rate,
            burst: f64::from(config.burst),
            ttl: config.ttl,
        });

        if !config.ttl.is_zero() && !config.sweep_interval.is_zero() {
            tokio::spawn(sweep(Arc::downgrade(&inner), config.sweep_interval));
        }

        Self { inner }
    }

    /// Blocks until a token is available for the given key. The wait never
    /// fails on its own; callers bound it with a timeout (or drop the
    /// future) and treat an elapsed timeout as a throttled outcome.
    pub async fn wait(&self, key: &str) {
        let bucket = self.inner.checkout(key);
        loop {
            match bucket.take(self.inner.rate, self.inner.burst) {
                None => return,
                Some(delay) => time::sleep(delay).await,
            }
        }
    }
}

impl Inner {
    // Looks up or lazily creates the bucket for a key and refreshes its
    // last-seen time. The map lock is released before any waiting happens,
    // so independent keys never contend beyond this O(1) access.
    fn checkout(&self, key: &str) -> Arc<Bucket> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) => {
                entry.seen = now;
                entry.bucket.clone()
            }
            None => {
                let bucket = Arc::new(Bucket {
                    state: Mutex::new(BucketState {
                        tokens: self.burst,
                        last_refill: now,
                    }),
                });
                entries.insert(
                    key.to_string(),
                    Entry {
                        bucket: bucket.clone(),
                        seen: now,
                    },
                );
                bucket
            }
        }
    }

    fn evict_idle(&self, now: Instant) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, entry| now.duration_since(entry.seen) <= self.ttl);
    }
}

impl Bucket {
    // Takes one token if available, otherwise returns how long until the
    // next token accrues. A bucket evicted from the map mid-wait keeps
    // working: the Arc held by the waiter outlives the map entry.
    fn take(&self, rate: f64, burst: f64) -> Option<Duration> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(burst);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return None;
        }
        Some(Duration::from_secs_f64((1.0 - state.tokens) / rate))
    }
}

async fn sweep(inner: Weak<Inner>, interval: Duration) {
    let mut ticker = time::interval(interval);
    ticker.tick().await; // first tick completes immediately
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else { break };
        inner.evict_idle(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rate: f64, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            rate,
            burst,
            ttl: Duration::ZERO,
            sweep_interval: Duration::ZERO,
        }
    }

    #[test]
    fn test_allows_requests_within_burst() {
        tokio_test::block_on(async {
            let limiter = RateLimiter::new(config(10.0, 5));
            for _ in 0..5 {
                limiter.wait("foo").await;
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_for_one_token_interval_after_burst() {
        let interval = Duration::from_millis(100);
        let limiter = RateLimiter::new(config(10.0, 1));
        limiter.wait("foo").await; // consume burst

        let start = Instant::now();
        limiter.wait("foo").await;
        let elapsed = start.elapsed();

        assert!(elapsed >= interval, "second wait returned after {elapsed:?}");
        assert!(elapsed < interval * 2, "second wait returned after {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_keys_do_not_wait_on_each_other() {
        let limiter = RateLimiter::new(config(10.0, 1));
        limiter.wait("foo").await; // exhaust foo's bucket

        let start = Instant::now();
        limiter.wait("bar").await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_before_token_interval() {
        let limiter = RateLimiter::new(config(1.0, 1));
        limiter.wait("foo").await; // consume burst; next token in 1s

        let start = Instant::now();
        let res = time::timeout(Duration::from_millis(10), limiter.wait("foo")).await;
        assert!(res.is_err());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_keys() {
        let limiter = RateLimiter::new(RateLimitConfig {
            rate: 1.0,
            burst: 1,
            ttl: Duration::from_millis(50),
            sweep_interval: Duration::from_millis(20),
        });
        limiter.wait("expired").await;

        time::sleep(Duration::from_millis(100)).await;
        let entries = limiter.inner.entries.lock().unwrap();
        assert!(!entries.contains_key("expired"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_active_keys() {
        let limiter = RateLimiter::new(RateLimitConfig {
            rate: 100.0,
            burst: 10,
            ttl: Duration::from_millis(50),
            sweep_interval: Duration::from_millis(20),
        });
        for _ in 0..5 {
            limiter.wait("busy").await;
            time::sleep(Duration::from_millis(15)).await;
        }
        let entries = limiter.inner.entries.lock().unwrap();
        assert!(entries.contains_key("busy"));
    }
}
