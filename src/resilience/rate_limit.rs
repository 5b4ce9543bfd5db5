//! Token-bucket rate limiting for outbound provider calls.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Longest single wait handed out; `acquire` simply waits again after it.
const MAX_WAIT: Duration = Duration::from_secs(3_600);

/// A simple token bucket.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    /// Take a token, or report how long until one is available.
    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let wait = Duration::try_from_secs_f64((1.0 - self.tokens) / refill_rate)
                .unwrap_or(MAX_WAIT);
            Err(wait.min(MAX_WAIT))
        }
    }
}

/// Async token-bucket limiter. One instance per provider.
pub struct RateLimiter {
    name: String,
    bucket: Mutex<TokenBucket>,
    capacity: f64,
    refill_rate: f64,
}

impl RateLimiter {
    /// `rate` tokens per second with room for `burst` back-to-back calls.
    pub fn new(name: impl Into<String>, rate: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            name: name.into(),
            bucket: Mutex::new(TokenBucket::new(capacity)),
            capacity,
            refill_rate: if rate.is_nan() {
                f64::MIN_POSITIVE
            } else {
                rate.clamp(f64::MIN_POSITIVE, f64::MAX)
            },
        }
    }

    /// Limiter expressed as a per-minute rate with no burst.
    pub fn per_minute(name: impl Into<String>, per_minute: f64) -> Self {
        Self::new(name, per_minute / 60.0, 1)
    }

    pub fn try_acquire(&self) -> bool {
        self.check().is_ok()
    }

    /// Wait until a token is available.
    pub async fn acquire(&self) {
        loop {
            match self.check() {
                Ok(()) => return,
                Err(wait) => {
                    tracing::trace!(limiter = %self.name, wait_ms = wait.as_millis() as u64, "Rate limited, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn check(&self) -> Result<(), Duration> {
        let mut bucket = self
            .bucket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        bucket.try_acquire(self.capacity, self.refill_rate)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("refill_rate", &self.refill_rate)
            .finish()
    }
}
