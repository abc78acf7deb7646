//! Fixed-window request counters over the shared cache.
//!
//! For limit `L` and window `W` the counter for key `K` lives at
//! `ratelimit:<policy>:<K>:<window-start>` where `window-start` is the
//! current Unix time truncated to a multiple of `W`. The counter is created
//! by the first request in a window and expires with it; a counter found
//! without a TTL gets one on the next increment.
//!
//! Windows are hard: a client can spend `L` just before a boundary and `L`
//! again just after it, so up to `2L` requests may land within `W` seconds.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use super::policy::RateLimitPolicy;
use crate::cache::{Cache, CacheResult};

/// Source of the current Unix time in seconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| OffsetDateTime::now_utc().unix_timestamp())
}

/// Cache key of a policy's counter for one window.
#[must_use]
pub fn window_key(policy: &str, key: &str, window_start: i64) -> String {
    format!("ratelimit:{policy}:{key}:{window_start}")
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Window limit.
    pub limit: u32,
    /// Requests left in the window after this one.
    pub remaining: u32,
    /// Unix time at which the window resets.
    pub reset_at: i64,
    /// Seconds to wait before retrying; zero when allowed.
    pub retry_after: u64,
}

/// Counter state for a key, read without spending budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateStatus {
    /// Window limit.
    pub limit: u32,
    /// Requests counted in the current window.
    pub used: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Unix time at which the window resets.
    pub reset_at: i64,
}

/// Fixed-window rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn Cache>,
    clock: Clock,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Creates a limiter on the system clock.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            cache,
            clock: system_clock(),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn window(&self, policy: &RateLimitPolicy) -> (i64, i64) {
        let now = (self.clock)();
        let window = policy.window_secs();
        (now, now - now.rem_euclid(window))
    }

    /// Spends one request of `key`'s budget under `policy`.
    ///
    /// # Errors
    ///
    /// Returns the cache error if the counter cannot be read or written.
    pub async fn check(&self, policy: &RateLimitPolicy, key: &str) -> CacheResult<RateDecision> {
        let (now, start) = self.window(policy);
        let reset_at = start + policy.window_secs();
        let counter = window_key(&policy.name, key, start);

        let denied = || RateDecision {
            allowed: false,
            limit: policy.limit,
            remaining: 0,
            reset_at,
            retry_after: u64::try_from(reset_at - now).unwrap_or(0).max(1),
        };

        let current = match self.cache.get(&counter).await? {
            Some(raw) => raw.parse::<u64>().unwrap_or(0),
            None => 0,
        };
        if current >= u64::from(policy.limit) {
            return Ok(denied());
        }

        let count = self.cache.incr(&counter).await?;
        // Re-apply a missing TTL so a failed `expire` cannot leave a permanent counter.
        if count == 1 || self.cache.ttl(&counter).await?.is_none() {
            let ttl = Duration::from_secs(policy.window_secs().unsigned_abs());
            self.cache.expire(&counter, ttl).await?;
        }

        let count = u64::try_from(count).unwrap_or(0);
        if count > u64::from(policy.limit) {
            // Another request took the last slot between our read and increment.
            return Ok(denied());
        }

        Ok(RateDecision {
            allowed: true,
            limit: policy.limit,
            remaining: policy.limit - count as u32,
            reset_at,
            retry_after: 0,
        })
    }

    /// Like [`check`](Self::check), but a cache failure allows the request.
    pub async fn allow(&self, policy: &RateLimitPolicy, key: &str) -> RateDecision {
        match self.check(policy, key).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(
                    policy = %policy.name,
                    key = %key,
                    error = %e,
                    "Rate limit check failed, allowing request"
                );
                let (_, start) = self.window(policy);
                RateDecision {
                    allowed: true,
                    limit: policy.limit,
                    remaining: policy.limit,
                    reset_at: start + policy.window_secs(),
                    retry_after: 0,
                }
            }
        }
    }

    /// Reports `key`'s current window without counting a request.
    ///
    /// # Errors
    ///
    /// Returns the cache error if the counter cannot be read.
    pub async fn status(&self, policy: &RateLimitPolicy, key: &str) -> CacheResult<RateStatus> {
        let (_, start) = self.window(policy);
        let used = self
            .cache
            .get(&window_key(&policy.name, key, start))
            .await?
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(0);

        Ok(RateStatus {
            limit: policy.limit,
            used,
            remaining: policy.limit.saturating_sub(used),
            reset_at: start + policy.window_secs(),
        })
    }

    /// Resets `key`'s current window. Returns `true` if a counter existed.
    ///
    /// # Errors
    ///
    /// Returns the cache error if the counter cannot be deleted.
    pub async fn clear(&self, policy: &RateLimitPolicy, key: &str) -> CacheResult<bool> {
        let (_, start) = self.window(policy);
        let removed = self
            .cache
            .del(&[&window_key(&policy.name, key, start)])
            .await?;
        tracing::debug!(policy = %policy.name, key = %key, removed, "Rate limit cleared");
        Ok(removed > 0)
    }
}
