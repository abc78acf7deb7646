//! Cache contract consumed by the revocation store, permission resolver and
//! rate limiter.
//!
//! ## Semantics
//!
//! All values are strings. Every entry written by this crate carries a TTL
//! and relies on the backend to expire it:
//!
//! ```text
//! blacklist:<jti>                         TTL = remaining lifetime + leeway
//! permissions:<principal>                 TTL = permission cache TTL
//! owner:<resource>:<id>                   TTL = ownership cache TTL
//! ratelimit:<policy>:<key>:<window-start> TTL = window length
//! ```
//!
//! Each key is independently consistent. Nothing here assumes cross-key
//! atomicity.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryCache;

/// Errors reported by cache backends.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The backend could not be reached.
    #[error("Cache connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed a command.
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// A stored value could not be interpreted.
    #[error("Invalid cached value for '{key}': {message}")]
    InvalidValue {
        /// Key holding the value.
        key: String,
        /// Why the value is invalid.
        message: String,
    },
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Key-value cache with TTL semantics.
///
/// Implementations must be safe to share across tasks; the pipeline does no
/// additional locking around them.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Stores `value` under `key`, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    /// Returns the value under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Deletes the given keys, returning how many existed.
    async fn del(&self, keys: &[&str]) -> CacheResult<u64>;

    /// Counts how many of the given keys exist.
    async fn exists(&self, keys: &[&str]) -> CacheResult<u64>;

    /// Sets a TTL on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Remaining lifetime of `key`.
    ///
    /// Returns `None` if the key is absent or has no expiry.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Increments the integer under `key` by one and returns the new value.
    ///
    /// Absent keys start at zero. A new key created by this call has no TTL.
    ///
    /// The default implementation is a read-then-write approximation: under
    /// concurrent load two callers may read the same value and both write
    /// `n + 1`, so counters built on it may slightly over-admit. Backends
    /// with a native atomic increment override it.
    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let current = match self.get(key).await? {
            Some(raw) => raw.parse::<i64>().map_err(|e| CacheError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?,
            None => 0,
        };
        let ttl = self.ttl(key).await?;
        let next = current + 1;
        self.set(key, &next.to_string(), ttl).await?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Delegates storage to `MemoryCache` but keeps the trait's `incr`.
    struct PlainCache(MemoryCache);

    #[async_trait]
    impl Cache for PlainCache {
        async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
            self.0.set(key, value, ttl).await
        }
        async fn get(&self, key: &str) -> CacheResult<Option<String>> {
            self.0.get(key).await
        }
        async fn del(&self, keys: &[&str]) -> CacheResult<u64> {
            self.0.del(keys).await
        }
        async fn exists(&self, keys: &[&str]) -> CacheResult<u64> {
            self.0.exists(keys).await
        }
        async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
            self.0.expire(key, ttl).await
        }
        async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
            self.0.ttl(key).await
        }
    }

    #[tokio::test]
    async fn test_default_incr_counts_from_zero() {
        let cache = PlainCache(MemoryCache::new());

        assert_eq!(cache.incr("hits").await.unwrap(), 1);
        assert_eq!(cache.incr("hits").await.unwrap(), 2);
        assert_eq!(cache.get("hits").await.unwrap().as_deref(), Some("2"));
        assert!(cache.ttl("hits").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_incr_keeps_ttl() {
        let cache = PlainCache(MemoryCache::new());
        cache
            .set("hits", "4", Some(Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(cache.incr("hits").await.unwrap(), 5);
        let ttl = cache.ttl("hits").await.unwrap().unwrap();
        assert!(ttl > Duration::from_secs(55) && ttl <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_default_incr_rejects_non_integer() {
        let cache = PlainCache(MemoryCache::new());
        cache.set("hits", "many", None).await.unwrap();

        let err = cache.incr("hits").await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidValue { ref key, .. } if key == "hits"));
    }
}
