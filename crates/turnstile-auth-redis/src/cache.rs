//! [`Cache`] implementation over a `deadpool-redis` pool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, Runtime};
use redis::AsyncCommands;
use turnstile_auth::{Cache, CacheError, CacheResult};

use crate::config::RedisConfig;

/// Shared Redis cache.
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("RedisCache")
            .field("max_size", &status.max_size)
            .field("size", &status.size)
            .finish()
    }
}

/// Builds a pool from `config` and checks that Redis answers.
///
/// # Errors
///
/// Returns `CacheError::Connection` if the pool cannot be created or the
/// first connection fails.
pub async fn connect(config: &RedisConfig) -> CacheResult<RedisCache> {
    let timeout = Some(config.timeout);
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let pool_config = redis_config
        .pool
        .get_or_insert_with(|| deadpool_redis::PoolConfig::new(config.pool_size));
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = timeout;
    pool_config.timeouts.create = timeout;
    pool_config.timeouts.recycle = timeout;

    let pool = redis_config
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| CacheError::Connection(e.to_string()))?;

    let cache = RedisCache::new(pool);
    cache.ping().await?;
    tracing::info!(url = %config.url, pool_size = config.pool_size, "Connected to Redis");
    Ok(cache)
}

fn backend(e: redis::RedisError) -> CacheError {
    CacheError::Backend(e.to_string())
}

/// Whole seconds, rounded up so that a sub-second TTL still expires.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}

impl RedisCache {
    /// Wraps an existing pool.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> CacheResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))
    }

    /// Round-trips a `PING`.
    ///
    /// # Errors
    ///
    /// Returns an error if Redis is unreachable.
    pub async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl_secs(ttl))
                .await
                .map_err(backend),
            None => conn.set::<_, _, ()>(key, value).await.map_err(backend),
        }
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn().await?;
        conn.get::<_, Option<String>>(key).await.map_err(backend)
    }

    async fn del(&self, keys: &[&str]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        conn.del::<_, u64>(keys).await.map_err(backend)
    }

    async fn exists(&self, keys: &[&str]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        conn.exists::<_, u64>(keys).await.map_err(backend)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let secs = i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX);
        let mut conn = self.conn().await?;
        conn.expire::<_, bool>(key, secs).await.map_err(backend)
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let mut conn = self.conn().await?;
        // -2: no such key, -1: no expiry
        let secs: i64 = conn.ttl(key).await.map_err(backend)?;
        Ok(u64::try_from(secs).ok().map(Duration::from_secs))
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let mut conn = self.conn().await?;
        conn.incr::<_, _, i64>(key, 1).await.map_err(backend)
    }
}
