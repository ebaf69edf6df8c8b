//! Cache store for aggregate memoization.
//!
//! The engine needs only `get`, `set` and `expire` on string values. Two
//! backends are provided: [`RedisCache`] (deadpool-redis pool, shared between
//! processes) and [`MemoryCache`] (in-process map with TTL, for tests and
//! single-process deployments).

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::{Config as RedisPoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::connection::env_or;
use crate::{HybridError, Result};

/// One cache-store connection.
#[async_trait]
pub trait CacheStore: Send {
    async fn get(&mut self, key: &str) -> Result<Option<String>>;

    async fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Sets a time-to-live in seconds on an existing key.
    async fn expire(&mut self, key: &str, ttl_secs: u64) -> Result<()>;

    /// Upcasts a concrete store for the `cache` argument of aggregate operations.
    fn as_cache(&mut self) -> &mut dyn CacheStore
    where
        Self: Sized,
    {
        self
    }
}

/// A pool of cache-store connections.
#[async_trait]
pub trait CachePool: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn CacheStore>>;
}

/// A cache connection either borrowed from the caller or owned for one call.
pub enum CacheHandle<'a> {
    Borrowed(&'a mut dyn CacheStore),
    Owned(Box<dyn CacheStore>),
}

impl<'a> CacheHandle<'a> {
    pub async fn resolve(pool: &dyn CachePool, cache: Option<&'a mut dyn CacheStore>) -> Result<CacheHandle<'a>> {
        match cache {
            Some(store) => Ok(CacheHandle::Borrowed(store)),
            None => Ok(CacheHandle::Owned(pool.acquire().await?)),
        }
    }

    pub fn store(&mut self) -> &mut dyn CacheStore {
        match self {
            CacheHandle::Borrowed(store) => &mut **store,
            CacheHandle::Owned(store) => store.as_mut(),
        }
    }
}

/// Redis cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedisCacheConfig {
    /// Redis URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Connection pool size
    pub pool_size: usize,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
        }
    }
}

impl RedisCacheConfig {
    /// Reads `REDIS_URL` and `REDIS_POOL_SIZE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("REDIS_URL").unwrap_or(defaults.url),
            pool_size: env_or("REDIS_POOL_SIZE", defaults.pool_size),
        }
    }
}

/// Redis-backed cache pool.
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("status", &self.pool.status())
            .finish()
    }
}

impl RedisCache {
    /// Builds the pool. Connections are opened lazily on first acquire.
    pub fn new(config: &RedisCacheConfig) -> Result<Self> {
        debug!(url = %config.url, pool_size = config.pool_size, "Creating Redis cache pool");

        let pool = RedisPoolConfig::from_url(&config.url)
            .builder()
            .map_err(|e| HybridError::Cache(format!("Failed to create pool builder: {}", e)))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| HybridError::Cache(format!("Failed to create pool: {}", e)))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl CachePool for RedisCache {
    async fn acquire(&self) -> Result<Box<dyn CacheStore>> {
        let conn = self.pool.get().await?;
        Ok(Box::new(RedisConnection { conn }))
    }
}

/// A pooled Redis connection.
pub struct RedisConnection {
    conn: deadpool_redis::Connection,
}

#[async_trait]
impl CacheStore for RedisConnection {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self.conn.get(key).await?;
        Ok(value)
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn expire(&mut self, key: &str, ttl_secs: u64) -> Result<()> {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        self.conn.expire::<_, ()>(key, ttl).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process cache store. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.is_live(now))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remaining TTL of a key, if it has one.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let live = self.entries.get(key).map(|e| (e.is_live(now), e.value.clone()));
        match live {
            Some((true, value)) => Ok(Some(value)),
            Some((false, _)) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry { value: value.to_string(), expires_at: None },
        );
        Ok(())
    }

    async fn expire(&mut self, key: &str, ttl_secs: u64) -> Result<()> {
        if ttl_secs == 0 {
            self.entries.remove(key);
            return Ok(());
        }
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
        }
        Ok(())
    }
}

#[async_trait]
impl CachePool for MemoryCache {
    async fn acquire(&self) -> Result<Box<dyn CacheStore>> {
        Ok(Box::new(self.clone()))
    }
}
