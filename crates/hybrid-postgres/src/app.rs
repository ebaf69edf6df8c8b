//! Application context: the connection and cache handles one running
//! application hands to its bound record types.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::cache::{CachePool, RedisCache, RedisCacheConfig};
use crate::connection::{Connection, PoolConfig};
use crate::session::Database;
use crate::Result;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Namespace for cache keys. Unnamed applications share the bare prefixes.
    pub name: Option<String>,
    pub database_url: String,
    #[serde(skip)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub cache: RedisCacheConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: None,
            database_url: "postgresql://localhost/postgres".to_string(),
            pool: PoolConfig::default(),
            cache: RedisCacheConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads `APP_NAME` and `DATABASE_URL`, plus the pool and cache variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            name: std::env::var("APP_NAME").ok().filter(|n| !n.is_empty()),
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            pool: PoolConfig::from_env(),
            cache: RedisCacheConfig::from_env(),
        }
    }
}

/// Handles shared by every record type bound to one application.
#[derive(Clone)]
pub struct AppContext {
    name: Option<String>,
    db: Arc<dyn Database>,
    cache: Arc<dyn CachePool>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext").field("name", &self.name).finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn new(db: Arc<dyn Database>, cache: Arc<dyn CachePool>) -> Self {
        Self { name: None, db, cache }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Opens the PostgreSQL pool and builds the Redis pool.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let db = Connection::new(&config.database_url, config.pool.clone()).await?;
        let cache = RedisCache::new(&config.cache)?;
        info!(app = ?config.name, "Application context ready");
        Ok(Self {
            name: config.name.clone(),
            db: Arc::new(db),
            cache: Arc::new(cache),
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn db(&self) -> &dyn Database {
        self.db.as_ref()
    }

    pub fn cache(&self) -> &dyn CachePool {
        self.cache.as_ref()
    }

    /// `<name>:<tag>` or just `<tag>` for an unnamed application.
    pub(crate) fn cache_prefix(&self, tag: &str) -> String {
        match &self.name {
            Some(name) => format!("{}:{}", name, tag),
            None => tag.to_string(),
        }
    }
}
