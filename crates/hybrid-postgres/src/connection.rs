//! PostgreSQL connection management with connection pooling.
//!
//! Connection failures are reported immediately; there is no retry or backoff.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use crate::session::{Database, PgSession, Session};
use crate::{HybridError, Result};

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool.
    pub min_connections: u32,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Acquire timeout in seconds.
    pub connect_timeout: u64,
    /// Maximum lifetime of a connection in seconds.
    pub max_lifetime: Option<u64>,
    /// Idle timeout in seconds.
    pub idle_timeout: Option<u64>,
    /// Number of prepared statements to cache per connection (0 disables).
    pub statement_cache_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            connect_timeout: 30,
            max_lifetime: Some(1800), // 30 minutes
            idle_timeout: Some(600),   // 10 minutes
            statement_cache_capacity: 100,
        }
    }
}

impl PoolConfig {
    /// Reads `DATABASE_POOL_MIN`, `DATABASE_POOL_MAX` and
    /// `DATABASE_CONNECT_TIMEOUT`, keeping defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_connections: env_or("DATABASE_POOL_MIN", defaults.min_connections),
            max_connections: env_or("DATABASE_POOL_MAX", defaults.max_connections),
            connect_timeout: env_or("DATABASE_CONNECT_TIMEOUT", defaults.connect_timeout),
            ..defaults
        }
    }
}

pub(crate) fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// PostgreSQL connection wrapper with connection pooling.
#[derive(Clone)]
pub struct Connection {
    pool: PgPool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("size", &self.pool.size())
            .field("num_idle", &self.pool.num_idle())
            .finish()
    }
}

impl Connection {
    /// Creates a new connection pool and verifies it with a ping.
    ///
    /// # Errors
    ///
    /// Returns error if the URI is invalid or the server is unreachable.
    #[instrument(skip(uri), fields(
        min_connections = config.min_connections,
        max_connections = config.max_connections
    ))]
    pub async fn new(uri: &str, config: PoolConfig) -> Result<Self> {
        if uri.is_empty() {
            return Err(HybridError::Connection(
                "Connection URI cannot be empty".to_string(),
            ));
        }

        info!("Initializing connection pool");

        let mut pool_options = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout));

        if let Some(max_lifetime_secs) = config.max_lifetime {
            pool_options = pool_options.max_lifetime(Duration::from_secs(max_lifetime_secs));
        }
        if let Some(idle_timeout_secs) = config.idle_timeout {
            pool_options = pool_options.idle_timeout(Duration::from_secs(idle_timeout_secs));
        }

        let connect_options = PgConnectOptions::from_str(uri)
            .map_err(|e| HybridError::Connection(format!("Invalid connection URI: {}", e)))?
            .statement_cache_capacity(config.statement_cache_capacity);

        let pool = pool_options.connect_with(connect_options).await?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| HybridError::Connection(format!("Failed to verify connection: {}", e)))?;

        info!("Connection pool initialized successfully");
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Pings the database to verify connectivity.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Database for Connection {
    async fn acquire(&self) -> Result<Box<dyn Session>> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PgSession::new(conn)))
    }
}
