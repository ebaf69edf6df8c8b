//! COUNT and SUM with cache memoization.
//!
//! Cache keys are `[<app>:]count:<postfix>` and `[<app>:]aggregate:sum:<postfix>`,
//! where the postfix is caller-supplied or the digest of the literal-bound
//! statement. Entries are never invalidated; they live until their TTL.

use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, instrument};

use super::{Lookup, Model};
use crate::cache::{CacheHandle, CacheStore};
use crate::query::{Select, Statement};
use crate::session::{DbHandle, Session};
use crate::{HybridError, Result};

const COUNT_TAG: &str = "count:";
const SUM_TAG: &str = "aggregate:sum:";

/// Default count TTL in seconds.
pub const DEFAULT_COUNT_EXPIRE: u64 = 180;

/// Options for [`Model::get_count`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountOptions {
    pub postfix: Option<String>,
    /// TTL in seconds; 0 bypasses the cache entirely.
    pub expire: u64,
}

impl Default for CountOptions {
    fn default() -> Self {
        Self { postfix: None, expire: DEFAULT_COUNT_EXPIRE }
    }
}

impl CountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always hits the database.
    pub fn uncached() -> Self {
        Self { postfix: None, expire: 0 }
    }

    pub fn postfix(mut self, postfix: impl Into<String>) -> Self {
        self.postfix = Some(postfix.into());
        self
    }

    pub fn expire(mut self, secs: u64) -> Self {
        self.expire = secs;
        self
    }
}

/// Options for [`Model::get_sum`]. Caching is off unless `delay` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SumOptions {
    pub postfix: Option<String>,
    /// TTL in seconds; 0 disables caching.
    pub delay: u64,
}

impl SumOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn postfix(mut self, postfix: impl Into<String>) -> Self {
        self.postfix = Some(postfix.into());
        self
    }

    pub fn delay(mut self, secs: u64) -> Self {
        self.delay = secs;
        self
    }
}

impl Model {
    fn aggregate_select(&self, lookup: &Lookup) -> Result<Select> {
        let mut select = Select::new(self.table().name())?.filters(lookup.conditions(self.primary_key()));
        for join in lookup.joins() {
            select = select.join(join.clone());
        }
        Ok(select)
    }

    /// The statement `get_count` runs for `lookup`.
    pub fn count_statement(&self, lookup: &Lookup) -> Result<Statement> {
        self.aggregate_select(lookup)?.build_count()
    }

    /// The statement `get_sum` runs for `column` and `lookup`.
    pub fn sum_statement(&self, column: &str, lookup: &Lookup) -> Result<Statement> {
        self.table().check_column(column)?;
        self.aggregate_select(lookup)?.build_sum(column)
    }

    /// Cache key for an aggregate statement under `tag`.
    pub(crate) fn cache_key(&self, tag: &str, postfix: Option<&str>, stmt: &Statement) -> String {
        let mut key = self.app().cache_prefix(tag);
        match postfix.filter(|p| !p.is_empty()) {
            Some(postfix) => key.push_str(postfix),
            None => key.push_str(&stmt.digest()),
        }
        key
    }

    pub fn count_key(&self, lookup: &Lookup, options: &CountOptions) -> Result<String> {
        let stmt = self.count_statement(lookup)?;
        Ok(self.cache_key(COUNT_TAG, options.postfix.as_deref(), &stmt))
    }

    pub fn sum_key(&self, column: &str, lookup: &Lookup, options: &SumOptions) -> Result<String> {
        let stmt = self.sum_statement(column, lookup)?;
        Ok(self.cache_key(SUM_TAG, options.postfix.as_deref(), &stmt))
    }

    async fn scalar_count(&self, stmt: &Statement, conn: Option<&mut dyn Session>) -> Result<i64> {
        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        let value = handle.session().scalar(stmt).await?;
        if value.is_null() {
            return Ok(0);
        }
        value.as_i64().ok_or_else(|| {
            HybridError::Deserialization(format!("COUNT returned {}", value.pg_type_name()))
        })
    }

    /// Number of rows matching `lookup`, memoized for `options.expire` seconds.
    ///
    /// A database connection is only acquired on a cache miss; a cache
    /// connection only when caching is on.
    #[instrument(skip_all, fields(model = %self.name(), expire = options.expire))]
    pub async fn get_count(
        &self,
        lookup: impl Into<Lookup>,
        options: CountOptions,
        conn: Option<&mut dyn Session>,
        cache: Option<&mut dyn CacheStore>,
    ) -> Result<i64> {
        let stmt = self.count_statement(&lookup.into())?;
        if options.expire == 0 {
            return self.scalar_count(&stmt, conn).await;
        }

        let key = self.cache_key(COUNT_TAG, options.postfix.as_deref(), &stmt);
        let mut cache = CacheHandle::resolve(self.app().cache(), cache).await?;
        if let Some(cached) = cache.store().get(&key).await? {
            debug!(key = %key, "Count cache hit");
            return cached
                .trim()
                .parse::<i64>()
                .map_err(|e| HybridError::Cache(format!("bad cached count at '{}': {}", key, e)));
        }

        let count = self.scalar_count(&stmt, conn).await?;
        let store = cache.store();
        store.set(&key, &count.to_string()).await?;
        store.expire(&key, options.expire).await?;
        Ok(count)
    }

    /// Sum of `column` over rows matching `lookup`; zero when nothing matches.
    ///
    /// Cached for `options.delay` seconds when non-zero. A zero sum from no
    /// rows is not cached.
    #[instrument(skip_all, fields(model = %self.name(), column = column, delay = options.delay))]
    pub async fn get_sum(
        &self,
        column: &str,
        lookup: impl Into<Lookup>,
        options: SumOptions,
        conn: Option<&mut dyn Session>,
        cache: Option<&mut dyn CacheStore>,
    ) -> Result<Decimal> {
        let stmt = self.sum_statement(column, &lookup.into())?;
        let key = self.cache_key(SUM_TAG, options.postfix.as_deref(), &stmt);

        let mut cache = if options.delay > 0 {
            let mut handle = CacheHandle::resolve(self.app().cache(), cache).await?;
            if let Some(cached) = handle.store().get(&key).await? {
                debug!(key = %key, "Sum cache hit");
                return Decimal::from_str(cached.trim())
                    .map_err(|e| HybridError::Cache(format!("bad cached sum at '{}': {}", key, e)));
            }
            Some(handle)
        } else {
            None
        };

        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        let value = handle.session().scalar(&stmt).await?;
        if value.is_null() {
            return Ok(Decimal::ZERO);
        }
        let sum = value.to_decimal()?;

        if let Some(cache) = cache.as_mut() {
            let store = cache.store();
            store.set(&key, &sum.to_string()).await?;
            store.expire(&key, options.delay).await?;
        }
        Ok(sum)
    }
}
