//! PostgreSQL transactions.
//!
//! A [`Transaction`] is itself a [`Session`], so several engine operations can
//! be composed atomically by passing it as their connection. The engine never
//! commits or rolls back a transaction it was handed.

use async_trait::async_trait;
use sqlx::Postgres;

use crate::query::{validate_identifier, Statement};
use crate::session::{pg_execute, pg_fetch_all, pg_fetch_optional, Session};
use crate::types::Row;
use crate::{Connection, Result};

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn to_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

impl AccessMode {
    pub fn to_sql(&self) -> &'static str {
        match self {
            AccessMode::ReadWrite => "READ WRITE",
            AccessMode::ReadOnly => "READ ONLY",
        }
    }
}

/// Options applied with `SET TRANSACTION` right after `BEGIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionOptions {
    pub isolation_level: IsolationLevel,
    pub access_mode: AccessMode,
    /// Only emitted for SERIALIZABLE READ ONLY
    pub deferrable: bool,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.access_mode = AccessMode::ReadOnly;
        self
    }

    pub fn deferrable(mut self, deferrable: bool) -> Self {
        self.deferrable = deferrable;
        self
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "SET TRANSACTION ISOLATION LEVEL {}, {}",
            self.isolation_level.to_sql(),
            self.access_mode.to_sql()
        );
        if self.isolation_level == IsolationLevel::Serializable && self.access_mode == AccessMode::ReadOnly {
            sql.push_str(if self.deferrable { ", DEFERRABLE" } else { ", NOT DEFERRABLE" });
        }
        sql
    }
}

/// An open transaction holding one pooled connection.
///
/// Dropping it without [`commit`](Transaction::commit) rolls back.
pub struct Transaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction").finish_non_exhaustive()
    }
}

impl Transaction {
    /// Begins a READ COMMITTED, READ WRITE transaction.
    pub async fn begin(conn: &Connection) -> Result<Self> {
        Self::begin_with_options(conn, TransactionOptions::default()).await
    }

    /// Begins a transaction with explicit isolation level and access mode.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let options = TransactionOptions::new()
    ///     .isolation_level(IsolationLevel::Serializable)
    ///     .read_only()
    ///     .deferrable(true);
    /// let tx = Transaction::begin_with_options(&conn, options).await?;
    /// ```
    pub async fn begin_with_options(conn: &Connection, options: TransactionOptions) -> Result<Self> {
        let mut tx = conn.pool().begin().await?;

        let sql = options.to_sql();
        sqlx::query(&sql).execute(&mut *tx).await?;

        tracing::debug!(
            isolation_level = ?options.isolation_level,
            access_mode = ?options.access_mode,
            deferrable = options.deferrable,
            "Started transaction"
        );

        Ok(Self { tx })
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }

    /// Creates a savepoint within the transaction.
    pub async fn savepoint(&mut self, name: &str) -> Result<()> {
        validate_identifier(name)?;
        sqlx::query(&format!("SAVEPOINT {}", name)).execute(&mut *self.tx).await?;
        tracing::debug!(savepoint = name, "Created savepoint");
        Ok(())
    }

    /// Rolls back to a savepoint.
    pub async fn rollback_to(&mut self, name: &str) -> Result<()> {
        validate_identifier(name)?;
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {}", name)).execute(&mut *self.tx).await?;
        tracing::debug!(savepoint = name, "Rolled back to savepoint");
        Ok(())
    }

    /// Releases a savepoint.
    pub async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        validate_identifier(name)?;
        sqlx::query(&format!("RELEASE SAVEPOINT {}", name)).execute(&mut *self.tx).await?;
        tracing::debug!(savepoint = name, "Released savepoint");
        Ok(())
    }
}

#[async_trait]
impl Session for Transaction {
    async fn fetch_all(&mut self, stmt: &Statement) -> Result<Vec<Row>> {
        pg_fetch_all(&mut self.tx, stmt).await
    }

    async fn execute(&mut self, stmt: &Statement) -> Result<u64> {
        pg_execute(&mut self.tx, stmt).await
    }

    async fn fetch_optional(&mut self, stmt: &Statement) -> Result<Option<Row>> {
        pg_fetch_optional(&mut self.tx, stmt).await
    }
}
