//! Database sessions and scoped acquisition.
//!
//! A [`Session`] is one borrowed database connection. Engine operations take
//! an optional session; when the caller passes none, a [`DbHandle`] acquires
//! one from the [`Database`] pool for the duration of the call and returns it
//! on drop, including on error. A session passed in by the caller is only
//! borrowed: the engine never commits, rolls back or closes it.

use async_trait::async_trait;
use hybrid_common::DB_LOG_TARGET;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, Postgres};

use crate::query::Statement;
use crate::types::{decode_row, Row};
use crate::{Result, Value};

/// One database connection able to run statements.
#[async_trait]
pub trait Session: Send {
    /// Runs a statement and returns every row in server order.
    async fn fetch_all(&mut self, stmt: &Statement) -> Result<Vec<Row>>;

    /// Runs a statement and returns its rows-affected count.
    async fn execute(&mut self, stmt: &Statement) -> Result<u64>;

    /// First row, if any.
    async fn fetch_optional(&mut self, stmt: &Statement) -> Result<Option<Row>> {
        Ok(self.fetch_all(stmt).await?.into_iter().next())
    }

    /// First column of the first row; NULL when there is no row.
    async fn scalar(&mut self, stmt: &Statement) -> Result<Value> {
        Ok(self
            .fetch_optional(stmt)
            .await?
            .and_then(|row| row.into_iter().next())
            .map(|(_, value)| value)
            .unwrap_or(Value::Null))
    }

    /// Upcasts a concrete session for the `conn` argument of engine operations.
    fn as_session(&mut self) -> &mut dyn Session
    where
        Self: Sized,
    {
        self
    }
}

/// A pool of sessions.
#[async_trait]
pub trait Database: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn Session>>;
}

/// Logs a statement with literal values inlined, only when a subscriber
/// listens on the db target at DEBUG.
pub(crate) fn log_statement(stmt: &Statement) {
    if tracing::enabled!(target: DB_LOG_TARGET, tracing::Level::DEBUG) {
        tracing::debug!(target: DB_LOG_TARGET, "{}", stmt.to_literal_sql());
    }
}

pub(crate) async fn pg_fetch_all(conn: &mut PgConnection, stmt: &Statement) -> Result<Vec<Row>> {
    log_statement(stmt);
    let rows = sqlx::query_with(&stmt.sql, stmt.arguments()?)
        .fetch_all(conn)
        .await?;
    rows.iter().map(decode_row).collect()
}

pub(crate) async fn pg_fetch_optional(conn: &mut PgConnection, stmt: &Statement) -> Result<Option<Row>> {
    log_statement(stmt);
    let row = sqlx::query_with(&stmt.sql, stmt.arguments()?)
        .fetch_optional(conn)
        .await?;
    row.as_ref().map(decode_row).transpose()
}

pub(crate) async fn pg_execute(conn: &mut PgConnection, stmt: &Statement) -> Result<u64> {
    log_statement(stmt);
    let result = sqlx::query_with(&stmt.sql, stmt.arguments()?)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// A pooled PostgreSQL connection, returned to the pool on drop.
pub struct PgSession {
    conn: PoolConnection<Postgres>,
}

impl std::fmt::Debug for PgSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSession").finish_non_exhaustive()
    }
}

impl PgSession {
    pub fn new(conn: PoolConnection<Postgres>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Session for PgSession {
    async fn fetch_all(&mut self, stmt: &Statement) -> Result<Vec<Row>> {
        pg_fetch_all(&mut self.conn, stmt).await
    }

    async fn execute(&mut self, stmt: &Statement) -> Result<u64> {
        pg_execute(&mut self.conn, stmt).await
    }

    async fn fetch_optional(&mut self, stmt: &Statement) -> Result<Option<Row>> {
        pg_fetch_optional(&mut self.conn, stmt).await
    }
}

/// A session that is either borrowed from the caller or owned for one call.
pub enum DbHandle<'a> {
    Borrowed(&'a mut dyn Session),
    Owned(Box<dyn Session>),
}

impl<'a> DbHandle<'a> {
    /// Uses the caller's session when given, otherwise acquires one from `db`.
    pub async fn resolve(db: &dyn Database, conn: Option<&'a mut dyn Session>) -> Result<DbHandle<'a>> {
        match conn {
            Some(session) => Ok(DbHandle::Borrowed(session)),
            None => Ok(DbHandle::Owned(db.acquire().await?)),
        }
    }

    pub fn session(&mut self) -> &mut dyn Session {
        match self {
            DbHandle::Borrowed(session) => &mut **session,
            DbHandle::Owned(session) => session.as_mut(),
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, DbHandle::Owned(_))
    }
}
