//! Async active-record engine over PostgreSQL.
//!
//! Record types are declared once, bound per application, and then read and
//! written through a single-table engine with cached aggregates and
//! many-to-many traversal.
//!
//! # Architecture
//!
//! ```text
//!  ForeignModel --derive_schema--> Table + ManyToManyDef
//!           |
//!   ModelDef --declare--> ModelRegistry
//!           |
//!   AppModels::bind(name) --> Model --------> ManyToMany (join + target Models)
//!           |
//!   Select / Insert / Update / Delete --> Statement
//!           |
//!   Session (PgSession, Transaction)      CacheStore (RedisCache, MemoryCache)
//! ```
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use hybrid_postgres::{record, AppConfig, AppContext, AppModels, Lookup, ModelDef,
//!                       ModelRegistry, Predicate, Table, CountOptions};
//! use std::sync::Arc;
//!
//! # async fn example() -> hybrid_postgres::Result<()> {
//! let registry = Arc::new(ModelRegistry::new());
//! registry.declare(ModelDef::new("Book", Table::new("books")?.columns(["id", "title", "pages"])?));
//!
//! let app = AppContext::connect(&AppConfig::from_env()).await?;
//! let models = AppModels::new(registry, app);
//! let books = models.bind("Book")?;
//!
//! let book = books.create(record! { "title" => "Dune", "pages" => 412 }, None).await?;
//! let same = books.get_one(book.pk().unwrap(), None).await?;
//! let long = books.get_count(Predicate::gt("pages", 300), CountOptions::new(), None, None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Inside a transaction
//!
//! ```rust,ignore
//! let mut tx = Transaction::begin(&conn).await?;
//! books.update_fields(Predicate::eq("title", "Dune"), record! { "pages" => 500 }, Some(tx.as_session())).await?;
//! tx.commit().await?;
//! ```

pub mod app;
pub mod cache;
pub mod connection;
pub mod model;
pub mod query;
pub mod record;
pub mod registry;
pub mod relationship;
pub mod schema;
pub mod session;
pub mod transaction;
pub mod types;

pub use app::{AppConfig, AppContext};
pub use cache::{CacheHandle, CachePool, CacheStore, MemoryCache, RedisCache, RedisCacheConfig};
pub use connection::{Connection, PoolConfig};
pub use model::{
    validators, CountOptions, JsonPatch, KeyFilter, Lookup, Match, Model, ModelDef, Refresh, SumOptions,
};
pub use query::{Join, JoinType, OrderBy, OrderDirection, Predicate, Statement};
pub use record::Record;
pub use registry::{AppModels, ModelRegistry};
pub use relationship::{ManyToMany, ManyToManyDef, Sources};
pub use schema::{derive_schema, Column, DerivedSchema, FieldKind, ForeignField, ForeignModel, ManyToManyLink, SemanticType, Table};
pub use session::{Database, DbHandle, PgSession, Session};
pub use transaction::{AccessMode, IsolationLevel, Transaction, TransactionOptions};
pub use types::{Key, Row, Value};

pub use hybrid_common::{init_logging, normalize_model_name, HybridError, Result, DB_LOG_TARGET};
