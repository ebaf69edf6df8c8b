//! SQL statement builder.
//!
//! Every statement the engine runs is built here as a [`Statement`]: SQL text
//! with `$n` placeholders plus the bound values. Identifiers are validated and
//! quoted; values never reach the SQL text except through
//! [`Statement::to_literal_sql`], which exists for logging and cache digests.
//!
//! # Examples
//!
//! ```ignore
//! use hybrid_postgres::query::{Select, Predicate, OrderBy};
//!
//! let stmt = Select::new("users")?
//!     .columns(["id", "name"])?
//!     .filter(Predicate::gte("age", 18))
//!     .order_by(OrderBy::parse("-created")?)
//!     .limit(10)
//!     .build()?;
//! // SELECT "users"."id", "users"."name" FROM "users" WHERE "age" >= $1 ORDER BY "created" DESC LIMIT $2
//! ```
//!
//! ```ignore
//! use hybrid_postgres::query::{Update, Predicate};
//! use serde_json::json;
//!
//! let stmt = Update::new("items")?
//!     .json_merge("meta", json!({"color": "red"}))?
//!     .filter(Predicate::eq("id", 7))
//!     .returning("id")?
//!     .build()?;
//! // UPDATE "items" SET "meta" = COALESCE("meta", '{}'::jsonb) || $1::jsonb WHERE "id" = $2 RETURNING "id"
//! ```

mod helpers;
mod join;
mod modify;
mod predicate;
mod select;
mod statement;

#[cfg(test)]
mod tests;

pub use helpers::{adjust_param_indices, quote_identifier, validate_identifier, validate_identifier_part};
pub use join::{Join, JoinType};
pub use modify::{Assignment, Delete, Insert, Update};
pub use predicate::{Operator, Predicate};
pub use select::{OrderBy, OrderDirection, Select};
pub use statement::Statement;
