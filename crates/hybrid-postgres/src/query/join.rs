//! Additional FROM sources.

use super::helpers::{quote_identifier, validate_identifier};
use crate::Result;

/// SQL join types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn to_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL OUTER JOIN",
        }
    }
}

/// A joined table with a structured `left = right` ON condition.
///
/// Only `table.column = table.column` conditions are expressible.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: String,
    /// Qualified column on the existing side, e.g. `orders.customer_id`
    pub left: String,
    /// Qualified column on the joined side, e.g. `customers.id`
    pub right: String,
}

impl Join {
    pub fn new(join_type: JoinType, table: &str, left: &str, right: &str) -> Result<Self> {
        validate_identifier(table)?;
        validate_identifier(left)?;
        validate_identifier(right)?;
        Ok(Self {
            join_type,
            table: table.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        })
    }

    pub fn inner(table: &str, left: &str, right: &str) -> Result<Self> {
        Self::new(JoinType::Inner, table, left, right)
    }

    pub fn left(table: &str, left: &str, right: &str) -> Result<Self> {
        Self::new(JoinType::Left, table, left, right)
    }

    pub fn to_sql(&self) -> String {
        format!(
            " {} {} ON {} = {}",
            self.join_type.to_sql(),
            quote_identifier(&self.table),
            quote_identifier(&self.left),
            quote_identifier(&self.right)
        )
    }
}
