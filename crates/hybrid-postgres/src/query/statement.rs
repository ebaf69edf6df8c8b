//! Compiled statements.

use sha2::{Digest, Sha256};
use sqlx::postgres::PgArguments;
use std::fmt;

use super::helpers::rewrite_placeholders;
use crate::{Result, Value};

/// SQL text with `$n` placeholders and the values bound to them.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self { sql: sql.into(), params }
    }

    /// Statement text with every placeholder replaced by its literal value.
    pub fn to_literal_sql(&self) -> String {
        rewrite_placeholders(&self.sql, |num| match num.checked_sub(1).and_then(|i| self.params.get(i)) {
            Some(value) => value.to_sql_literal(),
            None => format!("${}", num),
        })
    }

    /// Stable hex digest of the literal statement text.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_literal_sql().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Binds the parameters into a sqlx argument list.
    pub fn arguments(&self) -> Result<PgArguments> {
        let mut arguments = PgArguments::default();
        for value in &self.params {
            value.bind_to_arguments(&mut arguments)?;
        }
        Ok(arguments)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal_sql())
    }
}

/// Parameter accumulator used while rendering a statement.
#[derive(Debug, Default)]
pub(crate) struct Params {
    values: Vec<Value>,
}

impl Params {
    /// Adds a value and returns its placeholder.
    ///
    /// NULL is rendered inline so it adopts the target column's type.
    pub(crate) fn bind(&mut self, value: Value) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        self.values.push(value);
        format!("${}", self.values.len())
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    pub(crate) fn extend(&mut self, values: Vec<Value>) {
        self.values.extend(values);
    }

    pub(crate) fn finish(self, sql: String) -> Statement {
        Statement { sql, params: self.values }
    }
}
