//! INSERT, UPDATE and DELETE statements.

use serde_json::Value as JsonValue;

use super::helpers::{quote_identifier, validate_identifier};
use super::predicate::{render_where, Predicate};
use super::statement::{Params, Statement};
use crate::{HybridError, Result, Value};

/// `INSERT INTO table (...) VALUES (...) [RETURNING col]`
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    table: String,
    values: Vec<(String, Value)>,
    returning: Option<String>,
}

impl Insert {
    pub fn new(table: &str) -> Result<Self> {
        validate_identifier(table)?;
        Ok(Self { table: table.to_string(), values: Vec::new(), returning: None })
    }

    pub fn values<I, S>(mut self, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        for (column, value) in values {
            let column = column.into();
            validate_identifier(&column)?;
            self.values.push((column, value));
        }
        Ok(self)
    }

    pub fn returning(mut self, column: &str) -> Result<Self> {
        validate_identifier(column)?;
        self.returning = Some(column.to_string());
        Ok(self)
    }

    pub fn build(&self) -> Result<Statement> {
        let mut params = Params::default();
        let table = quote_identifier(&self.table);

        let mut sql = if self.values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            let columns: Vec<String> = self.values.iter().map(|(c, _)| quote_identifier(c)).collect();
            let placeholders: Vec<String> = self
                .values
                .iter()
                .map(|(_, v)| params.bind(v.clone()))
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        if let Some(column) = &self.returning {
            sql.push_str(&format!(" RETURNING {}", quote_identifier(column)));
        }
        Ok(params.finish(sql))
    }
}

/// Right-hand side of one `SET` assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `col = $n`
    Value(Value),
    /// `col = col + $n`
    Increment(Value),
    /// `col = COALESCE(col, '{}'::jsonb) || $n::jsonb`, a shallow top-level merge
    JsonMerge(JsonValue),
}

/// `UPDATE table SET ... [WHERE] [RETURNING col]`
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    table: String,
    assignments: Vec<(String, Assignment)>,
    predicates: Vec<Predicate>,
    returning: Vec<String>,
}

impl Update {
    pub fn new(table: &str) -> Result<Self> {
        validate_identifier(table)?;
        Ok(Self {
            table: table.to_string(),
            assignments: Vec::new(),
            predicates: Vec::new(),
            returning: Vec::new(),
        })
    }

    pub fn assign(mut self, column: &str, assignment: Assignment) -> Result<Self> {
        validate_identifier(column)?;
        self.assignments.push((column.to_string(), assignment));
        Ok(self)
    }

    pub fn set(self, column: &str, value: impl Into<Value>) -> Result<Self> {
        self.assign(column, Assignment::Value(value.into()))
    }

    pub fn increment(self, column: &str, delta: impl Into<Value>) -> Result<Self> {
        self.assign(column, Assignment::Increment(delta.into()))
    }

    pub fn json_merge(self, column: &str, patch: JsonValue) -> Result<Self> {
        self.assign(column, Assignment::JsonMerge(patch))
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn filters(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.predicates.extend(predicates);
        self
    }

    /// Adds a column to the RETURNING list. May be called repeatedly.
    pub fn returning(mut self, column: &str) -> Result<Self> {
        validate_identifier(column)?;
        self.returning.push(column.to_string());
        Ok(self)
    }

    pub fn build(&self) -> Result<Statement> {
        if self.assignments.is_empty() {
            return Err(HybridError::Query(format!(
                "Cannot update '{}' with no values",
                self.table
            )));
        }

        let mut params = Params::default();
        let set_parts: Vec<String> = self
            .assignments
            .iter()
            .map(|(column, assignment)| {
                let col = quote_identifier(column);
                match assignment {
                    Assignment::Value(v) => format!("{} = {}", col, params.bind(v.clone())),
                    Assignment::Increment(delta) => {
                        format!("{} = {} + {}", col, col, params.bind(delta.clone()))
                    }
                    Assignment::JsonMerge(patch) => format!(
                        "{} = COALESCE({}, '{{}}'::jsonb) || {}::jsonb",
                        col,
                        col,
                        params.bind(Value::Json(patch.clone()))
                    ),
                }
            })
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {}",
            quote_identifier(&self.table),
            set_parts.join(", ")
        );
        sql.push_str(&render_where(&self.predicates, &mut params)?);
        if !self.returning.is_empty() {
            let columns: Vec<String> = self.returning.iter().map(|c| quote_identifier(c)).collect();
            sql.push_str(&format!(" RETURNING {}", columns.join(", ")));
        }
        Ok(params.finish(sql))
    }
}

/// `DELETE FROM table [WHERE]`
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    table: String,
    predicates: Vec<Predicate>,
}

impl Delete {
    pub fn new(table: &str) -> Result<Self> {
        validate_identifier(table)?;
        Ok(Self { table: table.to_string(), predicates: Vec::new() })
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn filters(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.predicates.extend(predicates);
        self
    }

    pub fn build(&self) -> Result<Statement> {
        let mut params = Params::default();
        let mut sql = format!("DELETE FROM {}", quote_identifier(&self.table));
        sql.push_str(&render_where(&self.predicates, &mut params)?);
        Ok(params.finish(sql))
    }
}
