//! SELECT, COUNT and SUM statements.

use super::helpers::{quote_identifier, validate_identifier};
use super::join::Join;
use super::predicate::{render_where, Predicate};
use super::statement::{Params, Statement};
use crate::{HybridError, Result, Value};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn asc(column: &str) -> Result<Self> {
        validate_identifier(column)?;
        Ok(Self { column: column.to_string(), direction: OrderDirection::Asc })
    }

    pub fn desc(column: &str) -> Result<Self> {
        validate_identifier(column)?;
        Ok(Self { column: column.to_string(), direction: OrderDirection::Desc })
    }

    /// Parses `col`, `-col`, `col asc` or `col desc`.
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if let Some(column) = expr.strip_prefix('-') {
            return Self::desc(column.trim());
        }

        let mut parts = expr.split_whitespace();
        let column = parts
            .next()
            .ok_or_else(|| HybridError::Query("Empty sort expression".to_string()))?;
        let direction = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => OrderDirection::Asc,
            Some("desc") => OrderDirection::Desc,
            Some(other) => {
                return Err(HybridError::Query(format!(
                    "Invalid sort direction '{}' in '{}'",
                    other, expr
                )))
            }
        };
        if parts.next().is_some() {
            return Err(HybridError::Query(format!("Invalid sort expression '{}'", expr)));
        }

        validate_identifier(column)?;
        Ok(Self { column: column.to_string(), direction })
    }

    fn to_sql(&self) -> String {
        format!("{} {}", quote_identifier(&self.column), self.direction.to_sql())
    }
}

/// Single-table SELECT with optional joins.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    table: String,
    columns: Vec<String>,
    joins: Vec<Join>,
    predicates: Vec<Predicate>,
    order_by: Vec<OrderBy>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl Select {
    pub fn new(table: &str) -> Result<Self> {
        validate_identifier(table)?;
        Ok(Self {
            table: table.to_string(),
            columns: Vec::new(),
            joins: Vec::new(),
            predicates: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        })
    }

    /// Projects onto the given columns of the table. Empty means every column.
    pub fn columns<I, S>(mut self, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for column in columns {
            let column = column.as_ref();
            validate_identifier(column)?;
            self.columns.push(column.to_string());
        }
        Ok(self)
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn filters(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.predicates.extend(predicates);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    fn from_clause(&self) -> String {
        let mut sql = format!(" FROM {}", quote_identifier(&self.table));
        for join in &self.joins {
            sql.push_str(&join.to_sql());
        }
        sql
    }

    fn projection(&self) -> String {
        let table = quote_identifier(&self.table);
        if self.columns.is_empty() {
            return format!("{}.*", table);
        }
        self.columns
            .iter()
            .map(|c| {
                if c.contains('.') {
                    quote_identifier(c)
                } else {
                    format!("{}.{}", table, quote_identifier(c))
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `SELECT <projection> FROM ... [WHERE] [ORDER BY] [LIMIT] [OFFSET]`
    pub fn build(&self) -> Result<Statement> {
        let mut params = Params::default();
        let mut sql = format!("SELECT {}{}", self.projection(), self.from_clause());
        sql.push_str(&render_where(&self.predicates, &mut params)?);

        if !self.order_by.is_empty() {
            let terms: Vec<String> = self.order_by.iter().map(OrderBy::to_sql).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", params.bind(Value::BigInt(limit))));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", params.bind(Value::BigInt(offset))));
        }

        Ok(params.finish(sql))
    }

    /// `SELECT COUNT(*) FROM ... [WHERE]`
    pub fn build_count(&self) -> Result<Statement> {
        let mut params = Params::default();
        let mut sql = format!("SELECT COUNT(*){}", self.from_clause());
        sql.push_str(&render_where(&self.predicates, &mut params)?);
        Ok(params.finish(sql))
    }

    /// `SELECT SUM(column) FROM ... [WHERE]`
    pub fn build_sum(&self, column: &str) -> Result<Statement> {
        validate_identifier(column)?;
        let mut params = Params::default();
        let mut sql = format!("SELECT SUM({}){}", quote_identifier(column), self.from_clause());
        sql.push_str(&render_where(&self.predicates, &mut params)?);
        Ok(params.finish(sql))
    }
}
