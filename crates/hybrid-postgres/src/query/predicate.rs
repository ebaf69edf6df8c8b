//! WHERE-clause predicates.

use super::helpers::{adjust_param_indices, quote_identifier, validate_identifier};
use super::statement::Params;
use crate::{Result, Value};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Gte,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Lte,
    /// LIKE pattern matching
    Like,
    /// ILIKE case-insensitive pattern matching
    ILike,
}

impl Operator {
    pub fn to_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::ILike => "ILIKE",
        }
    }
}

/// A boolean condition over columns.
///
/// Multiple predicates handed to one operation are combined with AND.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare { column: String, op: Operator, value: Value },
    /// Membership; an empty set matches nothing
    In { column: String, values: Vec<Value> },
    IsNull(String),
    IsNotNull(String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Hand-written SQL with its own `$1..$n` placeholders
    Raw { sql: String, params: Vec<Value> },
}

impl Predicate {
    pub fn compare(column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Predicate::Compare { column: column.into(), op, value: value.into() }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Ne, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Gte, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Lte, value)
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(column, Operator::Like, pattern.into())
    }

    /// Membership test. Integer widths are unified so the set binds as one array type.
    pub fn is_in<I, T>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let values = values
            .into_iter()
            .map(|v| match v.into() {
                Value::SmallInt(i) => Value::BigInt(i as i64),
                Value::Int(i) => Value::BigInt(i as i64),
                other => other,
            })
            .collect();
        Predicate::In { column: column.into(), values }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Predicate::IsNull(column.into())
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Predicate::IsNotNull(column.into())
    }

    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Predicate::Raw { sql: sql.into(), params }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut items) => {
                items.push(other);
                Predicate::And(items)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut items) => {
                items.push(other);
                Predicate::Or(items)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    pub(crate) fn render(&self, params: &mut Params) -> Result<String> {
        match self {
            Predicate::Compare { column, op, value } => {
                validate_identifier(column)?;
                let col = quote_identifier(column);
                match (op, value.is_null()) {
                    (Operator::Eq, true) => Ok(format!("{} IS NULL", col)),
                    (Operator::Ne, true) => Ok(format!("{} IS NOT NULL", col)),
                    _ => Ok(format!("{} {} {}", col, op.to_sql(), params.bind(value.clone()))),
                }
            }
            Predicate::In { column, values } => {
                validate_identifier(column)?;
                if values.is_empty() {
                    return Ok("FALSE".to_string());
                }
                let placeholder = params.bind(Value::Array(values.clone()));
                Ok(format!("{} = ANY({})", quote_identifier(column), placeholder))
            }
            Predicate::IsNull(column) => {
                validate_identifier(column)?;
                Ok(format!("{} IS NULL", quote_identifier(column)))
            }
            Predicate::IsNotNull(column) => {
                validate_identifier(column)?;
                Ok(format!("{} IS NOT NULL", quote_identifier(column)))
            }
            Predicate::And(items) => render_group(items, " AND ", "TRUE", params),
            Predicate::Or(items) => render_group(items, " OR ", "FALSE", params),
            Predicate::Not(inner) => Ok(format!("NOT ({})", inner.render(params)?)),
            Predicate::Raw { sql, params: raw_params } => {
                let shifted = adjust_param_indices(sql, params.len());
                params.extend(raw_params.clone());
                Ok(format!("({})", shifted))
            }
        }
    }
}

fn render_group(items: &[Predicate], sep: &str, empty: &str, params: &mut Params) -> Result<String> {
    if items.is_empty() {
        return Ok(empty.to_string());
    }
    let parts = items
        .iter()
        .map(|p| p.render(params))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", parts.join(sep)))
}

/// Renders a WHERE clause (with leading space) for predicates combined by AND.
pub(crate) fn render_where(predicates: &[Predicate], params: &mut Params) -> Result<String> {
    if predicates.is_empty() {
        return Ok(String::new());
    }
    let parts = predicates
        .iter()
        .map(|p| p.render(params))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(" WHERE {}", parts.join(" AND ")))
}
