//! Lookup arguments shared by the read, delete and aggregate operations.

use uuid::Uuid;

use crate::query::{Join, Predicate};
use crate::types::Key;
use crate::Value;

/// Primary-key condition.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyFilter {
    One(Key),
    /// Membership. An empty set adds no condition.
    Any(Vec<Key>),
}

/// Named equality filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Match {
    Eq(Value),
    /// Membership. An empty set adds no condition, unlike an empty
    /// [`Predicate::is_in`], which matches nothing.
    Any(Vec<Value>),
}

/// What to read and how: conditions, projection, paging, order and extra
/// join sources.
///
/// Conditions are combined with AND in this order: key, named matches,
/// explicit predicates. Operations that address a single row ignore paging
/// and order.
///
/// ```ignore
/// let adults = Lookup::all()
///     .filter(Predicate::gte("age", 18))
///     .matching_any("city", ["Oslo", "Bergen"])
///     .sort("-created")
///     .limit(20);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lookup {
    key: Option<KeyFilter>,
    matching: Vec<(String, Match)>,
    predicates: Vec<Predicate>,
    fields: Option<Vec<String>>,
    offset: Option<i64>,
    limit: Option<i64>,
    sort: Vec<String>,
    joins: Vec<Join>,
}

impl Lookup {
    /// No conditions.
    pub fn all() -> Self {
        Self::default()
    }

    /// Primary-key equality.
    pub fn key(key: impl Into<Key>) -> Self {
        Self { key: Some(KeyFilter::One(key.into())), ..Self::default() }
    }

    /// Primary-key membership; an empty set is no condition at all.
    pub fn keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Self {
            key: Some(KeyFilter::Any(keys.into_iter().map(Into::into).collect())),
            ..Self::default()
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn filters(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.predicates.extend(predicates);
        self
    }

    /// `column = value`.
    pub fn matching(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.matching.push((column.into(), Match::Eq(value.into())));
        self
    }

    /// `column IN (values)`, skipped when `values` is empty.
    pub fn matching_any<I, T>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.matching.push((column.into(), Match::Any(values)));
        self
    }

    /// Projection. An empty list falls back to the model's default.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Appends a sort expression: `col`, `-col`, `col asc` or `col desc`.
    pub fn sort(mut self, expr: impl Into<String>) -> Self {
        self.sort.push(expr.into());
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// True when at least one condition would be rendered.
    pub fn has_conditions(&self) -> bool {
        let key = match &self.key {
            Some(KeyFilter::One(_)) => true,
            Some(KeyFilter::Any(keys)) => !keys.is_empty(),
            None => false,
        };
        let matching = self.matching.iter().any(|(_, m)| match m {
            Match::Eq(_) => true,
            Match::Any(values) => !values.is_empty(),
        });
        key || matching || !self.predicates.is_empty()
    }

    /// Conditions as predicates, keyed on `primary_key`.
    pub fn conditions(&self, primary_key: &str) -> Vec<Predicate> {
        let mut out = Vec::with_capacity(1 + self.matching.len() + self.predicates.len());
        match &self.key {
            Some(KeyFilter::One(key)) => out.push(Predicate::eq(primary_key, key.clone())),
            Some(KeyFilter::Any(keys)) if !keys.is_empty() => {
                out.push(Predicate::is_in(primary_key, keys.iter().cloned()))
            }
            _ => {}
        }
        for (column, m) in &self.matching {
            match m {
                Match::Eq(value) => out.push(Predicate::eq(column.clone(), value.clone())),
                Match::Any(values) if !values.is_empty() => {
                    out.push(Predicate::is_in(column.clone(), values.iter().cloned()))
                }
                Match::Any(_) => {}
            }
        }
        out.extend(self.predicates.iter().cloned());
        out
    }

    pub fn projection(&self) -> Option<&[String]> {
        self.fields.as_deref().filter(|f| !f.is_empty())
    }

    pub(crate) fn projection_mut(&mut self) -> Option<&mut Vec<String>> {
        self.fields.as_mut().filter(|f| !f.is_empty())
    }

    pub(crate) fn paging(&self) -> (Option<i64>, Option<i64>) {
        (self.offset, self.limit)
    }

    pub(crate) fn sort_exprs(&self) -> &[String] {
        &self.sort
    }

    pub(crate) fn joins(&self) -> &[Join] {
        &self.joins
    }
}

macro_rules! lookup_from_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Lookup {
                fn from(v: $ty) -> Self {
                    Lookup::key(v)
                }
            }
        )*
    };
}

lookup_from_key!(i32, i64, &str, String, Uuid, Key);

impl From<Predicate> for Lookup {
    fn from(p: Predicate) -> Self {
        Lookup::all().filter(p)
    }
}

impl From<Vec<Predicate>> for Lookup {
    fn from(ps: Vec<Predicate>) -> Self {
        Lookup::all().filters(ps)
    }
}
