//! Many-to-many traversal through a join table.
//!
//! A [`ManyToManyDef`] names the join record type, the target record type and
//! the two join columns. Binding it for an application yields a
//! [`ManyToMany`] resolver that runs two dependent queries: join rows for the
//! source keys, then the target rows they point at.

use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

use crate::model::{Lookup, Model};
use crate::query::{Delete, Predicate};
use crate::record::Record;
use crate::schema::Table;
use crate::session::{DbHandle, Session};
use crate::types::Key;
use crate::{HybridError, Result};

/// Unbound many-to-many relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct ManyToManyDef {
    /// Registry name of the join record type.
    pub join_model: String,
    /// Table used when no join record type is declared under `join_model`.
    pub join_table: Table,
    /// Registry name of the target record type.
    pub target: String,
    /// Join column holding the source key.
    pub source_column: String,
    /// Join column holding the target key.
    pub target_column: String,
}

/// One source key or several.
#[derive(Debug, Clone, PartialEq)]
pub enum Sources {
    One(Key),
    Many(Vec<Key>),
}

macro_rules! sources_from_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Sources {
                fn from(key: $ty) -> Self {
                    Sources::One(key.into())
                }
            }
        )*
    };
}

sources_from_key!(i32, i64, &str, String, Uuid, Key);

impl From<Vec<Key>> for Sources {
    fn from(keys: Vec<Key>) -> Self {
        Sources::Many(keys)
    }
}

impl Sources {
    pub fn many<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Sources::Many(keys.into_iter().map(Into::into).collect())
    }
}

/// A many-to-many relationship bound to one application.
#[derive(Debug, Clone)]
pub struct ManyToMany {
    join: Model,
    target: Model,
    source_column: String,
    target_column: String,
}

impl ManyToMany {
    pub fn new(join: Model, target: Model, source_column: impl Into<String>, target_column: impl Into<String>) -> Self {
        Self {
            join,
            target,
            source_column: source_column.into(),
            target_column: target_column.into(),
        }
    }

    pub fn join_model(&self) -> &Model {
        &self.join
    }

    pub fn target_model(&self) -> &Model {
        &self.target
    }

    pub fn source_column(&self) -> &str {
        &self.source_column
    }

    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    /// Membership for a set (an empty set matches nothing), equality otherwise.
    fn source_predicate(&self, sources: Sources) -> Predicate {
        match sources {
            Sources::One(key) => Predicate::eq(self.source_column.clone(), key),
            Sources::Many(keys) => Predicate::is_in(self.source_column.clone(), keys),
        }
    }

    fn link_key(&self, link: &Record, column: &str) -> Result<Key> {
        link.get(column).and_then(Key::from_value).ok_or_else(|| {
            HybridError::Attribute(format!(
                "join row of '{}' has no key in '{}'",
                self.join.name(),
                column
            ))
        })
    }

    async fn links(&self, session: &mut dyn Session, sources: Sources) -> Result<Vec<Record>> {
        let lookup = Lookup::all().filter(self.source_predicate(sources));
        self.join.fetch_list(session, &lookup).await
    }

    async fn targets(&self, session: &mut dyn Session, links: &[Record]) -> Result<Vec<Record>> {
        let ids = links
            .iter()
            .map(|link| self.link_key(link, &self.target_column))
            .collect::<Result<Vec<_>>>()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let lookup = self.target.keyed(Lookup::all().filter(Predicate::is_in(self.target.primary_key(), ids)));
        self.target.fetch_list(session, &lookup).await
    }

    /// Target records linked to `source`, in no particular order.
    #[instrument(skip_all, fields(join = %self.join.name(), target = %self.target.name()))]
    pub async fn resolve_one(&self, source: impl Into<Key>, conn: Option<&mut dyn Session>) -> Result<Vec<Record>> {
        let mut handle = DbHandle::resolve(self.join.app().db(), conn).await?;
        let links = self.links(handle.session(), Sources::One(source.into())).await?;
        self.targets(handle.session(), &links).await
    }

    /// Target records per source key.
    ///
    /// Each list follows join-row order and keeps duplicates. Source keys
    /// without join rows are absent from the map.
    ///
    /// # Errors
    ///
    /// `NotFound` when a join row points at a target that no longer exists.
    #[instrument(skip_all, fields(join = %self.join.name(), target = %self.target.name()))]
    pub async fn resolve_many<I, K>(&self, sources: I, conn: Option<&mut dyn Session>) -> Result<HashMap<Key, Vec<Record>>>
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        let sources = Sources::many(sources);
        let mut handle = DbHandle::resolve(self.join.app().db(), conn).await?;
        let links = self.links(handle.session(), sources).await?;
        let targets: HashMap<Key, Record> = self
            .targets(handle.session(), &links)
            .await?
            .into_iter()
            .filter_map(|record| record.pk().map(|pk| (pk, record)))
            .collect();

        let mut result: HashMap<Key, Vec<Record>> = HashMap::new();
        for link in &links {
            let source = self.link_key(link, &self.source_column)?;
            let target_key = self.link_key(link, &self.target_column)?;
            let target = targets.get(&target_key).ok_or_else(|| {
                HybridError::NotFound(format!("{} {} linked from {}", self.target.name(), target_key, source))
            })?;
            result.entry(source).or_default().push(target.clone());
        }
        Ok(result)
    }

    /// Deletes the join rows of `sources`; the number removed.
    #[instrument(skip_all, fields(join = %self.join.name()))]
    pub async fn unlink(&self, sources: impl Into<Sources>, conn: Option<&mut dyn Session>) -> Result<u64> {
        let stmt = Delete::new(self.join.table().name())?
            .filter(self.source_predicate(sources.into()))
            .build()?;
        let mut handle = DbHandle::resolve(self.join.app().db(), conn).await?;
        handle.session().execute(&stmt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_from_key() {
        assert_eq!(Sources::from(3), Sources::One(Key::Int(3)));
        assert_eq!(Sources::many(["a", "b"]), Sources::Many(vec![Key::from("a"), Key::from("b")]));
    }
}
