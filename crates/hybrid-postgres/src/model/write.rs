//! Write path: inserts, saves, in-place updates and deletes.

use serde_json::{Map, Value as JsonValue};
use tracing::{debug, error, instrument};

use super::{Lookup, Model};
use crate::query::{Delete, Insert, Predicate, Update};
use crate::record::Record;
use crate::session::{DbHandle, Session};
use crate::types::Key;
use crate::{HybridError, Result, Value};

/// A JSON merge applied by [`Model::update_json`].
///
/// Each column is merged shallowly: keys at the top level of the patch
/// replace the stored ones, everything below them is replaced wholesale.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonPatch {
    /// `value` wrapped in one single-key object per path segment, innermost
    /// first, then merged into `field`.
    Path { field: String, path: Vec<String>, value: JsonValue },
    /// Column to fragment pairs, each merged as given.
    Fields(Vec<(String, JsonValue)>),
}

impl JsonPatch {
    /// `JsonPatch::at("meta", ["color"], json!("red"))` merges `{"color": "red"}` into `meta`.
    pub fn at<I, S>(field: impl Into<String>, path: I, value: JsonValue) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        JsonPatch::Path {
            field: field.into(),
            path: path.into_iter().map(Into::into).collect(),
            value,
        }
    }

    /// Merges `value` at the top level of `field`.
    pub fn merge(field: impl Into<String>, value: JsonValue) -> Self {
        JsonPatch::Path { field: field.into(), path: Vec::new(), value }
    }

    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, JsonValue)>,
        S: Into<String>,
    {
        JsonPatch::Fields(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Column and fragment pairs.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty field name or an empty field list.
    pub fn into_merges(self) -> Result<Vec<(String, JsonValue)>> {
        match self {
            JsonPatch::Path { field, path, value } => {
                if field.is_empty() {
                    return Err(HybridError::Validation("JSON patch needs a field".to_string()));
                }
                let fragment = path.into_iter().rev().fold(value, |inner, segment| {
                    let mut wrapped = Map::new();
                    wrapped.insert(segment, inner);
                    JsonValue::Object(wrapped)
                });
                Ok(vec![(field, fragment)])
            }
            JsonPatch::Fields(fields) if fields.is_empty() => Err(HybridError::Validation(
                "JSON patch needs a path or at least one field".to_string(),
            )),
            JsonPatch::Fields(fields) => Ok(fields),
        }
    }
}

impl Model {
    /// `INSERT ... RETURNING pk`; the generated key.
    async fn insert_returning_pk(&self, session: &mut dyn Session, record: &Record) -> Result<Key> {
        let stmt = Insert::new(self.table().name())?
            .values(record.iter().map(|(k, v)| (k.to_string(), v.clone())))?
            .returning(self.primary_key())?
            .build()?;
        let value = session.scalar(&stmt).await?;
        Key::from_value(&value).ok_or_else(|| {
            HybridError::Query(format!(
                "insert into '{}' returned no usable primary key ({})",
                self.table().name(),
                value.pg_type_name()
            ))
        })
    }

    pub(crate) async fn create_in(&self, session: &mut dyn Session, data: Record) -> Result<Record> {
        let mut record = self.adopt(data);
        self.def().apply_defaults(&mut record);
        let pk = self.insert_returning_pk(session, &record).await?;
        debug!(model = %self.name(), pk = %pk, "Inserted record");
        record.set_pk(pk);
        Ok(record)
    }

    /// Inserts one row and returns the instance with its generated key.
    #[instrument(skip_all, fields(model = %self.name()))]
    pub async fn create(&self, data: Record, conn: Option<&mut dyn Session>) -> Result<Record> {
        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        self.create_in(handle.session(), data).await
    }

    /// Inserts each object in turn on one connection.
    #[instrument(skip_all, fields(model = %self.name(), count = objects.len()))]
    pub async fn create_many(&self, objects: Vec<Record>, conn: Option<&mut dyn Session>) -> Result<Vec<Record>> {
        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        let mut created = Vec::with_capacity(objects.len());
        for data in objects {
            created.push(self.create_in(handle.session(), data).await?);
        }
        Ok(created)
    }

    pub(crate) async fn save_in(
        &self,
        session: &mut dyn Session,
        record: &mut Record,
        fields: Option<&[&str]>,
    ) -> Result<Key> {
        record.set_primary_key_name(self.primary_key());
        self.def().apply_defaults(record);

        let existing = match record.pk() {
            Some(pk) => self.fetch_one(session, &Lookup::key(pk)).await?,
            None => None,
        };
        if existing.is_none() {
            let pk = self.insert_returning_pk(session, record).await?;
            debug!(model = %self.name(), pk = %pk, "Saved new record");
            record.set_pk(pk.clone());
            return Ok(pk);
        }

        let pk = self.require_pk(record)?;
        let values: Vec<(&str, &Value)> = match fields.filter(|f| !f.is_empty()) {
            Some(fields) => {
                let permanent = self.def().permanent_fields();
                record
                    .iter()
                    .filter(|(k, _)| fields.contains(k) || permanent.iter().any(|p| p.as_str() == *k))
                    .collect()
            }
            None if !self.def().readonly_fields().is_empty() => {
                let readonly = self.def().readonly_fields();
                record
                    .iter()
                    .filter(|(k, _)| !readonly.iter().any(|r| r.as_str() == *k))
                    .collect()
            }
            None => record.iter().collect(),
        };

        let mut update = Update::new(self.table().name())?;
        for (column, value) in values {
            update = update.set(column, value.clone())?;
        }
        let stmt = update
            .filter(Predicate::eq(self.primary_key(), pk.clone()))
            .returning(self.primary_key())?
            .build()?;

        let returned = session.scalar(&stmt).await?;
        if Key::from_value(&returned).as_ref() != Some(&pk) {
            error!(model = %self.name(), expected = %pk, returned = ?returned, "Update touched an unexpected row");
            return Err(HybridError::Integrity(format!(
                "{}: update of {} returned {}",
                self.name(),
                pk,
                returned.to_sql_literal()
            )));
        }
        debug!(model = %self.name(), pk = %pk, "Updated record");
        Ok(pk)
    }

    /// Inserts or updates `record` and returns its primary key.
    ///
    /// An instance without a key, or whose key has no row, is inserted.
    /// Otherwise the update writes `fields` plus the permanent fields when
    /// `fields` is given, every field except the read-only ones when the type
    /// declares any, and every field otherwise.
    ///
    /// # Errors
    ///
    /// `Integrity` when the update reports a different key than the
    /// instance's. This is not recoverable and must not be retried.
    #[instrument(skip_all, fields(model = %self.name()))]
    pub async fn save(&self, record: &mut Record, fields: Option<&[&str]>, conn: Option<&mut dyn Session>) -> Result<Key> {
        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        self.save_in(handle.session(), record, fields).await
    }

    /// `col = col + delta` for each pair in `deltas`, in one statement.
    ///
    /// The stored results are copied back onto `record`.
    #[instrument(skip_all, fields(model = %self.name()))]
    pub async fn update_increment(&self, record: &mut Record, deltas: Record, conn: Option<&mut dyn Session>) -> Result<()> {
        let pk = self.require_pk(record)?;
        let mut update = Update::new(self.table().name())?;
        for (column, delta) in deltas.iter() {
            update = update.increment(column, delta.clone())?.returning(column)?;
        }
        let stmt = update.filter(Predicate::eq(self.primary_key(), pk)).build()?;

        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        if let Some(row) = handle.session().fetch_optional(&stmt).await? {
            record.merge_row(row);
        }
        Ok(())
    }

    /// Sets `values` on every row matching `filter`; the number of rows touched.
    #[instrument(skip_all, fields(model = %self.name()))]
    pub async fn update_fields(&self, filter: Predicate, values: Record, conn: Option<&mut dyn Session>) -> Result<u64> {
        let mut update = Update::new(self.table().name())?;
        for (column, value) in values.iter() {
            update = update.set(column, value.clone())?;
        }
        let stmt = update.filter(filter).build()?;

        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        handle.session().execute(&stmt).await
    }

    /// `col = COALESCE(col, '{}') || fragment` for each merge in `patch`.
    ///
    /// The merged documents are copied back onto `record`.
    #[instrument(skip_all, fields(model = %self.name()))]
    pub async fn update_json(&self, record: &mut Record, patch: JsonPatch, conn: Option<&mut dyn Session>) -> Result<()> {
        let merges = patch.into_merges()?;
        let pk = self.require_pk(record)?;
        let mut update = Update::new(self.table().name())?;
        for (column, fragment) in merges {
            update = update.json_merge(&column, fragment)?.returning(&column)?;
        }
        let stmt = update.filter(Predicate::eq(self.primary_key(), pk)).build()?;

        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        if let Some(row) = handle.session().fetch_optional(&stmt).await? {
            record.merge_row(row);
        }
        Ok(())
    }

    /// Deletes every row matching `lookup`.
    ///
    /// # Errors
    ///
    /// `Validation` when `lookup` has no condition; an unconditional delete
    /// is never issued.
    #[instrument(skip_all, fields(model = %self.name()))]
    pub async fn delete_where(&self, lookup: impl Into<Lookup>, conn: Option<&mut dyn Session>) -> Result<u64> {
        let conditions = lookup.into().conditions(self.primary_key());
        if conditions.is_empty() {
            return Err(HybridError::Validation(format!(
                "{}: delete needs a key or a condition",
                self.name()
            )));
        }
        let stmt = Delete::new(self.table().name())?.filters(conditions).build()?;
        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        handle.session().execute(&stmt).await
    }

    /// Deletes the row behind `record`. The instance itself stays usable.
    #[instrument(skip_all, fields(model = %self.name()))]
    pub async fn delete(&self, record: &Record, conn: Option<&mut dyn Session>) -> Result<u64> {
        let pk = self.require_pk(record)?;
        let stmt = Delete::new(self.table().name())?
            .filter(Predicate::eq(self.primary_key(), pk))
            .build()?;
        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        handle.session().execute(&stmt).await
    }

    /// Returns `(record, false)` for an existing match, else inserts
    /// `defaults` and returns `(record, true)`.
    ///
    /// The lookup runs when `lookup` has conditions, or on the primary key
    /// when `defaults` carries one. Check and insert are separate statements;
    /// a concurrent identical insert surfaces as a `Conflict` from the
    /// unique constraint.
    #[instrument(skip_all, fields(model = %self.name()))]
    pub async fn get_or_create(
        &self,
        lookup: impl Into<Lookup>,
        defaults: Record,
        conn: Option<&mut dyn Session>,
    ) -> Result<(Record, bool)> {
        let lookup = lookup.into();
        let defaults = self.adopt(defaults);
        let lookup = if lookup.has_conditions() {
            Some(lookup)
        } else {
            defaults.pk().map(Lookup::key)
        };

        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        if let Some(lookup) = lookup {
            if let Some(found) = self.fetch_one(handle.session(), &lookup).await? {
                return Ok((found, false));
            }
        }

        let pk = self.insert_returning_pk(handle.session(), &defaults).await?;
        let mut record = defaults;
        record.set_pk(pk);
        Ok((record, true))
    }
}
