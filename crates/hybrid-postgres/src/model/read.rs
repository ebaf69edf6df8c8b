//! Read path: single rows, lists, keyed maps and lazy field loading.

use std::collections::HashMap;
use tracing::instrument;

use super::{Lookup, Model};
use crate::query::{OrderBy, Select};
use crate::record::Record;
use crate::session::{DbHandle, Session};
use crate::types::Key;
use crate::{HybridError, Result};

/// Which of the requested fields [`Model::load_fields`] fetches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Refresh {
    /// Only those not already on the instance.
    #[default]
    Missing,
    /// All of them.
    All,
    /// All of them plus these.
    Also(Vec<String>),
}

impl Model {
    /// Projection onto `fields` when non-empty, else onto `default`, else every column.
    fn select(&self, fields: Option<&[String]>, default: &[String]) -> Result<Select> {
        let projection = fields.unwrap_or(default);
        for field in projection {
            self.table().check_column(field)?;
        }
        Select::new(self.table().name())?.columns(projection)
    }

    /// `lookup` with the primary key in its effective projection.
    pub(crate) fn keyed(&self, mut lookup: Lookup) -> Lookup {
        let pk = self.primary_key();
        if let Some(fields) = lookup.projection_mut() {
            if !fields.iter().any(|f| f == pk) {
                fields.push(pk.to_string());
            }
            return lookup;
        }
        let defaults = self.def().list_fields();
        if defaults.is_empty() || defaults.iter().any(|f| f == pk) {
            return lookup;
        }
        let mut fields = defaults.to_vec();
        fields.push(pk.to_string());
        lookup.fields(fields)
    }

    pub(crate) async fn fetch_one(&self, session: &mut dyn Session, lookup: &Lookup) -> Result<Option<Record>> {
        let conditions = lookup.conditions(self.primary_key());
        if conditions.is_empty() {
            return Err(HybridError::Validation(format!(
                "{}: a single-row lookup needs a key or a condition",
                self.name()
            )));
        }
        let stmt = self
            .select(lookup.projection(), self.def().one_fields())?
            .filters(conditions)
            .build()?;
        let row = session.fetch_optional(&stmt).await?;
        Ok(row.map(|row| Record::from_row(self.primary_key(), row)))
    }

    pub(crate) async fn fetch_list(&self, session: &mut dyn Session, lookup: &Lookup) -> Result<Vec<Record>> {
        let mut select = self
            .select(lookup.projection(), self.def().list_fields())?
            .filters(lookup.conditions(self.primary_key()));
        for join in lookup.joins() {
            select = select.join(join.clone());
        }
        for expr in lookup.sort_exprs() {
            select = select.order_by(OrderBy::parse(expr)?);
        }
        let (offset, limit) = lookup.paging();
        if let Some(offset) = offset {
            select = select.offset(offset);
        }
        if let Some(limit) = limit {
            select = select.limit(limit);
        }

        let rows = session.fetch_all(&select.build()?).await?;
        Ok(rows
            .into_iter()
            .map(|row| Record::from_row(self.primary_key(), row))
            .collect())
    }

    /// Exactly one record.
    ///
    /// `lookup` accepts a bare key (`model.get_one(7, None)`) or conditions.
    ///
    /// # Errors
    ///
    /// `NotFound` when nothing matches; `Validation` when `lookup` carries no
    /// condition at all.
    #[instrument(skip_all, fields(model = %self.name()))]
    pub async fn get_one(&self, lookup: impl Into<Lookup>, conn: Option<&mut dyn Session>) -> Result<Record> {
        let lookup = lookup.into();
        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        self.fetch_one(handle.session(), &lookup).await?.ok_or_else(|| {
            HybridError::NotFound(format!("{} matching {:?}", self.name(), lookup.conditions(self.primary_key())))
        })
    }

    /// Like [`get_one`](Model::get_one), with absence reported as `None`.
    #[instrument(skip_all, fields(model = %self.name()))]
    pub async fn find_one(&self, lookup: impl Into<Lookup>, conn: Option<&mut dyn Session>) -> Result<Option<Record>> {
        let lookup = lookup.into();
        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        self.fetch_one(handle.session(), &lookup).await
    }

    /// Records in result order.
    #[instrument(skip_all, fields(model = %self.name()))]
    pub async fn get_list(&self, lookup: impl Into<Lookup>, conn: Option<&mut dyn Session>) -> Result<Vec<Record>> {
        let lookup = lookup.into();
        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        self.fetch_list(handle.session(), &lookup).await
    }

    /// Records keyed by primary key.
    ///
    /// The primary key is added to the projection (explicit or the list
    /// default) when it lacks it.
    /// Membership filters with an empty set are dropped rather than matching
    /// nothing.
    #[instrument(skip_all, fields(model = %self.name()))]
    pub async fn get_dict(&self, lookup: impl Into<Lookup>, conn: Option<&mut dyn Session>) -> Result<HashMap<Key, Record>> {
        let lookup = self.keyed(lookup.into());
        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        let records = self.fetch_list(handle.session(), &lookup).await?;
        Ok(records
            .into_iter()
            .filter_map(|record| record.pk().map(|pk| (pk, record)))
            .collect())
    }

    /// Fetches `names` into `record` in place; see [`Refresh`].
    ///
    /// # Errors
    ///
    /// `Attribute` if `record` has no primary key, `NotFound` if its row is gone.
    #[instrument(skip_all, fields(model = %self.name()))]
    pub async fn load_fields(
        &self,
        record: &mut Record,
        names: &[&str],
        refresh: Refresh,
        conn: Option<&mut dyn Session>,
    ) -> Result<()> {
        let mut wanted: Vec<String> = Vec::with_capacity(names.len());
        let mut push = |name: &str| {
            if !wanted.iter().any(|w| w == name) {
                wanted.push(name.to_string());
            }
        };
        match &refresh {
            Refresh::Missing => names.iter().filter(|n| !record.contains(n)).for_each(|n| push(n)),
            Refresh::All => names.iter().for_each(|n| push(n)),
            Refresh::Also(extra) => {
                names.iter().for_each(|n| push(n));
                extra.iter().for_each(|n| push(n));
            }
        }
        if wanted.is_empty() {
            return Ok(());
        }

        let pk = self.require_pk(record)?;
        let lookup = Lookup::key(pk).fields(wanted);
        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        let fetched = self.fetch_one(handle.session(), &lookup).await?.ok_or_else(|| {
            HybridError::NotFound(format!("{} {:?} no longer exists", self.name(), record.pk()))
        })?;
        record.merge(fetched);
        Ok(())
    }
}
