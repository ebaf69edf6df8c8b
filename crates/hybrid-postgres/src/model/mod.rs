//! Record types and the record engine.
//!
//! A [`ModelDef`] describes one record type: its table, primary key, default
//! projections, save rules, validators and many-to-many relationships. It
//! holds no connection state. Binding a definition to an [`AppContext`]
//! yields a [`Model`], the handle every engine operation runs on.
//!
//! # Architecture
//!
//! ```text
//! ModelRegistry (declared ModelDefs, by normalized name)
//!           |
//!      AppModels::bind  ->  Model (def + AppContext + resolvers)
//!           |
//!   read / write / aggregate / validation operations
//!           |
//!   Statement  ->  Session (caller's or pooled)   CacheStore (aggregates)
//! ```
//!
//! Every operation takes an optional session. Without one, a pooled
//! connection is acquired for that call and released when it returns.

mod aggregate;
mod lookup;
mod read;
mod validation;
mod write;

pub use aggregate::{CountOptions, SumOptions};
pub use lookup::{KeyFilter, Lookup, Match};
pub use read::Refresh;
pub use validation::validators;
pub use write::JsonPatch;

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::app::AppContext;
use crate::record::{Record, DEFAULT_PRIMARY_KEY};
use crate::relationship::{ManyToMany, ManyToManyDef};
use crate::schema::{DerivedSchema, Table};
use crate::{HybridError, Result};
use hybrid_common::normalize_model_name;

/// Transforms raw input data; runs in declaration order.
pub type Validator = Arc<dyn Fn(&ModelDef, Record) -> Result<Record> + Send + Sync>;

/// Receives the current instance and the incoming data.
pub type UpdateValidator = Arc<dyn Fn(&ModelDef, &Record, Record) -> Result<Record> + Send + Sync>;

/// Fills type-level defaults in place before an insert or save.
pub type DefaultsHook = Arc<dyn Fn(&ModelDef, &mut Record) + Send + Sync>;

/// Declaration of a record type.
#[derive(Clone)]
pub struct ModelDef {
    name: String,
    table: Table,
    primary_key: String,
    fields_permanent: Vec<String>,
    fields_readonly: Vec<String>,
    fields_list: Vec<String>,
    fields_one: Vec<String>,
    validators: Vec<Validator>,
    update_validators: Vec<UpdateValidator>,
    defaults: Option<DefaultsHook>,
    relationships: BTreeMap<String, ManyToManyDef>,
}

impl fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDef")
            .field("name", &self.name)
            .field("table", &self.table.name())
            .field("primary_key", &self.primary_key)
            .field("validators", &self.validators.len())
            .field("update_validators", &self.update_validators.len())
            .field("relationships", &self.relationships.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModelDef {
    /// A record type named `name` (any casing, e.g. `OrderItem`) over `table`.
    pub fn new(name: impl Into<String>, table: Table) -> Self {
        Self {
            name: name.into(),
            table,
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            fields_permanent: Vec::new(),
            fields_readonly: Vec::new(),
            fields_list: Vec::new(),
            fields_one: Vec::new(),
            validators: Vec::new(),
            update_validators: Vec::new(),
            defaults: None,
            relationships: BTreeMap::new(),
        }
    }

    /// A record type over a derived table, carrying its relationships.
    pub fn from_schema(name: impl Into<String>, schema: DerivedSchema) -> Self {
        let mut def = Self::new(name, schema.table);
        def.relationships = schema.relationships;
        def
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Columns always written by a partial save.
    pub fn fields_permanent<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields_permanent = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Columns never written by a full save.
    pub fn fields_readonly<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields_readonly = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Default projection of list reads.
    pub fn fields_list<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields_list = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Default projection of single-row reads.
    pub fn fields_one<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields_one = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&ModelDef, Record) -> Result<Record> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(f));
        self
    }

    pub fn update_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&ModelDef, &Record, Record) -> Result<Record> + Send + Sync + 'static,
    {
        self.update_validators.push(Arc::new(f));
        self
    }

    pub fn with_defaults<F>(mut self, f: F) -> Self
    where
        F: Fn(&ModelDef, &mut Record) + Send + Sync + 'static,
    {
        self.defaults = Some(Arc::new(f));
        self
    }

    pub fn relationship(mut self, name: impl Into<String>, def: ManyToManyDef) -> Self {
        self.relationships.insert(name.into(), def);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry key.
    pub fn key(&self) -> String {
        normalize_model_name(&self.name)
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn primary_key_name(&self) -> &str {
        &self.primary_key
    }

    pub fn permanent_fields(&self) -> &[String] {
        &self.fields_permanent
    }

    pub fn readonly_fields(&self) -> &[String] {
        &self.fields_readonly
    }

    pub fn list_fields(&self) -> &[String] {
        &self.fields_list
    }

    pub fn one_fields(&self) -> &[String] {
        &self.fields_one
    }

    pub fn relationships(&self) -> &BTreeMap<String, ManyToManyDef> {
        &self.relationships
    }

    pub(crate) fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub(crate) fn update_validators(&self) -> &[UpdateValidator] {
        &self.update_validators
    }

    pub(crate) fn apply_defaults(&self, record: &mut Record) {
        if let Some(hook) = &self.defaults {
            hook(self, record);
        }
    }

    /// Empty instance keyed on this type's primary key.
    pub fn new_record(&self) -> Record {
        Record::with_primary_key(self.primary_key.clone())
    }
}

struct Bound {
    def: Arc<ModelDef>,
    app: AppContext,
    relations: RwLock<BTreeMap<String, ManyToMany>>,
}

/// A record type bound to one application.
///
/// Cheap to clone; clones share the binding and its resolvers.
#[derive(Clone)]
pub struct Model {
    inner: Arc<Bound>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.inner.def.name)
            .field("app", &self.inner.app.name())
            .field("relations", &self.inner.relations.read().keys().cloned().collect::<Vec<_>>())
            .finish()
    }
}

impl Model {
    /// Binds a definition directly, without a registry. Relationships are not
    /// resolved; use [`AppModels::bind`](crate::AppModels::bind) for that.
    pub fn bind(def: Arc<ModelDef>, app: AppContext) -> Self {
        Self {
            inner: Arc::new(Bound { def, app, relations: RwLock::new(BTreeMap::new()) }),
        }
    }

    pub fn def(&self) -> &ModelDef {
        &self.inner.def
    }

    pub fn name(&self) -> &str {
        &self.inner.def.name
    }

    pub fn table(&self) -> &Table {
        &self.inner.def.table
    }

    pub fn primary_key(&self) -> &str {
        &self.inner.def.primary_key
    }

    pub fn app(&self) -> &AppContext {
        &self.inner.app
    }

    pub fn new_record(&self) -> Record {
        self.inner.def.new_record()
    }

    /// The resolver attached under `name`.
    pub fn relation(&self, name: &str) -> Result<ManyToMany> {
        self.inner.relations.read().get(name).cloned().ok_or_else(|| {
            HybridError::Attribute(format!("model '{}' has no relation '{}'", self.name(), name))
        })
    }

    pub fn relation_names(&self) -> Vec<String> {
        self.inner.relations.read().keys().cloned().collect()
    }

    /// True when both handles share one binding.
    pub fn same_binding(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn attach(&self, name: &str, relation: ManyToMany) {
        self.inner.relations.write().insert(name.to_string(), relation);
    }

    pub(crate) fn detach_all(&self) {
        self.inner.relations.write().clear();
    }

    /// The primary key of a persisted instance.
    pub(crate) fn require_pk(&self, record: &Record) -> Result<crate::types::Key> {
        record.pk().ok_or_else(|| {
            HybridError::Attribute(format!(
                "{} instance has no primary key '{}'",
                self.name(),
                self.primary_key()
            ))
        })
    }

    /// Re-keys a record onto this type's primary key name.
    pub(crate) fn adopt(&self, mut record: Record) -> Record {
        record.set_primary_key_name(self.primary_key());
        record
    }
}
