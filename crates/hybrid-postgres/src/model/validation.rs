//! Validation pipeline and the built-in validators.

use tracing::{debug, instrument};

use super::{Model, ModelDef};
use crate::record::Record;
use crate::session::{DbHandle, Session};
use crate::types::Key;
use crate::Result;

impl Model {
    /// Runs `data` through the type's validators, or through
    /// [`validators::project_columns`] when none are declared.
    pub fn validate(&self, data: Record) -> Result<Record> {
        let def = self.def();
        let data = self.adopt(data);
        if def.validators().is_empty() {
            return validators::project_columns(def, data);
        }
        def.validators().iter().try_fold(data, |data, validator| validator(def, data))
    }

    /// Passes `data` through the update validators, merges the result into
    /// `record` and saves only the fields it carries.
    ///
    /// Returns `None` without touching the database when validation leaves
    /// nothing to write.
    #[instrument(skip_all, fields(model = %self.name()))]
    pub async fn validate_and_save(
        &self,
        record: &mut Record,
        data: Record,
        conn: Option<&mut dyn Session>,
    ) -> Result<Option<Key>> {
        let def = self.def();
        let current: &Record = record;
        let data = def
            .update_validators()
            .iter()
            .try_fold(self.adopt(data), |data, validator| validator(def, current, data))?;
        if data.is_empty() {
            debug!("Nothing to save after validation");
            return Ok(None);
        }

        let changed: Vec<String> = data.keys().map(str::to_string).collect();
        record.merge(data);
        let fields: Vec<&str> = changed.iter().map(String::as_str).collect();

        let mut handle = DbHandle::resolve(self.app().db(), conn).await?;
        self.save_in(handle.session(), record, Some(&fields)).await.map(Some)
    }
}

/// Ready-made validators for [`ModelDef::validator`].
pub mod validators {
    use super::ModelDef;
    use crate::record::Record;
    use crate::{HybridError, Result, Value};
    use tracing::debug;

    /// Keeps only keys that are columns of the table, dropping the rest.
    ///
    /// A table declared without columns keeps everything.
    pub fn project_columns(def: &ModelDef, mut data: Record) -> Result<Record> {
        let table = def.table();
        if !table.is_empty() {
            data.retain(|name, _| table.has_column(name));
        }
        Ok(data)
    }

    /// Parses string values of the named fields as JSON documents.
    ///
    /// With no names given, applies to every JSON column of the table. Text
    /// that does not parse is left as it is.
    pub fn coerce_json_fields<I, S>(fields: I) -> impl Fn(&ModelDef, Record) -> Result<Record> + Send + Sync + 'static
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        move |def: &ModelDef, mut data: Record| {
            let targets: Vec<String> = if fields.is_empty() {
                def.table()
                    .iter()
                    .filter(|c| c.ty.is_json())
                    .map(|c| c.name.clone())
                    .collect()
            } else {
                fields.clone()
            };
            for name in &targets {
                let parsed = match data.get(name) {
                    Some(Value::String(text)) => match serde_json::from_str::<serde_json::Value>(text) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            debug!(field = %name, error = %e, "Value is not JSON; kept as text");
                            continue;
                        }
                    },
                    _ => continue,
                };
                data.set(name.clone(), Value::Json(parsed));
            }
            Ok(data)
        }
    }

    /// Rejects data in which any of the named fields is absent or NULL.
    pub fn require<I, S>(fields: I) -> impl Fn(&ModelDef, Record) -> Result<Record> + Send + Sync + 'static
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        move |def: &ModelDef, data: Record| {
            let missing: Vec<&str> = fields
                .iter()
                .filter(|f| data.get(f).map_or(true, Value::is_null))
                .map(String::as_str)
                .collect();
            if missing.is_empty() {
                Ok(data)
            } else {
                Err(HybridError::Validation(format!(
                    "{}: missing required field(s) {}",
                    def.name(),
                    missing.join(", ")
                )))
            }
        }
    }
}
