//! Record instances.
//!
//! A [`Record`] is one row held in memory: an ordered list of fields plus the
//! name of the field that acts as primary key. It serves as both the input
//! mapping for writes and the instance returned by reads. Extra projected
//! columns are kept like any other field.

use serde_json::{Map, Value as JsonValue};

use crate::types::{Key, Row};
use crate::{HybridError, Result, Value};

pub const DEFAULT_PRIMARY_KEY: &str = "id";

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    primary_key: String,
    fields: Vec<(String, Value)>,
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl Record {
    /// Empty record keyed by `id`.
    pub fn new() -> Self {
        Self::with_primary_key(DEFAULT_PRIMARY_KEY)
    }

    pub fn with_primary_key(primary_key: impl Into<String>) -> Self {
        Self { primary_key: primary_key.into(), fields: Vec::new() }
    }

    pub(crate) fn from_row(primary_key: &str, row: Row) -> Self {
        Self { primary_key: primary_key.to_string(), fields: row }
    }

    /// Builder-style field assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub(crate) fn set_primary_key_name(&mut self, primary_key: &str) {
        if self.primary_key != primary_key {
            self.primary_key = primary_key.to_string();
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Like [`get`](Record::get) but a missing field is an error.
    pub fn require(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| HybridError::Attribute(format!("record has no field '{}'", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == name)
    }

    /// Sets a field, replacing in place if present, appending otherwise.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(k, _)| k == name)?;
        Some(self.fields.remove(idx).1)
    }

    /// Primary-key value, when present and keyable.
    pub fn pk(&self) -> Option<Key> {
        self.get(&self.primary_key).and_then(Key::from_value)
    }

    pub fn set_pk(&mut self, key: impl Into<Key>) {
        let name = self.primary_key.clone();
        self.set(name, Value::from(key.into()));
    }

    /// Copies every field of `other` onto this record.
    pub fn merge(&mut self, other: Record) {
        for (name, value) in other.fields {
            self.set(name, value);
        }
    }

    pub(crate) fn merge_row(&mut self, row: Row) {
        for (name, value) in row {
            self.set(name, value);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Keeps only fields for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.fields.retain(|(k, v)| keep(k, v));
    }

    /// Copy restricted to the named fields, in this record's order.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Record {
        let mut out = Record::with_primary_key(self.primary_key.clone());
        out.fields = self
            .fields
            .iter()
            .filter(|(k, _)| names.iter().any(|n| n.as_ref() == k))
            .cloned()
            .collect();
        out
    }

    pub fn into_pairs(self) -> Vec<(String, Value)> {
        self.fields
    }

    pub fn to_json(&self) -> JsonValue {
        let map: Map<String, JsonValue> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        JsonValue::Object(map)
    }

    /// Indented JSON rendering.
    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(&self.to_json()).unwrap_or_default()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Builds a [`Record`] from `name => value` pairs.
///
/// ```ignore
/// let r = record! { "name" => "Alice", "age" => 30 };
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::Record::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $( record.set($name, $value); )+
        record
    }};
}
