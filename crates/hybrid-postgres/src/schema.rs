//! Table descriptors and the foreign-schema bridge.
//!
//! A [`Table`] is what the engine needs to know about one relation: its name
//! and its columns. Tables can be written by hand or derived from another
//! ORM's model declarations described as a [`ForeignModel`]; derivation also
//! yields the many-to-many relationship descriptors of that model.

use std::collections::{BTreeMap, HashMap};

use crate::query::validate_identifier;
use crate::relationship::ManyToManyDef;
use crate::{HybridError, Result};

/// Semantic column type.
///
/// Only JSON documents and UUIDs are interpreted by the engine; every other
/// declared kind is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Json,
    Uuid,
    Native(String),
}

impl SemanticType {
    /// Maps a foreign field kind name onto a semantic type.
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "JSONField" => SemanticType::Json,
            "UUIDField" => SemanticType::Uuid,
            other => SemanticType::Native(other.to_string()),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, SemanticType::Json)
    }
}

impl Default for SemanticType {
    fn default() -> Self {
        SemanticType::Native(String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: SemanticType,
}

/// A table name plus its ordered column set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(name: &str) -> Result<Self> {
        validate_identifier(name)?;
        Ok(Self { name: name.to_string(), columns: Vec::new() })
    }

    /// Adds a column, replacing the type of an existing one with the same name.
    pub fn column(mut self, name: &str, ty: SemanticType) -> Result<Self> {
        validate_identifier(name)?;
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.ty = ty,
            None => self.columns.push(Column { name: name.to_string(), ty }),
        }
        Ok(self)
    }

    /// Adds several untyped columns.
    pub fn columns<I, S>(self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .try_fold(self, |table, name| table.column(name.as_ref(), SemanticType::default()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Fails with `Attribute` for a name that is not a column of this table.
    ///
    /// A table declared without columns accepts any name.
    pub fn check_column(&self, name: &str) -> Result<()> {
        if self.columns.is_empty() || self.has_column(name) {
            Ok(())
        } else {
            Err(HybridError::Attribute(format!(
                "table '{}' has no column '{}'",
                self.name, name
            )))
        }
    }
}

/// A model declared in another ORM.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignModel {
    /// Class name, e.g. `OrderItem`.
    pub name: String,
    pub db_table: String,
    pub fields: Vec<ForeignField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignField {
    pub name: String,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Plain column; `kind` is the declaring field class name.
    Scalar { kind: String },
    /// Many-to-one reference stored in `column`.
    ForeignKey { column: String, target_kind: String },
    OneToOne { column: String, target_kind: String, auto_created: bool },
    /// Reverse side of a foreign key; stores nothing on this table.
    OneToMany,
    ManyToMany(ManyToManyLink),
    /// The far side of a many-to-many declared on another model.
    ManyToManyReverse(ManyToManyLink),
}

/// A many-to-many declaration as seen from the model that declares it.
#[derive(Debug, Clone, PartialEq)]
pub struct ManyToManyLink {
    /// Join model.
    pub through: Box<ForeignModel>,
    /// Class name of the related model.
    pub related: String,
    /// Join column pointing at the declaring model.
    pub column_name: String,
    /// Join column pointing at the related model.
    pub reverse_name: String,
}

/// Result of [`derive_schema`].
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSchema {
    pub table: Table,
    pub relationships: BTreeMap<String, ManyToManyDef>,
}

impl ForeignField {
    pub fn scalar(name: &str, kind: &str) -> Self {
        Self { name: name.to_string(), kind: FieldKind::Scalar { kind: kind.to_string() } }
    }

    pub fn foreign_key(name: &str, column: &str, target_kind: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::ForeignKey {
                column: column.to_string(),
                target_kind: target_kind.to_string(),
            },
        }
    }
}

/// Converts a foreign model into a table and its many-to-many descriptors.
///
/// `overrides` maps a field name to the semantic type its column must carry,
/// taking precedence over the declared kind.
pub fn derive_schema(
    model: &ForeignModel,
    overrides: &HashMap<String, SemanticType>,
) -> Result<DerivedSchema> {
    let mut table = Table::new(&model.db_table)?;
    let mut relationships = BTreeMap::new();

    for field in &model.fields {
        let override_ty = overrides.get(&field.name).cloned();
        match &field.kind {
            FieldKind::Scalar { kind } => {
                let ty = override_ty.unwrap_or_else(|| SemanticType::from_kind(kind));
                table = table.column(&field.name, ty)?;
            }
            FieldKind::ForeignKey { column, target_kind } => {
                let ty = override_ty.unwrap_or_else(|| SemanticType::from_kind(target_kind));
                table = table.column(column, ty)?;
            }
            FieldKind::OneToOne { column, target_kind, auto_created } => {
                if !auto_created {
                    let ty = override_ty.unwrap_or_else(|| SemanticType::from_kind(target_kind));
                    table = table.column(column, ty)?;
                }
            }
            FieldKind::OneToMany => {}
            FieldKind::ManyToMany(link) => {
                let def = many_to_many(link, &link.column_name, &link.reverse_name)?;
                relationships.insert(field.name.clone(), def);
            }
            FieldKind::ManyToManyReverse(link) => {
                let def = many_to_many(link, &link.reverse_name, &link.column_name)?;
                relationships.insert(field.name.clone(), def);
            }
        }
    }

    Ok(DerivedSchema { table, relationships })
}

fn many_to_many(link: &ManyToManyLink, source: &str, target: &str) -> Result<ManyToManyDef> {
    let join = derive_schema(&link.through, &HashMap::new())?;
    Ok(ManyToManyDef {
        join_model: link.through.name.clone(),
        join_table: join.table,
        target: link.related.clone(),
        source_column: source.to_string(),
        target_column: target.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_tags() -> ForeignModel {
        ForeignModel {
            name: "PostTags".to_string(),
            db_table: "post_tags".to_string(),
            fields: vec![
                ForeignField::scalar("id", "AutoField"),
                ForeignField::foreign_key("post", "post_id", "AutoField"),
                ForeignField::foreign_key("tag", "tag_id", "UUIDField"),
            ],
        }
    }

    fn post() -> ForeignModel {
        ForeignModel {
            name: "Post".to_string(),
            db_table: "posts".to_string(),
            fields: vec![
                ForeignField::scalar("id", "AutoField"),
                ForeignField::scalar("title", "CharField"),
                ForeignField::scalar("meta", "JSONField"),
                ForeignField::scalar("token", "UUIDField"),
                ForeignField::foreign_key("author", "author_id", "UUIDField"),
                ForeignField {
                    name: "profile".to_string(),
                    kind: FieldKind::OneToOne {
                        column: "profile_id".to_string(),
                        target_kind: "AutoField".to_string(),
                        auto_created: true,
                    },
                },
                ForeignField { name: "comments".to_string(), kind: FieldKind::OneToMany },
                ForeignField {
                    name: "tags".to_string(),
                    kind: FieldKind::ManyToMany(ManyToManyLink {
                        through: Box::new(post_tags()),
                        related: "Tag".to_string(),
                        column_name: "post_id".to_string(),
                        reverse_name: "tag_id".to_string(),
                    }),
                },
            ],
        }
    }

    #[test]
    fn test_scalar_and_foreign_key_columns() {
        let schema = derive_schema(&post(), &HashMap::new()).unwrap();
        let names: Vec<&str> = schema.table.column_names().collect();
        assert_eq!(names, vec!["id", "title", "meta", "token", "author_id"]);
        assert_eq!(schema.table.name(), "posts");
    }

    #[test]
    fn test_known_kinds_are_mapped() {
        let schema = derive_schema(&post(), &HashMap::new()).unwrap();
        assert_eq!(schema.table.get("meta").unwrap().ty, SemanticType::Json);
        assert_eq!(schema.table.get("token").unwrap().ty, SemanticType::Uuid);
        assert_eq!(schema.table.get("author_id").unwrap().ty, SemanticType::Uuid);
        assert_eq!(
            schema.table.get("title").unwrap().ty,
            SemanticType::Native("CharField".to_string())
        );
    }

    #[test]
    fn test_overrides_win() {
        let mut overrides = HashMap::new();
        overrides.insert("title".to_string(), SemanticType::Json);
        let schema = derive_schema(&post(), &overrides).unwrap();
        assert!(schema.table.get("title").unwrap().ty.is_json());
    }

    #[test]
    fn test_many_to_many_forward() {
        let schema = derive_schema(&post(), &HashMap::new()).unwrap();
        let tags = &schema.relationships["tags"];
        assert_eq!(tags.join_model, "PostTags");
        assert_eq!(tags.target, "Tag");
        assert_eq!(tags.source_column, "post_id");
        assert_eq!(tags.target_column, "tag_id");
        assert!(tags.join_table.has_column("tag_id"));
    }

    #[test]
    fn test_many_to_many_reverse_swaps_columns() {
        let tag = ForeignModel {
            name: "Tag".to_string(),
            db_table: "tags".to_string(),
            fields: vec![
                ForeignField::scalar("id", "UUIDField"),
                ForeignField {
                    name: "posts".to_string(),
                    kind: FieldKind::ManyToManyReverse(ManyToManyLink {
                        through: Box::new(post_tags()),
                        related: "Post".to_string(),
                        column_name: "post_id".to_string(),
                        reverse_name: "tag_id".to_string(),
                    }),
                },
            ],
        };
        let schema = derive_schema(&tag, &HashMap::new()).unwrap();
        let posts = &schema.relationships["posts"];
        assert_eq!(posts.source_column, "tag_id");
        assert_eq!(posts.target_column, "post_id");
        assert_eq!(schema.table.len(), 1);
    }

    #[test]
    fn test_check_column() {
        let table = Table::new("users").unwrap().columns(["id", "name"]).unwrap();
        assert!(table.check_column("name").is_ok());
        assert!(matches!(table.check_column("nope"), Err(HybridError::Attribute(_))));

        let open = Table::new("anything").unwrap();
        assert!(open.check_column("nope").is_ok());
    }
}
