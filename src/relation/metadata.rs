//! Entity and relation metadata.
//!
//! The metadata provider is the compiler's only view of the entity graph: primary
//! keys, relation descriptors and property-to-column names. [`MetadataRegistry`]
//! is an in-memory provider that can be built in code or loaded from JSON.
//!
//! # Example
//!
//! ```
//! use querygraph::relation::{MetadataProvider, MetadataRegistry};
//!
//! let registry = MetadataRegistry::from_json_str(r#"[
//!     { "name": "Post", "table": "posts", "primaryKeys": ["id"],
//!       "relations": [{ "name": "author", "kind": "many-to-one",
//!                       "targetType": "User", "owner": true, "fieldNames": ["authorId"] }] },
//!     { "name": "User", "primaryKeys": ["id"] }
//! ]"#).unwrap();
//!
//! assert_eq!(registry.relation_meta("Post", "author").unwrap().target_type, "User");
//! ```

use crate::config::QueryConfig;
use crate::error::{QueryError, QueryResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Raw relation cardinality as declared in metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    ManyToOne,
    OneToMany,
    OneToOne,
    ManyToMany,
}

/// Relation descriptor on an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationMeta {
    /// Relation (property) name on the owning entity
    pub name: String,
    pub kind: RelationKind,
    /// Entity type the relation points at
    pub target_type: String,
    /// Whether this side holds the foreign key / drives the pivot join
    #[serde(default)]
    pub owner: bool,
    /// Name of the relation on the target that owns this one
    #[serde(default)]
    pub mapped_by: Option<String>,
    /// Name of the inverse relation on the target
    #[serde(default)]
    pub inversed_by: Option<String>,
    /// Foreign-key property names on this entity, in target primary-key order
    #[serde(default)]
    pub field_names: Vec<String>,
}

impl RelationMeta {
    pub fn new(name: impl Into<String>, kind: RelationKind, target_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target_type: target_type.into(),
            owner: false,
            mapped_by: None,
            inversed_by: None,
            field_names: Vec::new(),
        }
    }

    pub fn owner(mut self, owner: bool) -> Self {
        self.owner = owner;
        self
    }

    pub fn mapped_by(mut self, name: impl Into<String>) -> Self {
        self.mapped_by = Some(name.into());
        self
    }

    pub fn inversed_by(mut self, name: impl Into<String>) -> Self {
        self.inversed_by = Some(name.into());
        self
    }

    pub fn field_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Metadata for one entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMeta {
    pub name: String,
    /// Table name; defaults to the entity name
    #[serde(default)]
    pub table: Option<String>,
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub relations: Vec<RelationMeta>,
    /// Property name to column name overrides
    #[serde(default)]
    pub columns: HashMap<String, String>,
}

impl EntityMeta {
    pub fn new<I, S>(name: impl Into<String>, primary_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            table: None,
            primary_keys: primary_keys.into_iter().map(Into::into).collect(),
            relations: Vec::new(),
            columns: HashMap::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn relation(mut self, relation: RelationMeta) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn column(mut self, property: impl Into<String>, column: impl Into<String>) -> Self {
        self.columns.insert(property.into(), column.into());
        self
    }

    pub fn find_relation(&self, name: &str) -> Option<&RelationMeta> {
        self.relations.iter().find(|r| r.name == name)
    }
}

/// Source of entity metadata consumed by the resolver, linker and assembler
pub trait MetadataProvider {
    /// Metadata for `entity_type`, if registered
    fn entity(&self, entity_type: &str) -> Option<&EntityMeta>;

    /// Relation descriptor, failing with `RelationNotFound` for unknown names
    fn relation_meta(&self, entity_type: &str, relation: &str) -> QueryResult<&RelationMeta> {
        self.entity(entity_type)
            .and_then(|e| e.find_relation(relation))
            .ok_or_else(|| QueryError::RelationNotFound {
                entity: entity_type.to_string(),
                relation: relation.to_string(),
            })
    }

    /// Ordered primary key properties
    fn primary_keys(&self, entity_type: &str) -> QueryResult<&[String]> {
        self.entity(entity_type)
            .map(|e| e.primary_keys.as_slice())
            .ok_or_else(|| QueryError::EntityNotFound(entity_type.to_string()))
    }

    /// Column backing `property`; the property name when no override exists
    fn column_name(&self, entity_type: &str, property: &str) -> String {
        self.entity(entity_type)
            .and_then(|e| e.columns.get(property))
            .cloned()
            .unwrap_or_else(|| property.to_string())
    }

    /// Table backing `entity_type`; the entity name when no table is declared
    fn table_name(&self, entity_type: &str) -> String {
        self.entity(entity_type)
            .and_then(|e| e.table.clone())
            .unwrap_or_else(|| entity_type.to_string())
    }
}

/// In-memory metadata provider
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entities: HashMap<String, EntityMeta>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: impl IntoIterator<Item = EntityMeta>) -> Self {
        let mut registry = Self::new();
        for entity in entities {
            registry.register(entity);
        }
        registry
    }

    /// Add or replace an entity's metadata
    pub fn register(&mut self, entity: EntityMeta) {
        log::trace!("registering metadata for {}", entity.name);
        self.entities.insert(entity.name.clone(), entity);
    }

    /// Parse a JSON array of entity descriptors
    pub fn from_json_str(json: &str) -> QueryResult<Self> {
        let entities: Vec<EntityMeta> = serde_json::from_str(json)
            .map_err(|e| QueryError::Metadata(format!("failed to parse metadata: {e}")))?;
        Ok(Self::from_entities(entities))
    }

    /// Load a JSON metadata file
    pub fn load(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            QueryError::Metadata(format!("failed to read {}: {e}", path.display()))
        })?;
        let registry = Self::from_json_str(&json)?;
        log::debug!(
            "loaded metadata for {} entities from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Load the file named by `metadata_path`, or start empty when none is configured
    pub fn from_config(config: &QueryConfig) -> QueryResult<Self> {
        match &config.metadata_path {
            Some(path) => Self::load(path),
            None => Ok(Self::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl MetadataProvider for MetadataRegistry {
    fn entity(&self, entity_type: &str) -> Option<&EntityMeta> {
        self.entities.get(entity_type)
    }
}
