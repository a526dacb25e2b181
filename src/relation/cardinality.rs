//! Resolved relation cardinality.
//!
//! Raw metadata carries a `kind` plus an `owner` flag and a handful of optional
//! inverse names. [`Cardinality::resolve`] turns that into one exhaustive variant
//! per linking strategy, checking up front that each variant has the names it
//! needs, so the linker can match without a fallback arm.

use super::metadata::{RelationKind, RelationMeta};
use crate::error::{QueryError, QueryResult};

/// Linking strategy for one relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cardinality {
    /// Source holds the FK; related PK equals the FK value
    ManyToOne { foreign_keys: Vec<String> },
    /// Related rows hold the FK through the inverse relation `inverse`
    OneToMany { inverse: String },
    /// Source holds the FK; `inverse` is used when the FK value is unresolved
    OneToOneOwning {
        foreign_keys: Vec<String>,
        inverse: Option<String>,
    },
    /// Related row holds the FK through `inverse`
    OneToOneNonOwning { inverse: String },
    /// Pivot driven by this side; filter related rows by their `inverse` relation
    ManyToManyOwning { inverse: String },
    /// Pivot driven by the other side's `mapped_by` relation
    ManyToManyNonOwning { mapped_by: String },
}

impl Cardinality {
    /// Resolve raw metadata of a relation declared on `entity`
    ///
    /// # Errors
    ///
    /// `InvalidRelationMetadata` when the variant's required inverse name is absent.
    pub fn resolve(entity: &str, relation: &RelationMeta) -> QueryResult<Self> {
        let require = |name: &Option<String>, what: &str| -> QueryResult<String> {
            name.clone().ok_or_else(|| QueryError::InvalidRelationMetadata {
                entity: entity.to_string(),
                relation: relation.name.clone(),
                detail: format!("{:?} relation requires {}", relation.kind, what),
            })
        };

        Ok(match (relation.kind, relation.owner) {
            (RelationKind::ManyToOne, _) => Cardinality::ManyToOne {
                foreign_keys: relation.field_names.clone(),
            },
            (RelationKind::OneToMany, _) => Cardinality::OneToMany {
                inverse: require(
                    &relation.mapped_by.clone().or_else(|| relation.inversed_by.clone()),
                    "mappedBy",
                )?,
            },
            (RelationKind::OneToOne, true) => Cardinality::OneToOneOwning {
                foreign_keys: relation.field_names.clone(),
                inverse: relation.inversed_by.clone(),
            },
            (RelationKind::OneToOne, false) => Cardinality::OneToOneNonOwning {
                inverse: require(
                    &relation.mapped_by.clone().or_else(|| relation.inversed_by.clone()),
                    "mappedBy",
                )?,
            },
            (RelationKind::ManyToMany, true) => Cardinality::ManyToManyOwning {
                inverse: require(&relation.inversed_by, "inversedBy")?,
            },
            (RelationKind::ManyToMany, false) => Cardinality::ManyToManyNonOwning {
                mapped_by: require(&relation.mapped_by, "mappedBy")?,
            },
        })
    }

    /// Whether the source entity itself holds the foreign key
    pub fn source_holds_key(&self) -> bool {
        matches!(
            self,
            Cardinality::ManyToOne { .. } | Cardinality::OneToOneOwning { .. }
        )
    }
}
