//! Relation linker.
//!
//! Builds the predicate that selects the rows related to one source entity
//! through one relation. The strategy is picked by matching the resolved
//! [`Cardinality`]:
//!
//! | cardinality              | condition                                            |
//! |--------------------------|------------------------------------------------------|
//! | many-to-one              | `relatedPK = FK value on source`                     |
//! | one-to-many              | `inverse FK on related = sourcePK`                   |
//! | one-to-one (owning)      | `relatedPK = FK value`, else `inverse.pk = sourcePK` |
//! | one-to-one (non-owning)  | `inverse FK on related = sourcePK`                   |
//! | many-to-many (owning)    | `inversedBy = sourcePK`                              |
//! | many-to-many (non-owning)| `mappedBy = sourcePK`                                |
//!
//! Foreign-key values are read from the relation's declared `fieldNames`, or
//! from the primary key of an already loaded related object. Naming-convention
//! guesses are not attempted: when neither source is available the relation
//! needs `fieldNames` in its metadata and linking fails with `MissingForeignKey`.

use super::cardinality::Cardinality;
use super::metadata::{MetadataProvider, RelationMeta};
use super::record::EntityRecord;
use crate::error::{QueryError, QueryResult};
use crate::predicate::{ColumnRef, CompareOp, Predicate};
use serde_json::Value;

/// Builds relation conditions against an explicit metadata handle
pub struct RelationLinker<'a> {
    provider: &'a dyn MetadataProvider,
}

impl<'a> RelationLinker<'a> {
    pub fn new(provider: &'a dyn MetadataProvider) -> Self {
        Self { provider }
    }

    /// Condition selecting the rows related to `source` through `relation`
    ///
    /// # Errors
    ///
    /// `RelationNotFound` when `relation` is not declared on `entity_type`; this
    /// check happens before anything else is read.
    pub fn link(
        &self,
        entity_type: &str,
        source: &dyn EntityRecord,
        relation: &str,
    ) -> QueryResult<Predicate> {
        let meta = self.provider.relation_meta(entity_type, relation)?;
        self.link_condition(entity_type, source, meta)
    }

    /// Condition for an already looked-up relation descriptor
    pub fn link_condition(
        &self,
        entity_type: &str,
        source: &dyn EntityRecord,
        relation: &RelationMeta,
    ) -> QueryResult<Predicate> {
        let cardinality = Cardinality::resolve(entity_type, relation)?;
        log::trace!(
            "linking {}.{} as {:?}",
            entity_type,
            relation.name,
            cardinality
        );

        match cardinality {
            Cardinality::ManyToOne { foreign_keys } => {
                let target_keys = self.provider.primary_keys(&relation.target_type)?;
                check_key_arity(entity_type, relation, &foreign_keys, target_keys)?;
                match foreign_key_values(source, relation, &foreign_keys, target_keys) {
                    Some(values) => Ok(equalities(
                        target_keys.iter().map(|k| ColumnRef::field(k.clone())),
                        values,
                    )),
                    None => Err(missing_foreign_key(entity_type, relation)),
                }
            }
            Cardinality::OneToOneOwning {
                foreign_keys,
                inverse,
            } => {
                let target_keys = self.provider.primary_keys(&relation.target_type)?;
                check_key_arity(entity_type, relation, &foreign_keys, target_keys)?;
                if let Some(values) = foreign_key_values(source, relation, &foreign_keys, target_keys)
                {
                    return Ok(equalities(
                        target_keys.iter().map(|k| ColumnRef::field(k.clone())),
                        values,
                    ));
                }
                match inverse {
                    Some(inverse) => {
                        log::debug!(
                            "foreign key for {}.{} unresolved, joining through {}",
                            entity_type,
                            relation.name,
                            inverse
                        );
                        let (keys, values) = self.source_key(entity_type, source)?;
                        Ok(equalities(
                            keys.iter().map(|k| ColumnRef::qualified(inverse.clone(), k.clone())),
                            values,
                        ))
                    }
                    None => Err(missing_foreign_key(entity_type, relation)),
                }
            }
            Cardinality::OneToMany { inverse } | Cardinality::OneToOneNonOwning { inverse } => {
                self.inverse_key_condition(entity_type, source, relation, &inverse)
            }
            Cardinality::ManyToManyOwning { inverse } => {
                self.relation_id_condition(entity_type, source, &inverse)
            }
            Cardinality::ManyToManyNonOwning { mapped_by } => {
                self.relation_id_condition(entity_type, source, &mapped_by)
            }
        }
    }

    /// Disjunction of the conditions for every source, for loading in one query
    ///
    /// Returns `None` for an empty batch. Identical per-source conditions are
    /// kept once.
    pub fn batch_condition<R: EntityRecord>(
        &self,
        entity_type: &str,
        sources: &[R],
        relation: &str,
    ) -> QueryResult<Option<Predicate>> {
        let meta = self.provider.relation_meta(entity_type, relation)?;
        if sources.is_empty() {
            return Ok(None);
        }
        let mut conditions: Vec<Predicate> = Vec::with_capacity(sources.len());
        for source in sources {
            let condition = self.link_condition(entity_type, source, meta)?;
            if !conditions.contains(&condition) {
                conditions.push(condition);
            }
        }
        Ok(Some(Predicate::any(conditions)))
    }

    fn source_key(
        &self,
        entity_type: &str,
        source: &dyn EntityRecord,
    ) -> QueryResult<(&'a [String], Vec<Value>)> {
        let keys = self.provider.primary_keys(entity_type)?;
        let values = source.primary_key_values(entity_type, keys)?;
        Ok((keys, values))
    }

    /// `inverse FK columns on related = source PK`, using the inverse relation's
    /// declared field names when the target metadata has them
    fn inverse_key_condition(
        &self,
        entity_type: &str,
        source: &dyn EntityRecord,
        relation: &RelationMeta,
        inverse: &str,
    ) -> QueryResult<Predicate> {
        let declared = self
            .provider
            .entity(&relation.target_type)
            .and_then(|target| target.find_relation(inverse))
            .map(|inv| inv.field_names.as_slice())
            .filter(|names| !names.is_empty());

        let Some(fk_fields) = declared else {
            return self.relation_id_condition(entity_type, source, inverse);
        };

        let (keys, values) = self.source_key(entity_type, source)?;
        if fk_fields.len() != keys.len() {
            return Err(QueryError::InvalidRelationMetadata {
                entity: entity_type.to_string(),
                relation: relation.name.clone(),
                detail: format!(
                    "inverse {} declares {} foreign key field(s) for a {} column primary key",
                    inverse,
                    fk_fields.len(),
                    keys.len()
                ),
            });
        }
        Ok(equalities(
            fk_fields.iter().map(|f| ColumnRef::field(f.clone())),
            values,
        ))
    }

    /// `relation = source PK`; composite keys compare each key through the relation
    fn relation_id_condition(
        &self,
        entity_type: &str,
        source: &dyn EntityRecord,
        relation_name: &str,
    ) -> QueryResult<Predicate> {
        let (keys, mut values) = self.source_key(entity_type, source)?;
        if values.len() == 1 {
            return Ok(Predicate::compare(
                ColumnRef::field(relation_name),
                CompareOp::Eq,
                values.remove(0),
            ));
        }
        Ok(equalities(
            keys.iter().map(|k| ColumnRef::qualified(relation_name, k.clone())),
            values,
        ))
    }
}

/// FK values for an owning relation: declared fields first, then a loaded related object
fn foreign_key_values(
    source: &dyn EntityRecord,
    relation: &RelationMeta,
    foreign_keys: &[String],
    target_keys: &[String],
) -> Option<Vec<Value>> {
    if !foreign_keys.is_empty() {
        let declared: Option<Vec<Value>> = foreign_keys
            .iter()
            .map(|field| source.get(field).cloned())
            .collect();
        if declared.is_some() {
            return declared;
        }
    }

    let loaded = source.get(&relation.name)?;
    if !loaded.is_object() {
        return None;
    }
    let values: Option<Vec<Value>> = target_keys
        .iter()
        .map(|key| loaded.get(key).filter(|v| !v.is_null()).cloned())
        .collect();
    if values.is_some() {
        log::trace!("using loaded {} object for its foreign key", relation.name);
    }
    values
}

/// Declared foreign keys must cover the target primary key column for column
fn check_key_arity(
    entity_type: &str,
    relation: &RelationMeta,
    foreign_keys: &[String],
    target_keys: &[String],
) -> QueryResult<()> {
    if foreign_keys.is_empty() || foreign_keys.len() == target_keys.len() {
        return Ok(());
    }
    Err(QueryError::InvalidRelationMetadata {
        entity: entity_type.to_string(),
        relation: relation.name.clone(),
        detail: format!(
            "declares {} foreign key field(s) for a {} column primary key on {}",
            foreign_keys.len(),
            target_keys.len(),
            relation.target_type
        ),
    })
}

fn equalities(columns: impl IntoIterator<Item = ColumnRef>, values: Vec<Value>) -> Predicate {
    Predicate::all(
        columns
            .into_iter()
            .zip(values)
            .map(|(column, value)| Predicate::compare(column, CompareOp::Eq, value)),
    )
}

fn missing_foreign_key(entity_type: &str, relation: &RelationMeta) -> QueryError {
    QueryError::MissingForeignKey {
        entity: entity_type.to_string(),
        relation: relation.name.clone(),
    }
}
