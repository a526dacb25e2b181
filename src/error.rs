//! Error types for filter compilation, relation linking and aggregate decoding.
//!
//! Every failure in this crate is a synchronous compile-time failure. Nothing is
//! retried; the caller maps these into its own responses (e.g. bad-request).

use serde_json::Value;
use std::fmt;

/// Error type for every operation in the crate
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Comparison operator is not one of the known operators
    UnknownOperator { operator: String },
    /// Operand does not fit the operator's shape contract
    InvalidOperand {
        operator: String,
        operand: Value,
        reason: &'static str,
    },
    /// Filter JSON is not a valid filter tree
    InvalidFilter(String),
    /// Entity type is not known to the metadata provider
    EntityNotFound(String),
    /// Relation name is not declared on the entity
    RelationNotFound { entity: String, relation: String },
    /// Relation metadata lacks a name the cardinality needs
    InvalidRelationMetadata {
        entity: String,
        relation: String,
        detail: String,
    },
    /// Foreign key value could not be read from the source entity
    MissingForeignKey { entity: String, relation: String },
    /// Source entity does not carry its primary key
    MissingPrimaryKey { entity: String, field: String },
    /// Aggregate request has no group-by or aggregate fields
    NoAggregateFields,
    /// Result column alias is not a known aggregate alias
    AggregateDecode { alias: String },
    /// Metadata could not be loaded or parsed
    Metadata(String),
    /// Execution layer failure surfaced through batch dispatch
    Execution(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::UnknownOperator { operator } => {
                write!(f, "unknown comparison operator: {operator}")
            }
            QueryError::InvalidOperand {
                operator,
                operand,
                reason,
            } => write!(
                f,
                "invalid operand for operator {operator}: {reason}, got {operand}"
            ),
            QueryError::InvalidFilter(msg) => write!(f, "invalid filter: {msg}"),
            QueryError::EntityNotFound(entity) => {
                write!(f, "no metadata registered for entity {entity}")
            }
            QueryError::RelationNotFound { entity, relation } => {
                write!(f, "unable to find relation {relation} on {entity}")
            }
            QueryError::InvalidRelationMetadata {
                entity,
                relation,
                detail,
            } => write!(f, "invalid metadata for relation {entity}.{relation}: {detail}"),
            QueryError::MissingForeignKey { entity, relation } => write!(
                f,
                "unable to resolve foreign key for relation {entity}.{relation}: \
                 configure fieldNames on the relation metadata or load the related object"
            ),
            QueryError::MissingPrimaryKey { entity, field } => {
                write!(f, "entity {entity} is missing primary key field {field}")
            }
            QueryError::NoAggregateFields => {
                write!(f, "aggregate query must request at least one field")
            }
            QueryError::AggregateDecode { alias } => {
                write!(f, "unknown aggregate column encountered: {alias}")
            }
            QueryError::Metadata(msg) => write!(f, "metadata error: {msg}"),
            QueryError::Execution(msg) => write!(f, "execution error: {msg}"),
        }
    }
}

impl std::error::Error for QueryError {}

/// Result alias used throughout the crate
pub type QueryResult<T> = Result<T, QueryError>;

impl QueryError {
    pub(crate) fn invalid_operand(operator: &str, operand: &Value, reason: &'static str) -> Self {
        QueryError::InvalidOperand {
            operator: operator.to_string(),
            operand: operand.clone(),
            reason,
        }
    }
}
