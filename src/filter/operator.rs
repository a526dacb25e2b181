//! Comparison operators and the operator mapper.
//!
//! [`map`] turns one `operator + operand` pair into a [`Fragment`]: a comparison
//! (or small boolean group of comparisons) that is not yet bound to a column.
//! It is pure and knows nothing about entity metadata; every shape check that an
//! operand must pass happens here.

use crate::error::{QueryError, QueryResult};
use crate::predicate::{ColumnRef, CompareOp, Predicate};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison operator accepted in a field comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    ILike,
    NotILike,
    In,
    NotIn,
    Is,
    IsNot,
    Between,
    NotBetween,
}

impl Operator {
    pub const ALL: [Operator; 16] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Like,
        Operator::NotLike,
        Operator::ILike,
        Operator::NotILike,
        Operator::In,
        Operator::NotIn,
        Operator::Is,
        Operator::IsNot,
        Operator::Between,
        Operator::NotBetween,
    ];

    /// Wire name (lower camel case)
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Like => "like",
            Operator::NotLike => "notLike",
            Operator::ILike => "iLike",
            Operator::NotILike => "notILike",
            Operator::In => "in",
            Operator::NotIn => "notIn",
            Operator::Is => "is",
            Operator::IsNot => "isNot",
            Operator::Between => "between",
            Operator::NotBetween => "notBetween",
        }
    }

    /// True when `name` names a known operator (case-insensitive)
    pub fn is_known(name: &str) -> bool {
        name.parse::<Operator>().is_ok()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| QueryError::UnknownOperator {
                operator: s.to_string(),
            })
    }
}

/// Column-free result of mapping one operator
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Compare(CompareOp, Value),
    All(Vec<Fragment>),
    Any(Vec<Fragment>),
}

impl Fragment {
    /// Bind the fragment to a column
    pub fn bind(self, column: &ColumnRef) -> Predicate {
        match self {
            Fragment::Compare(op, value) => Predicate::compare(column.clone(), op, value),
            Fragment::All(parts) => Predicate::all(parts.into_iter().map(|p| p.bind(column))),
            Fragment::Any(parts) => Predicate::any(parts.into_iter().map(|p| p.bind(column))),
        }
    }
}

/// Map a single operator and operand to a predicate fragment
///
/// # Errors
///
/// - `UnknownOperator` when `operator` is not a known operator name
/// - `InvalidOperand` when the operand violates the operator's shape contract
///   (`is`/`isNot` outside `null | true | false`, `in`/`notIn` without a non-empty
///   array, `between`/`notBetween` without `lower` and `upper`, pattern
///   operators without a string)
pub fn map(operator: &str, operand: &Value) -> QueryResult<Fragment> {
    let op: Operator = operator.parse()?;
    validate(op, operator, operand)?;
    Ok(match op {
        Operator::Eq => Fragment::Compare(CompareOp::Eq, operand.clone()),
        Operator::Neq => Fragment::Compare(CompareOp::Ne, operand.clone()),
        Operator::Gt => Fragment::Compare(CompareOp::Gt, operand.clone()),
        Operator::Gte => Fragment::Compare(CompareOp::Gte, operand.clone()),
        Operator::Lt => Fragment::Compare(CompareOp::Lt, operand.clone()),
        Operator::Lte => Fragment::Compare(CompareOp::Lte, operand.clone()),
        Operator::Like => Fragment::Compare(CompareOp::Like, operand.clone()),
        Operator::NotLike => Fragment::Compare(CompareOp::NotLike, operand.clone()),
        Operator::ILike => Fragment::Compare(CompareOp::ILike, operand.clone()),
        Operator::NotILike => Fragment::Compare(CompareOp::NotILike, operand.clone()),
        Operator::In => Fragment::Compare(CompareOp::In, operand.clone()),
        Operator::NotIn => Fragment::Compare(CompareOp::NotIn, operand.clone()),
        Operator::Is => Fragment::Compare(CompareOp::Is, operand.clone()),
        Operator::IsNot => Fragment::Compare(CompareOp::IsNot, operand.clone()),
        Operator::Between => {
            let (lower, upper) = range_bounds(operand);
            Fragment::All(vec![
                Fragment::Compare(CompareOp::Gte, lower.clone()),
                Fragment::Compare(CompareOp::Lte, upper.clone()),
            ])
        }
        Operator::NotBetween => {
            let (lower, upper) = range_bounds(operand);
            Fragment::Any(vec![
                Fragment::Compare(CompareOp::Lt, lower.clone()),
                Fragment::Compare(CompareOp::Gt, upper.clone()),
            ])
        }
    })
}

/// Check an operand against the operator's shape contract
///
/// Shared by the SQL mapper and the in-memory evaluator so both fail identically.
pub(crate) fn validate(op: Operator, name: &str, operand: &Value) -> QueryResult<()> {
    match op {
        Operator::Is | Operator::IsNot => match operand {
            Value::Null | Value::Bool(_) => Ok(()),
            _ => Err(QueryError::invalid_operand(
                name,
                operand,
                "expected null, true or false",
            )),
        },
        Operator::In | Operator::NotIn => match operand {
            Value::Array(items) if !items.is_empty() => Ok(()),
            Value::Array(_) => Err(QueryError::invalid_operand(
                name,
                operand,
                "expected a non-empty array",
            )),
            _ => Err(QueryError::invalid_operand(name, operand, "expected an array")),
        },
        Operator::Between | Operator::NotBetween => match operand {
            Value::Object(map) if map.contains_key("lower") && map.contains_key("upper") => {
                Ok(())
            }
            _ => Err(QueryError::invalid_operand(
                name,
                operand,
                "expected an object with lower and upper",
            )),
        },
        Operator::Like | Operator::NotLike | Operator::ILike | Operator::NotILike => {
            match operand {
                Value::String(_) => Ok(()),
                _ => Err(QueryError::invalid_operand(
                    name,
                    operand,
                    "expected a string pattern",
                )),
            }
        }
        _ => Ok(()),
    }
}

/// `lower`/`upper` of an already validated range operand
pub(crate) fn range_bounds(operand: &Value) -> (&Value, &Value) {
    (&operand["lower"], &operand["upper"])
}
