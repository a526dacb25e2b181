//! In-memory filter evaluation.
//!
//! Evaluates a [`Filter`] against an already loaded JSON record using the same
//! operator semantics the SQL lowering has. Operand validation is shared with the
//! operator mapper, so a filter that fails to compile also fails to evaluate.

use super::operator::{self, Operator};
use super::{Comparison, FieldFilter, Filter};
use crate::error::QueryResult;
use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;

/// Test whether `record` satisfies `filter`
///
/// Missing fields read as `null`. A relation entry matches when the nested
/// object matches, or when any element of a nested array matches.
///
/// # Errors
///
/// Every comparison in the tree is validated before evaluation starts, so a
/// bad operand fails even in a branch the record would never reach.
pub fn matches(filter: &Filter, record: &Value) -> QueryResult<bool> {
    validate_tree(filter)?;
    evaluate(filter, record)
}

fn validate_tree(filter: &Filter) -> QueryResult<()> {
    for child in filter.and.iter().chain(filter.or.iter()) {
        validate_tree(child)?;
    }
    for (_, value) in &filter.fields {
        match value {
            FieldFilter::Comparisons(comparisons) => {
                for c in comparisons {
                    let op: Operator = c.operator.parse()?;
                    operator::validate(op, &c.operator, &c.operand)?;
                }
            }
            FieldFilter::Relation(sub) => validate_tree(sub)?,
        }
    }
    Ok(())
}

fn evaluate(filter: &Filter, record: &Value) -> QueryResult<bool> {
    for child in &filter.and {
        if !evaluate(child, record)? {
            return Ok(false);
        }
    }

    if !filter.or.is_empty() {
        let mut any = false;
        for child in &filter.or {
            if evaluate(child, record)? {
                any = true;
                break;
            }
        }
        if !any {
            return Ok(false);
        }
    }

    for (field, value) in &filter.fields {
        let actual = record.get(field).unwrap_or(&Value::Null);
        let ok = match value {
            FieldFilter::Comparisons(comparisons) => all_hold(comparisons, actual)?,
            FieldFilter::Relation(sub) => match actual {
                Value::Array(items) => {
                    let mut hit = false;
                    for item in items {
                        if evaluate(sub, item)? {
                            hit = true;
                            break;
                        }
                    }
                    hit
                }
                Value::Object(_) => evaluate(sub, actual)?,
                _ => false,
            },
        };
        if !ok {
            return Ok(false);
        }
    }

    Ok(true)
}

fn all_hold(comparisons: &[Comparison], actual: &Value) -> QueryResult<bool> {
    for c in comparisons {
        if !holds(&c.operator, &c.operand, actual)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn holds(name: &str, operand: &Value, actual: &Value) -> QueryResult<bool> {
    let op: Operator = name.parse()?;
    Ok(match op {
        Operator::Eq | Operator::Is => loosely_equal(actual, operand),
        Operator::Neq | Operator::IsNot => !loosely_equal(actual, operand),
        Operator::Gt => order(actual, operand) == Some(Ordering::Greater),
        Operator::Gte => matches!(order(actual, operand), Some(Ordering::Greater | Ordering::Equal)),
        Operator::Lt => order(actual, operand) == Some(Ordering::Less),
        Operator::Lte => matches!(order(actual, operand), Some(Ordering::Less | Ordering::Equal)),
        Operator::Like => like(actual, operand, false),
        Operator::NotLike => !like(actual, operand, false),
        Operator::ILike => like(actual, operand, true),
        Operator::NotILike => !like(actual, operand, true),
        Operator::In => in_list(actual, operand),
        Operator::NotIn => !in_list(actual, operand),
        Operator::Between => {
            let (lower, upper) = operator::range_bounds(operand);
            matches!(order(actual, lower), Some(Ordering::Greater | Ordering::Equal))
                && matches!(order(actual, upper), Some(Ordering::Less | Ordering::Equal))
        }
        Operator::NotBetween => {
            let (lower, upper) = operator::range_bounds(operand);
            order(actual, lower) == Some(Ordering::Less)
                || order(actual, upper) == Some(Ordering::Greater)
        }
    })
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn in_list(actual: &Value, operand: &Value) -> bool {
    operand
        .as_array()
        .is_some_and(|items| items.iter().any(|item| loosely_equal(actual, item)))
}

fn like(actual: &Value, pattern: &Value, case_insensitive: bool) -> bool {
    let (Some(text), Some(pattern)) = (actual.as_str(), pattern.as_str()) else {
        return false;
    };
    let mut source = String::with_capacity(pattern.len() + 2);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    source.push('$');
    RegexBuilder::new(&source)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}
