//! Aggregate alias codec.
//!
//! Result columns are aliased `{FUNCTION}_{field}` (`COUNT_id`, `AVG_price`) and
//! group-by columns `GROUP_BY_{field}`. Decoding parses each key of a result row
//! back into its function and field, so `decode` exactly inverts `encode`.

use super::{AggregateFunction, AggregateQuery, AggregateResponse};
use crate::error::{QueryError, QueryResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

const GROUP_BY_PREFIX: &str = "GROUP_BY";

static ALIAS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^(AVG|SUM|COUNT|MAX|MIN|GROUP_BY)_(.*)$").expect("alias pattern is valid")
});

/// One selected aggregate expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AggregateExpr {
    /// Grouping column
    GroupBy(String),
    /// Function applied to a column
    Function(AggregateFunction, String),
}

impl AggregateExpr {
    pub fn field(&self) -> &str {
        match self {
            AggregateExpr::GroupBy(field) | AggregateExpr::Function(_, field) => field,
        }
    }

    /// Result column alias
    pub fn alias(&self) -> String {
        match self {
            AggregateExpr::GroupBy(field) => format!("{GROUP_BY_PREFIX}_{field}"),
            AggregateExpr::Function(function, field) => {
                format!("{}_{}", function.alias_prefix(), field)
            }
        }
    }

    /// Parse a result column alias
    ///
    /// # Errors
    ///
    /// `AggregateDecode` when the alias does not carry a known prefix.
    pub fn parse_alias(alias: &str) -> QueryResult<Self> {
        let captures = ALIAS_PATTERN
            .captures(alias)
            .ok_or_else(|| QueryError::AggregateDecode {
                alias: alias.to_string(),
            })?;
        let prefix = &captures[1];
        let field = captures[2].to_string();
        if prefix.eq_ignore_ascii_case(GROUP_BY_PREFIX) {
            return Ok(AggregateExpr::GroupBy(field));
        }
        AggregateFunction::from_alias_prefix(prefix)
            .map(|function| AggregateExpr::Function(function, field))
            .ok_or_else(|| QueryError::AggregateDecode {
                alias: alias.to_string(),
            })
    }
}

/// Expressions and aliases for an aggregate request
///
/// Group-by columns come first, then functions in `count, sum, avg, max, min`
/// order, each keeping the caller's field order.
pub fn encode(query: &AggregateQuery) -> Vec<(AggregateExpr, String)> {
    let group_by = query
        .group_by
        .iter()
        .map(|field| AggregateExpr::GroupBy(field.clone()));
    let functions = AggregateFunction::ALL.into_iter().flat_map(|function| {
        query
            .fields(function)
            .iter()
            .map(move |field| AggregateExpr::Function(function, field.clone()))
    });
    group_by
        .chain(functions)
        .map(|expr| {
            let alias = expr.alias();
            (expr, alias)
        })
        .collect()
}

/// Decode one result row keyed by aliases
pub fn decode_row(row: &Map<String, Value>) -> QueryResult<AggregateResponse> {
    let mut response = AggregateResponse::default();
    for (alias, value) in row {
        match AggregateExpr::parse_alias(alias)? {
            AggregateExpr::GroupBy(field) => {
                response.group_by_mut().insert(field, value.clone());
            }
            AggregateExpr::Function(function, field) => {
                response.bucket_mut(function).insert(field, value.clone());
            }
        }
    }
    Ok(response)
}

/// Decode every result row
///
/// # Errors
///
/// `AggregateDecode` for the first key that is not an aggregate alias.
pub fn decode(rows: &[Map<String, Value>]) -> QueryResult<Vec<AggregateResponse>> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::decode_aggregate_span(rows.len()).entered();

    let responses = rows.iter().map(decode_row).collect::<QueryResult<Vec<_>>>();

    #[cfg(feature = "metrics")]
    if responses.is_ok() {
        METRICS.record_decoded_rows(rows.len());
    }

    if let Err(err) = &responses {
        log::debug!("aggregate decode failed: {}", err);
    }
    responses
}
