//! Aggregate requests and responses.
//!
//! An [`AggregateQuery`] lists the fields to group by and the fields to feed to
//! each aggregate function. Results come back as one [`AggregateResponse`] per
//! result row, with a bucket per function (`count`, `sum`, `avg`, `max`, `min`)
//! and a separate `groupBy` bucket.

pub mod codec;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub use codec::{decode, decode_row, encode, AggregateExpr};

/// Aggregate function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggregateFunction {
    pub const ALL: [AggregateFunction; 5] = [
        AggregateFunction::Count,
        AggregateFunction::Sum,
        AggregateFunction::Avg,
        AggregateFunction::Max,
        AggregateFunction::Min,
    ];

    /// Upper-case name used in column aliases
    pub fn alias_prefix(self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Min => "MIN",
        }
    }

    /// Lower-camel name used in responses
    pub fn response_key(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Max => "max",
            AggregateFunction::Min => "min",
        }
    }

    pub fn from_alias_prefix(prefix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.alias_prefix().eq_ignore_ascii_case(prefix))
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.response_key())
    }
}

/// Aggregate request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateQuery {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub count: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sum: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub avg: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub max: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub min: Vec<String>,
}

impl AggregateQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.group_by.push(field.into());
        self
    }

    /// Request `function` over `field`
    pub fn with(mut self, function: AggregateFunction, field: impl Into<String>) -> Self {
        self.fields_mut(function).push(field.into());
        self
    }

    /// Fields requested for `function`
    pub fn fields(&self, function: AggregateFunction) -> &[String] {
        match function {
            AggregateFunction::Count => &self.count,
            AggregateFunction::Sum => &self.sum,
            AggregateFunction::Avg => &self.avg,
            AggregateFunction::Max => &self.max,
            AggregateFunction::Min => &self.min,
        }
    }

    fn fields_mut(&mut self, function: AggregateFunction) -> &mut Vec<String> {
        match function {
            AggregateFunction::Count => &mut self.count,
            AggregateFunction::Sum => &mut self.sum,
            AggregateFunction::Avg => &mut self.avg,
            AggregateFunction::Max => &mut self.max,
            AggregateFunction::Min => &mut self.min,
        }
    }

    /// True when neither group-by nor any function has fields
    pub fn is_empty(&self) -> bool {
        self.group_by.is_empty()
            && AggregateFunction::ALL
                .into_iter()
                .all(|f| self.fields(f).is_empty())
    }
}

/// Bucket of `field -> value`
pub type AggregateBucket = BTreeMap<String, Value>;

/// Decoded aggregate result for one row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<AggregateBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<AggregateBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<AggregateBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg: Option<AggregateBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<AggregateBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<AggregateBucket>,
}

impl AggregateResponse {
    /// Bucket for `function`, if the row carried any of its columns
    pub fn bucket(&self, function: AggregateFunction) -> Option<&AggregateBucket> {
        match function {
            AggregateFunction::Count => self.count.as_ref(),
            AggregateFunction::Sum => self.sum.as_ref(),
            AggregateFunction::Avg => self.avg.as_ref(),
            AggregateFunction::Max => self.max.as_ref(),
            AggregateFunction::Min => self.min.as_ref(),
        }
    }

    pub(crate) fn bucket_mut(&mut self, function: AggregateFunction) -> &mut AggregateBucket {
        let slot = match function {
            AggregateFunction::Count => &mut self.count,
            AggregateFunction::Sum => &mut self.sum,
            AggregateFunction::Avg => &mut self.avg,
            AggregateFunction::Max => &mut self.max,
            AggregateFunction::Min => &mut self.min,
        };
        slot.get_or_insert_with(BTreeMap::new)
    }

    pub(crate) fn group_by_mut(&mut self) -> &mut AggregateBucket {
        self.group_by.get_or_insert_with(BTreeMap::new)
    }
}
