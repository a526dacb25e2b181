//! Declarative filter trees.
//!
//! A [`Filter`] is a boolean tree: explicit `and`/`or` child lists plus field
//! entries that combine by implicit AND. Each field entry is either a set of
//! comparisons on that field or a nested filter scoped to a relation of the same
//! name. Filters are immutable once built; the compiler and resolver only read them.
//!
//! # Wire format
//!
//! ```
//! use querygraph::filter::Filter;
//!
//! let filter: Filter = serde_json::from_value(serde_json::json!({
//!     "or": [{ "status": { "eq": "open" } }, { "status": { "eq": "pending" } }],
//!     "priority": { "gte": 3 },
//!     "author": { "name": { "iLike": "jo%" } }
//! }))
//! .unwrap();
//! assert_eq!(filter.or.len(), 2);
//! ```

pub mod compiler;
pub mod eval;
pub mod operator;

use crate::error::{QueryError, QueryResult};
use operator::Operator;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub use compiler::compile;
pub use operator::{map, Fragment};

/// One `operator: operand` pair on a field
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Operator name as supplied by the caller; validated at compile time
    pub operator: String,
    pub operand: Value,
}

impl Comparison {
    pub fn new(operator: impl Into<String>, operand: impl Into<Value>) -> Self {
        Self {
            operator: operator.into(),
            operand: operand.into(),
        }
    }
}

/// Value of a field entry
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    /// Comparisons on the field itself, combined by AND
    Comparisons(Vec<Comparison>),
    /// Filter over the related entity reached through the field's relation
    Relation(Box<Filter>),
}

/// Boolean filter tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Filter {
    pub and: Vec<Filter>,
    pub or: Vec<Filter>,
    /// Field entries. Builders keep call order; parsed JSON comes back sorted by key.
    pub fields: Vec<(String, FieldFilter)>,
}

impl Filter {
    /// Empty filter (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter whose only content is an explicit `and` list
    pub fn all_of(children: impl IntoIterator<Item = Filter>) -> Self {
        Self {
            and: children.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Filter whose only content is an explicit `or` list
    pub fn any_of(children: impl IntoIterator<Item = Filter>) -> Self {
        Self {
            or: children.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Add a comparison on `field`, merging into an existing comparison entry
    pub fn compare(
        mut self,
        field: impl Into<String>,
        operator: impl Into<String>,
        operand: impl Into<Value>,
    ) -> Self {
        let field = field.into();
        let comparison = Comparison::new(operator, operand);
        let existing = self.fields.iter_mut().find_map(|(name, value)| match value {
            FieldFilter::Comparisons(list) if *name == field => Some(list),
            _ => None,
        });
        match existing {
            Some(list) => list.push(comparison),
            None => self
                .fields
                .push((field, FieldFilter::Comparisons(vec![comparison]))),
        }
        self
    }

    /// Add a nested filter over the relation named `relation`
    pub fn relation(mut self, relation: impl Into<String>, filter: Filter) -> Self {
        self.fields
            .push((relation.into(), FieldFilter::Relation(Box::new(filter))));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.and.is_empty() && self.or.is_empty() && self.fields.is_empty()
    }

    /// AND two filters together, dropping empty sides
    pub fn merge(base: Filter, other: Filter) -> Filter {
        match (base.is_empty(), other.is_empty()) {
            (true, _) => other,
            (_, true) => base,
            _ => Filter::all_of([base, other]),
        }
    }

    /// Every field name referenced anywhere in the tree, relation names included
    pub fn field_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_field_names(&mut names);
        names
    }

    fn collect_field_names(&self, names: &mut BTreeSet<String>) {
        for child in self.and.iter().chain(self.or.iter()) {
            child.collect_field_names(names);
        }
        for (name, value) in &self.fields {
            names.insert(name.clone());
            if let FieldFilter::Relation(sub) = value {
                sub.collect_field_names(names);
            }
        }
    }

    /// Parse the JSON wire form
    pub fn from_json(value: &Value) -> QueryResult<Self> {
        let Value::Object(map) = value else {
            return Err(QueryError::InvalidFilter(format!(
                "expected an object, got {value}"
            )));
        };
        let mut filter = Filter::default();
        for (key, entry) in map {
            match key.as_str() {
                "and" => filter.and = parse_children(key, entry)?,
                "or" => filter.or = parse_children(key, entry)?,
                _ => filter.fields.push((key.clone(), parse_field(key, entry)?)),
            }
        }
        Ok(filter)
    }

    /// Render back into the JSON wire form
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        if !self.and.is_empty() {
            map.insert("and".into(), Value::Array(self.and.iter().map(Filter::to_json).collect()));
        }
        if !self.or.is_empty() {
            map.insert("or".into(), Value::Array(self.or.iter().map(Filter::to_json).collect()));
        }
        for (name, value) in &self.fields {
            let rendered = match value {
                FieldFilter::Comparisons(list) => Value::Object(
                    list.iter()
                        .map(|c| (c.operator.clone(), c.operand.clone()))
                        .collect(),
                ),
                FieldFilter::Relation(sub) => sub.to_json(),
            };
            map.insert(name.clone(), rendered);
        }
        Value::Object(map)
    }
}

fn parse_children(key: &str, value: &Value) -> QueryResult<Vec<Filter>> {
    match value {
        Value::Array(items) => items.iter().map(Filter::from_json).collect(),
        other => Err(QueryError::InvalidFilter(format!(
            "`{key}` must be an array of filters, got {other}"
        ))),
    }
}

fn parse_field(field: &str, value: &Value) -> QueryResult<FieldFilter> {
    let Value::Object(entries) = value else {
        return Err(QueryError::InvalidFilter(format!(
            "field `{field}` must map to an object of comparisons or a relation filter, got {value}"
        )));
    };
    let has_operator = entries.keys().any(|k| Operator::is_known(k));
    let looks_nested = entries.values().all(|v| v.is_object() || v.is_array());
    if !has_operator && looks_nested {
        return Ok(FieldFilter::Relation(Box::new(Filter::from_json(value)?)));
    }
    Ok(FieldFilter::Comparisons(
        entries
            .iter()
            .map(|(op, operand)| Comparison::new(op.clone(), operand.clone()))
            .collect(),
    ))
}

impl TryFrom<Value> for Filter {
    type Error = QueryError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Filter::from_json(&value)
    }
}

impl From<Filter> for Value {
    fn from(filter: Filter) -> Self {
        filter.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_comparisons_and_groups() {
        let filter = Filter::from_json(&json!({
            "or": [{"a": {"eq": 1}}, {"a": {"eq": 2}}],
            "b": {"eq": 3, "neq": 4}
        }))
        .unwrap();
        assert_eq!(filter.or.len(), 2);
        assert!(filter.and.is_empty());
        assert_eq!(
            filter.fields,
            vec![(
                "b".to_string(),
                FieldFilter::Comparisons(vec![Comparison::new("eq", 3), Comparison::new("neq", 4)])
            )]
        );
    }

    #[test]
    fn test_field_order_of_parsed_and_built_filters() {
        let parsed = Filter::from_json(&json!({"b": {"eq": 1}, "a": {"eq": 2}})).unwrap();
        let names: Vec<&str> = parsed.fields.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"], "JSON objects are read in key order");

        let built = Filter::new().compare("b", "eq", 1).compare("a", "eq", 2);
        let names: Vec<&str> = built.fields.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_parse_nested_relation_filter() {
        let filter = Filter::from_json(&json!({"author": {"name": {"eq": "ann"}}})).unwrap();
        let expected = Filter::new().relation("author", Filter::new().compare("name", "eq", "ann"));
        assert_eq!(filter, expected);
    }

    #[test]
    fn test_parse_relation_with_groups() {
        let filter = Filter::from_json(&json!({"author": {"or": [{"age": {"gt": 3}}]}})).unwrap();
        match &filter.fields[0].1 {
            FieldFilter::Relation(sub) => assert_eq!(sub.or.len(), 1),
            other => panic!("expected relation filter, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_operator_is_kept_as_comparison() {
        // EDGE CASE: scalar values under unknown keys are comparisons, so the
        // compiler can report the operator instead of treating it as a relation
        let filter = Filter::from_json(&json!({"a": {"bogus": 1}})).unwrap();
        assert_eq!(
            filter.fields[0].1,
            FieldFilter::Comparisons(vec![Comparison::new("bogus", 1)])
        );
    }

    #[test]
    fn test_parse_rejects_malformed_shapes() {
        assert!(matches!(Filter::from_json(&json!([])), Err(QueryError::InvalidFilter(_))));
        assert!(matches!(Filter::from_json(&json!({"and": {}})), Err(QueryError::InvalidFilter(_))));
        assert!(matches!(Filter::from_json(&json!({"a": 5})), Err(QueryError::InvalidFilter(_))));
    }

    #[test]
    fn test_compare_merges_same_field() {
        let filter = Filter::new().compare("n", "gt", 10).compare("n", "lt", 20);
        assert_eq!(filter.fields.len(), 1);
        assert_eq!(
            filter.fields[0].1,
            FieldFilter::Comparisons(vec![Comparison::new("gt", 10), Comparison::new("lt", 20)])
        );
    }

    #[test]
    fn test_merge_drops_empty_side() {
        let f = Filter::new().compare("a", "eq", 1);
        assert_eq!(Filter::merge(Filter::new(), f.clone()), f);
        assert_eq!(Filter::merge(f.clone(), Filter::new()), f);
        let merged = Filter::merge(f.clone(), f.clone());
        assert_eq!(merged.and.len(), 2);
    }

    #[test]
    fn test_field_names_walks_every_branch() {
        let filter = Filter::from_json(&json!({
            "and": [{"a": {"eq": 1}}],
            "or": [{"author": {"name": {"eq": "x"}}}],
            "b": {"eq": 2}
        }))
        .unwrap();
        let names: Vec<String> = filter.field_names().into_iter().collect();
        assert_eq!(names, vec!["a", "author", "b", "name"]);
    }

    #[test]
    fn test_serde_round_trip() {
        let source = json!({
            "and": [{"a": {"in": [1, 2]}}],
            "author": {"name": {"like": "a%"}}
        });
        let filter: Filter = serde_json::from_value(source.clone()).unwrap();
        assert_eq!(serde_json::to_value(&filter).unwrap(), source);
    }
}
