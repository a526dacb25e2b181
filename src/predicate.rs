//! Compiled predicate representation.
//!
//! `Predicate` is the executable form of a [`Filter`](crate::filter::Filter). It is a
//! small closed tree that the query-execution layer lowers into a SeaQuery
//! `Condition` via [`Predicate::to_condition`]. Keeping our own tree (instead of
//! handing out `Condition` directly) lets callers inspect and combine predicates
//! before any SQL exists.

use sea_query::{Alias, Condition, Expr, ExprTrait, Func};
use serde_json::Value as JsonValue;

/// Reference to a column, optionally qualified by the relation path it was reached through
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    /// Relations traversed from the root entity, outermost first
    pub relation_path: Vec<String>,
    /// Property name on the entity at the end of the path
    pub field: String,
}

impl ColumnRef {
    /// Unqualified column on the root entity
    pub fn field(field: impl Into<String>) -> Self {
        Self {
            relation_path: Vec::new(),
            field: field.into(),
        }
    }

    /// Column on a related entity reached through `relation`
    pub fn qualified(relation: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            relation_path: vec![relation.into()],
            field: field.into(),
        }
    }

    /// Column reached through an arbitrary relation path
    pub fn with_path(relation_path: Vec<String>, field: impl Into<String>) -> Self {
        Self {
            relation_path,
            field: field.into(),
        }
    }

    /// Table alias used when lowering: the innermost relation name
    pub fn qualifier(&self) -> Option<&str> {
        self.relation_path.last().map(String::as_str)
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.qualifier() {
            Some(q) => write!(f, "{}.{}", q, self.field),
            None => write!(f, "{}", self.field),
        }
    }
}

/// Primitive comparison understood by the execution layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
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
}

/// Compiled boolean predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Always true (the empty filter)
    True,
    /// Conjunction of children
    All(Vec<Predicate>),
    /// Disjunction of children
    Any(Vec<Predicate>),
    /// Single column comparison
    Compare {
        column: ColumnRef,
        op: CompareOp,
        value: JsonValue,
    },
}

impl Predicate {
    /// Build a comparison leaf
    pub fn compare(column: ColumnRef, op: CompareOp, value: impl Into<JsonValue>) -> Self {
        Predicate::Compare {
            column,
            op,
            value: value.into(),
        }
    }

    /// Conjunction that drops always-true children and never wraps a single child
    pub fn all(children: impl IntoIterator<Item = Predicate>) -> Self {
        let mut kept: Vec<Predicate> = children
            .into_iter()
            .filter(|p| !p.is_true())
            .collect();
        match kept.len() {
            0 => Predicate::True,
            1 => kept.remove(0),
            _ => Predicate::All(kept),
        }
    }

    /// Disjunction; an always-true child makes the whole disjunction true
    pub fn any(children: impl IntoIterator<Item = Predicate>) -> Self {
        let mut kept: Vec<Predicate> = Vec::new();
        for child in children {
            if child.is_true() {
                return Predicate::True;
            }
            kept.push(child);
        }
        match kept.len() {
            0 => Predicate::True,
            1 => kept.remove(0),
            _ => Predicate::Any(kept),
        }
    }

    /// AND another predicate onto this one
    pub fn and(self, other: Predicate) -> Self {
        Predicate::all([self, other])
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Predicate::True)
    }

    /// Every column referenced by this predicate, in traversal order
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Predicate::True => {}
            Predicate::All(children) | Predicate::Any(children) => {
                for child in children {
                    child.collect_columns(out);
                }
            }
            Predicate::Compare { column, .. } => out.push(column),
        }
    }

    /// Lower into a SeaQuery condition using property names verbatim
    pub fn to_condition(&self) -> Condition {
        self.to_condition_with(&RawNaming)
    }

    /// Lower into a SeaQuery condition, mapping columns through `naming`
    pub fn to_condition_with(&self, naming: &dyn ColumnNaming) -> Condition {
        match self {
            Predicate::True => Condition::all(),
            Predicate::All(children) => children
                .iter()
                .fold(Condition::all(), |cond, child| cond.add(child.to_condition_with(naming))),
            Predicate::Any(children) => children
                .iter()
                .fold(Condition::any(), |cond, child| cond.add(child.to_condition_with(naming))),
            Predicate::Compare { column, op, value } => {
                Condition::all().add(lower_comparison(naming.column_expr(column), *op, value))
            }
        }
    }
}

/// Maps a [`ColumnRef`] to the SQL column expression used when lowering
pub trait ColumnNaming {
    /// Table qualifier and column name for `column`
    fn resolve(&self, column: &ColumnRef) -> (Option<String>, String);

    fn column_expr(&self, column: &ColumnRef) -> Expr {
        match self.resolve(column) {
            (Some(table), name) => Expr::col((Alias::new(table), Alias::new(name))),
            (None, name) => Expr::col(Alias::new(name)),
        }
    }
}

/// Uses relation aliases and property names as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct RawNaming;

impl ColumnNaming for RawNaming {
    fn resolve(&self, column: &ColumnRef) -> (Option<String>, String) {
        (column.qualifier().map(str::to_string), column.field.clone())
    }
}

fn lower_comparison(col: Expr, op: CompareOp, value: &JsonValue) -> Expr {
    match op {
        CompareOp::Eq if value.is_null() => col.is_null(),
        CompareOp::Ne if value.is_null() => col.is_not_null(),
        CompareOp::Eq => col.eq(json_to_value(value)),
        CompareOp::Ne => col.ne(json_to_value(value)),
        CompareOp::Gt => col.gt(json_to_value(value)),
        CompareOp::Gte => col.gte(json_to_value(value)),
        CompareOp::Lt => col.lt(json_to_value(value)),
        CompareOp::Lte => col.lte(json_to_value(value)),
        CompareOp::Like => col.like(pattern_text(value)),
        CompareOp::NotLike => col.not_like(pattern_text(value)),
        CompareOp::ILike => Expr::from(Func::lower(col)).like(pattern_text(value).to_lowercase()),
        CompareOp::NotILike => {
            Expr::from(Func::lower(col)).not_like(pattern_text(value).to_lowercase())
        }
        CompareOp::In => col.is_in(list_values(value)),
        CompareOp::NotIn => col.is_not_in(list_values(value)),
        CompareOp::Is => match value {
            JsonValue::Bool(b) => col.is(*b),
            _ => col.is_null(),
        },
        CompareOp::IsNot => match value {
            JsonValue::Bool(b) => col.is_not(*b),
            _ => col.is_not_null(),
        },
    }
}

fn pattern_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn list_values(value: &JsonValue) -> Vec<sea_query::Value> {
    match value {
        JsonValue::Array(items) => items.iter().map(json_to_value).collect(),
        other => vec![json_to_value(other)],
    }
}

/// Convert a JSON operand into a bindable SeaQuery value
///
/// Integers keep their width (`BigInt`/`BigUnsigned`), other numbers become
/// `Double`, and arrays/objects are bound as JSON.
pub fn json_to_value(value: &JsonValue) -> sea_query::Value {
    match value {
        JsonValue::Null => sea_query::Value::String(None),
        JsonValue::Bool(b) => sea_query::Value::Bool(Some(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                sea_query::Value::BigInt(Some(i))
            } else if let Some(u) = n.as_u64() {
                sea_query::Value::BigUnsigned(Some(u))
            } else {
                sea_query::Value::Double(n.as_f64())
            }
        }
        JsonValue::String(s) => sea_query::Value::String(Some(s.clone())),
        other => sea_query::Value::Json(Some(Box::new(other.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{PostgresQueryBuilder, Query};
    use serde_json::json;

    fn render(predicate: &Predicate) -> String {
        let mut query = Query::select();
        query
            .column(Alias::new("id"))
            .from(Alias::new("items"))
            .cond_where(predicate.to_condition());
        query.to_string(PostgresQueryBuilder)
    }

    #[test]
    fn test_all_collapses_single_child() {
        let leaf = Predicate::compare(ColumnRef::field("a"), CompareOp::Eq, 1);
        assert_eq!(Predicate::all([leaf.clone()]), leaf);
        assert_eq!(Predicate::all([Predicate::True, leaf.clone()]), leaf);
    }

    #[test]
    fn test_empty_groups_are_true() {
        assert_eq!(Predicate::all(Vec::new()), Predicate::True);
        assert_eq!(Predicate::any(Vec::new()), Predicate::True);
    }

    #[test]
    fn test_any_with_true_child_is_true() {
        let leaf = Predicate::compare(ColumnRef::field("a"), CompareOp::Eq, 1);
        assert_eq!(Predicate::any([leaf, Predicate::True]), Predicate::True);
    }

    #[test]
    fn test_lowering_comparisons() {
        let predicate = Predicate::all([
            Predicate::compare(ColumnRef::field("age"), CompareOp::Gt, 10),
            Predicate::compare(ColumnRef::field("age"), CompareOp::Lt, 20),
        ]);
        let sql = render(&predicate);
        assert!(sql.contains(r#""age" > 10"#), "sql: {sql}");
        assert!(sql.contains(r#""age" < 20"#), "sql: {sql}");
        assert!(sql.contains(" AND "), "sql: {sql}");
    }

    #[test]
    fn test_lowering_null_equality_uses_is_null() {
        let sql = render(&Predicate::compare(ColumnRef::field("deleted_at"), CompareOp::Eq, JsonValue::Null));
        assert!(sql.contains(r#""deleted_at" IS NULL"#), "sql: {sql}");
    }

    #[test]
    fn test_lowering_qualified_column() {
        let sql = render(&Predicate::compare(ColumnRef::qualified("author", "name"), CompareOp::Eq, "ann"));
        assert!(sql.contains(r#""author"."name" = 'ann'"#), "sql: {sql}");
    }

    #[test]
    fn test_lowering_in_list() {
        let sql = render(&Predicate::compare(ColumnRef::field("id"), CompareOp::In, json!([1, 2, 3])));
        assert!(sql.contains(r#""id" IN (1, 2, 3)"#), "sql: {sql}");
    }

    #[test]
    fn test_lowering_ilike_is_backend_neutral() {
        let sql = render(&Predicate::compare(ColumnRef::field("name"), CompareOp::ILike, "Jo%"));
        assert!(sql.contains("LOWER"), "sql: {sql}");
        assert!(sql.contains("'jo%'"), "sql: {sql}");
    }

    #[test]
    fn test_columns_in_traversal_order() {
        let predicate = Predicate::any([
            Predicate::compare(ColumnRef::field("a"), CompareOp::Eq, 1),
            Predicate::compare(ColumnRef::qualified("rel", "b"), CompareOp::Eq, 2),
        ]);
        let cols: Vec<String> = predicate.columns().iter().map(|c| c.to_string()).collect();
        assert_eq!(cols, vec!["a".to_string(), "rel.b".to_string()]);
    }

    #[test]
    fn test_json_to_value_widths() {
        assert_eq!(json_to_value(&json!(5)), sea_query::Value::BigInt(Some(5)));
        assert_eq!(json_to_value(&json!(u64::MAX)), sea_query::Value::BigUnsigned(Some(u64::MAX)));
        assert_eq!(json_to_value(&json!(1.5)), sea_query::Value::Double(Some(1.5)));
        assert_eq!(json_to_value(&json!("x")), sea_query::Value::String(Some("x".to_string())));
    }
}
