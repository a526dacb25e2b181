//! Query assembler.
//!
//! Turns a [`Query`] or an [`AggregateQuery`] into a selection descriptor: the
//! compiled predicate plus sorting and paging, ready for the execution layer.
//! Descriptors can also be rendered into a SeaQuery `SelectStatement`, in which
//! case property names are mapped to column names through the metadata
//! provider.
//!
//! Columns reached through relations are qualified by the relation name. The
//! joins that bring those aliases into scope are planned by the execution layer
//! from [`SelectionDescriptor::relations`].
//!
//! # Example
//!
//! ```
//! use querygraph::query::{Query, QueryAssembler, SortField};
//! use querygraph::filter::Filter;
//! use querygraph::relation::{EntityMeta, MetadataRegistry};
//! use querygraph::config::SqlBackend;
//!
//! let registry = MetadataRegistry::from_entities([EntityMeta::new("Post", ["id"]).table("posts")]);
//! let query = Query::new()
//!     .filter(Filter::new().compare("views", "gt", 10))
//!     .sort(SortField::desc("views"))
//!     .limit(20);
//!
//! let selection = QueryAssembler::new(&registry, "Post").selection(&query).unwrap();
//! let sql = SqlBackend::Postgres.render(&selection.to_statement(&registry));
//! assert_eq!(
//!     sql,
//!     r#"SELECT * FROM "posts" WHERE "views" > 10 ORDER BY "views" DESC LIMIT 20"#
//! );
//! ```

use super::{Query, SortDirection, SortField, SortNulls};
use crate::aggregate::{self, AggregateExpr, AggregateFunction, AggregateQuery};
use crate::config::QueryConfig;
use crate::error::{QueryError, QueryResult};
use crate::filter::{self, Filter};
use crate::predicate::{ColumnNaming, ColumnRef, Predicate};
use crate::relation::metadata::MetadataProvider;
use crate::relation::resolver::{predicate_relations, referenced_relations, RelationTree};
use sea_query::{Alias, Asterisk, Expr, Func, NullOrdering, Order, SelectStatement};

/// Assembles selections for one entity type against an explicit metadata handle
pub struct QueryAssembler<'a> {
    provider: &'a dyn MetadataProvider,
    entity_type: String,
}

impl<'a> QueryAssembler<'a> {
    pub fn new(provider: &'a dyn MetadataProvider, entity_type: impl Into<String>) -> Self {
        Self {
            provider,
            entity_type: entity_type.into(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Compile the filter and carry sorting and paging over
    ///
    /// A missing `limit` stays unbounded; a missing `offset` is 0.
    pub fn selection(&self, query: &Query) -> QueryResult<SelectionDescriptor> {
        let predicate = filter::compile(&query.filter)?;
        let relations = referenced_relations(self.provider, &self.entity_type, &query.filter);
        Ok(SelectionDescriptor {
            entity_type: self.entity_type.clone(),
            predicate,
            sorting: query.sorting.clone(),
            limit: query.paging.limit,
            offset: query.paging.offset.unwrap_or(0),
            relations,
        })
    }

    /// Selection counting the rows that match `filter`
    pub fn count(&self, filter: &Filter) -> QueryResult<CountSelection> {
        Ok(CountSelection {
            entity_type: self.entity_type.clone(),
            predicate: filter::compile(filter)?,
            relations: referenced_relations(self.provider, &self.entity_type, filter),
        })
    }

    /// Aggregate selection over the rows that match `filter`
    ///
    /// # Errors
    ///
    /// `NoAggregateFields` when `aggregate` names no fields at all.
    pub fn aggregate(
        &self,
        filter: &Filter,
        aggregate: &AggregateQuery,
    ) -> QueryResult<AggregateSelection> {
        if aggregate.is_empty() {
            return Err(QueryError::NoAggregateFields);
        }
        let predicate = filter::compile(filter)?;
        Ok(AggregateSelection {
            entity_type: self.entity_type.clone(),
            predicate,
            columns: aggregate::encode(aggregate),
            group_by: aggregate.group_by.clone(),
            // grouped rows come back in a stable order
            sorting: aggregate.group_by.iter().map(SortField::asc).collect(),
            relations: referenced_relations(self.provider, &self.entity_type, filter),
        })
    }

    /// Column naming rooted at this assembler's entity type
    pub fn naming(&self) -> MetadataNaming<'_> {
        MetadataNaming::new(self.provider, &self.entity_type)
    }
}

/// Compiled selection for the execution layer
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionDescriptor {
    pub entity_type: String,
    pub predicate: Predicate,
    pub sorting: Vec<SortField>,
    /// `None` means no limit
    pub limit: Option<u64>,
    pub offset: u64,
    /// Relations the predicate reaches into, for join planning
    pub relations: RelationTree,
}

impl SelectionDescriptor {
    /// AND `extra` onto the compiled predicate
    ///
    /// Relations `extra` reaches into join `relations`.
    pub fn and_predicate(mut self, provider: &dyn MetadataProvider, extra: Predicate) -> Self {
        self.relations
            .merge(predicate_relations(provider, &self.entity_type, &extra));
        self.predicate = self.predicate.and(extra);
        self
    }

    /// Apply predicate, sorting and paging onto a caller's base statement
    pub fn apply_to(&self, provider: &dyn MetadataProvider, statement: &mut SelectStatement) {
        let naming = MetadataNaming::new(provider, &self.entity_type);
        apply_predicate(statement, &self.predicate, &naming);
        apply_sorting(statement, &self.sorting, &naming);
        if let Some(limit) = self.limit {
            statement.limit(limit);
        }
        if self.offset > 0 {
            statement.offset(self.offset);
        }
    }

    /// `SELECT * FROM <table> ...`
    pub fn to_statement(&self, provider: &dyn MetadataProvider) -> SelectStatement {
        let mut statement = base_statement(provider, &self.entity_type);
        statement.column(Asterisk);
        self.apply_to(provider, &mut statement);
        statement
    }

    /// Render for the configured backend
    pub fn to_sql(&self, provider: &dyn MetadataProvider, config: &QueryConfig) -> String {
        config.render(&self.to_statement(provider))
    }
}

/// Compiled count selection
#[derive(Debug, Clone, PartialEq)]
pub struct CountSelection {
    pub entity_type: String,
    pub predicate: Predicate,
    pub relations: RelationTree,
}

impl CountSelection {
    pub const ALIAS: &'static str = "count";

    /// `SELECT COUNT(*) AS count FROM <table> WHERE ...`
    pub fn to_statement(&self, provider: &dyn MetadataProvider) -> SelectStatement {
        let naming = MetadataNaming::new(provider, &self.entity_type);
        let mut statement = base_statement(provider, &self.entity_type);
        statement.expr_as(Func::count(Expr::col(Asterisk)), Alias::new(Self::ALIAS));
        apply_predicate(&mut statement, &self.predicate, &naming);
        statement
    }

    pub fn to_sql(&self, provider: &dyn MetadataProvider, config: &QueryConfig) -> String {
        config.render(&self.to_statement(provider))
    }
}

/// Compiled aggregate selection
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSelection {
    pub entity_type: String,
    pub predicate: Predicate,
    /// Selected expressions with their result aliases, group-by first
    pub columns: Vec<(AggregateExpr, String)>,
    pub group_by: Vec<String>,
    /// Ascending over the group-by fields
    pub sorting: Vec<SortField>,
    pub relations: RelationTree,
}

impl AggregateSelection {
    /// AND `extra` onto the compiled predicate, joining the relations it reaches
    pub fn and_predicate(mut self, provider: &dyn MetadataProvider, extra: Predicate) -> Self {
        self.relations
            .merge(predicate_relations(provider, &self.entity_type, &extra));
        self.predicate = self.predicate.and(extra);
        self
    }

    /// Result column aliases in selection order
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(_, alias)| alias.as_str())
    }

    pub fn to_statement(&self, provider: &dyn MetadataProvider) -> SelectStatement {
        let naming = MetadataNaming::new(provider, &self.entity_type);
        let mut statement = base_statement(provider, &self.entity_type);

        for (expr, alias) in &self.columns {
            let column = naming.column_expr(&sort_column(expr.field()));
            let selected: Expr = match expr {
                AggregateExpr::GroupBy(_) => column,
                AggregateExpr::Function(function, _) => Expr::from(match function {
                    AggregateFunction::Count => Func::count(column),
                    AggregateFunction::Sum => Func::sum(column),
                    AggregateFunction::Avg => Func::avg(column),
                    AggregateFunction::Max => Func::max(column),
                    AggregateFunction::Min => Func::min(column),
                }),
            };
            statement.expr_as(selected, Alias::new(alias.as_str()));
        }

        apply_predicate(&mut statement, &self.predicate, &naming);
        for field in &self.group_by {
            statement.add_group_by([naming.column_expr(&sort_column(field))]);
        }
        apply_sorting(&mut statement, &self.sorting, &naming);
        statement
    }

    pub fn to_sql(&self, provider: &dyn MetadataProvider, config: &QueryConfig) -> String {
        config.render(&self.to_statement(provider))
    }
}

/// Maps property names to column names through a metadata provider
///
/// Relation paths are walked from the root entity to find the entity that owns
/// the property; an unknown relation leaves the property name unmapped.
pub struct MetadataNaming<'a> {
    provider: &'a dyn MetadataProvider,
    entity_type: &'a str,
}

impl<'a> MetadataNaming<'a> {
    pub fn new(provider: &'a dyn MetadataProvider, entity_type: &'a str) -> Self {
        Self {
            provider,
            entity_type,
        }
    }

    fn owning_entity(&self, relation_path: &[String]) -> Option<String> {
        let mut current = self.entity_type.to_string();
        for relation in relation_path {
            match self.provider.relation_meta(&current, relation) {
                Ok(meta) => current = meta.target_type.clone(),
                Err(_) => {
                    log::trace!("no relation {} on {}, keeping property names", relation, current);
                    return None;
                }
            }
        }
        Some(current)
    }
}

impl ColumnNaming for MetadataNaming<'_> {
    fn resolve(&self, column: &ColumnRef) -> (Option<String>, String) {
        let name = match self.owning_entity(&column.relation_path) {
            Some(entity) => self.provider.column_name(&entity, &column.field),
            None => column.field.clone(),
        };
        (column.qualifier().map(str::to_string), name)
    }
}

fn base_statement(provider: &dyn MetadataProvider, entity_type: &str) -> SelectStatement {
    let mut statement = sea_query::Query::select();
    statement.from(Alias::new(provider.table_name(entity_type)));
    statement
}

fn apply_predicate(statement: &mut SelectStatement, predicate: &Predicate, naming: &dyn ColumnNaming) {
    if !predicate.is_true() {
        statement.cond_where(predicate.to_condition_with(naming));
    }
}

fn apply_sorting(statement: &mut SelectStatement, sorting: &[SortField], naming: &dyn ColumnNaming) {
    for sort in sorting {
        let column = naming.column_expr(&sort_column(&sort.field));
        let order = match sort.direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        };
        match sort.nulls {
            Some(SortNulls::NullsFirst) => {
                statement.order_by_expr_with_nulls(column, order, NullOrdering::First);
            }
            Some(SortNulls::NullsLast) => {
                statement.order_by_expr_with_nulls(column, order, NullOrdering::Last);
            }
            None => {
                statement.order_by_expr(column, order);
            }
        }
    }
}

/// `author.name` sorts on `name` of the `author` relation
fn sort_column(field: &str) -> ColumnRef {
    match field.rsplit_once('.') {
        Some((path, name)) => ColumnRef::with_path(path.split('.').map(str::to_string).collect(), name),
        None => ColumnRef::field(field),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqlBackend;
    use crate::predicate::CompareOp;
    use crate::query::Paging;
    use crate::relation::metadata::{EntityMeta, MetadataRegistry, RelationKind, RelationMeta};
    use serde_json::json;

    fn registry() -> MetadataRegistry {
        MetadataRegistry::from_entities([
            EntityMeta::new("Post", ["id"])
                .table("posts")
                .column("createdAt", "created_at")
                .relation(
                    RelationMeta::new("author", RelationKind::ManyToOne, "User")
                        .owner(true)
                        .field_names(["authorId"]),
                ),
            EntityMeta::new("User", ["id"])
                .table("users")
                .column("displayName", "display_name"),
        ])
    }

    fn query(value: serde_json::Value) -> Query {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_selection_defaults_paging() {
        let registry = registry();
        let selection = QueryAssembler::new(&registry, "Post")
            .selection(&Query::new())
            .unwrap();
        assert_eq!(selection.predicate, Predicate::True);
        assert_eq!(selection.limit, None, "omitting limit must not cap");
        assert_eq!(selection.offset, 0);
        assert!(selection.relations.is_empty());
    }

    #[test]
    fn test_selection_keeps_sort_order_and_paging() {
        let registry = registry();
        let selection = QueryAssembler::new(&registry, "Post")
            .selection(&query(json!({
                "sorting": [
                    {"field": "title", "direction": "ASC"},
                    {"field": "createdAt", "direction": "DESC", "nulls": "NULLS_LAST"}
                ],
                "paging": {"offset": 40}
            })))
            .unwrap();
        assert_eq!(selection.sorting[0].field, "title");
        assert_eq!(selection.sorting[1].field, "createdAt");
        assert_eq!(selection.limit, None);
        assert_eq!(selection.offset, 40);

        let sql = SqlBackend::Postgres.render(&selection.to_statement(&registry));
        assert!(
            sql.contains(r#"ORDER BY "title" ASC, "created_at" DESC NULLS LAST"#),
            "sql: {sql}"
        );
        assert!(sql.contains("OFFSET 40"), "sql: {sql}");
        assert!(!sql.contains("LIMIT"), "sql: {sql}");
    }

    #[test]
    fn test_selection_collects_relations() {
        let registry = registry();
        let selection = QueryAssembler::new(&registry, "Post")
            .selection(&query(json!({"filter": {"author": {"displayName": {"eq": "ann"}}}})))
            .unwrap();
        assert!(selection.relations.contains("author"));
        let sql = SqlBackend::Postgres.render(&selection.to_statement(&registry));
        assert!(sql.contains(r#""author"."display_name" = 'ann'"#), "sql: {sql}");
    }

    #[test]
    fn test_selection_propagates_operator_errors() {
        let registry = registry();
        let err = QueryAssembler::new(&registry, "Post")
            .selection(&query(json!({"filter": {"a": {"bogus": 1}}})))
            .unwrap_err();
        assert!(matches!(err, QueryError::UnknownOperator { .. }));
    }

    #[test]
    fn test_and_predicate_onto_base_statement() {
        let registry = registry();
        let selection = QueryAssembler::new(&registry, "Post")
            .selection(&Query::new().filter(Filter::new().compare("title", "like", "a%")))
            .unwrap()
            .and_predicate(&registry, Predicate::compare(ColumnRef::field("authorId"), CompareOp::Eq, 3));

        let mut base = sea_query::Query::select();
        base.column(Alias::new("id")).from(Alias::new("posts"));
        selection.apply_to(&registry, &mut base);
        let sql = SqlBackend::Postgres.render(&base);
        assert!(sql.contains(r#""title" LIKE 'a%'"#), "sql: {sql}");
        assert!(sql.contains(r#""authorId" = 3"#), "sql: {sql}");
    }

    #[test]
    fn test_and_predicate_joins_linked_relation() {
        let registry = registry();
        let selection = QueryAssembler::new(&registry, "Post")
            .selection(&Query::new())
            .unwrap()
            .and_predicate(
                &registry,
                Predicate::compare(ColumnRef::qualified("author", "id"), CompareOp::Eq, 3),
            );
        assert_eq!(selection.relations.paths(), vec!["author"]);

        // EDGE CASE: a link condition on the relation column itself
        let aggregate = QueryAssembler::new(&registry, "Post")
            .aggregate(&Filter::new(), &AggregateQuery::new().with(AggregateFunction::Count, "id"))
            .unwrap()
            .and_predicate(&registry, Predicate::compare(ColumnRef::field("author"), CompareOp::Eq, 3));
        assert!(aggregate.relations.contains("author"), "relations: {:?}", aggregate.relations);

        let plain = QueryAssembler::new(&registry, "Post")
            .selection(&Query::new())
            .unwrap()
            .and_predicate(&registry, Predicate::compare(ColumnRef::field("authorId"), CompareOp::Eq, 3));
        assert!(plain.relations.is_empty());
    }

    #[test]
    fn test_count_and_aggregate_carry_relations() {
        let registry = registry();
        let filter = Filter::from_json(&json!({"author": {"displayName": {"eq": "ann"}}})).unwrap();
        let assembler = QueryAssembler::new(&registry, "Post");

        let count = assembler.count(&filter).unwrap();
        assert_eq!(count.relations.paths(), vec!["author"]);

        let aggregate = assembler
            .aggregate(&filter, &AggregateQuery::new().with(AggregateFunction::Count, "id"))
            .unwrap();
        assert_eq!(aggregate.relations.paths(), vec!["author"]);
    }

    #[test]
    fn test_count_selection() {
        let registry = registry();
        let count = QueryAssembler::new(&registry, "Post")
            .count(&Filter::new().compare("views", "gte", 5))
            .unwrap();
        let sql = SqlBackend::Postgres.render(&count.to_statement(&registry));
        assert!(sql.starts_with(r#"SELECT COUNT(*) AS "count" FROM "posts""#), "sql: {sql}");
        assert!(sql.contains(r#""views" >= 5"#), "sql: {sql}");
    }

    #[test]
    fn test_aggregate_requires_fields() {
        let registry = registry();
        let err = QueryAssembler::new(&registry, "Post")
            .aggregate(&Filter::new(), &AggregateQuery::new())
            .unwrap_err();
        assert_eq!(err, QueryError::NoAggregateFields);
    }

    #[test]
    fn test_aggregate_group_by_sorts_ascending() {
        let registry = registry();
        let aggregate = AggregateQuery::new()
            .group_by("createdAt")
            .with(AggregateFunction::Count, "id")
            .with(AggregateFunction::Max, "views");
        let selection = QueryAssembler::new(&registry, "Post")
            .aggregate(&Filter::new(), &aggregate)
            .unwrap();
        assert_eq!(selection.sorting, vec![SortField::asc("createdAt")]);
        assert_eq!(
            selection.aliases().collect::<Vec<_>>(),
            vec!["GROUP_BY_createdAt", "COUNT_id", "MAX_views"]
        );

        let sql = SqlBackend::Postgres.render(&selection.to_statement(&registry));
        assert!(sql.contains(r#""created_at" AS "GROUP_BY_createdAt""#), "sql: {sql}");
        assert!(sql.contains(r#"COUNT("id") AS "COUNT_id""#), "sql: {sql}");
        assert!(sql.contains(r#"MAX("views") AS "MAX_views""#), "sql: {sql}");
        assert!(sql.contains(r#"GROUP BY "created_at""#), "sql: {sql}");
        assert!(sql.contains(r#"ORDER BY "created_at" ASC"#), "sql: {sql}");
    }

    #[test]
    fn test_metadata_naming_walks_relation_path() {
        let registry = registry();
        let naming = MetadataNaming::new(&registry, "Post");
        assert_eq!(
            naming.resolve(&ColumnRef::qualified("author", "displayName")),
            (Some("author".to_string()), "display_name".to_string())
        );
        assert_eq!(
            naming.resolve(&ColumnRef::qualified("ghost", "displayName")),
            (Some("ghost".to_string()), "displayName".to_string())
        );
        assert_eq!(
            naming.resolve(&ColumnRef::field("createdAt")),
            (None, "created_at".to_string())
        );
    }

    #[test]
    fn test_to_sql_uses_configured_backend() {
        let registry = registry();
        let selection = QueryAssembler::new(&registry, "Post")
            .selection(&Query {
                paging: Paging { limit: Some(1), offset: None },
                ..Query::new()
            })
            .unwrap();
        let config = QueryConfig {
            backend: SqlBackend::Mysql,
            ..QueryConfig::default()
        };
        assert_eq!(selection.to_sql(&registry, &config), "SELECT * FROM `posts` LIMIT 1");
    }
}
