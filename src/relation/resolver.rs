//! Relation reference resolver.
//!
//! Walks a filter alongside entity metadata and collects every relation the
//! filter touches, recursing into nested relation filters with the target
//! entity's metadata. The result is a [`RelationTree`] used for join and
//! eager-load planning. References found through different branches are
//! deep-merged, never overwritten.

use super::metadata::MetadataProvider;
use crate::filter::{FieldFilter, Filter};
use crate::predicate::Predicate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Nested set of relation names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RelationTree(BTreeMap<String, RelationTree>);

impl RelationTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, relation: &str) -> Option<&RelationTree> {
        self.0.get(relation)
    }

    pub fn contains(&self, relation: &str) -> bool {
        self.0.contains_key(relation)
    }

    /// Top-level relation names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RelationTree)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Insert `relation` with the given subtree, merging into any existing entry
    pub fn insert(&mut self, relation: impl Into<String>, subtree: RelationTree) {
        self.0.entry(relation.into()).or_default().merge(subtree);
    }

    /// Insert a nested path such as `["author", "profile"]`
    pub fn insert_path(&mut self, path: &[String]) {
        if let Some((first, rest)) = path.split_first() {
            let mut subtree = RelationTree::new();
            subtree.insert_path(rest);
            self.insert(first.clone(), subtree);
        }
    }

    /// Deep union of `other` into `self`
    pub fn merge(&mut self, other: RelationTree) {
        for (name, subtree) in other.0 {
            self.insert(name, subtree);
        }
    }

    /// Every relation path in depth-first order, e.g. `["author", "author.profile"]`
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths("", &mut out);
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, subtree) in &self.0 {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            out.push(path.clone());
            subtree.collect_paths(&path, out);
        }
    }
}

/// Relations of `entity_type` referenced anywhere in `filter`
///
/// Fields that are not relations are ignored. Unknown entity types simply
/// contribute no relations.
pub fn referenced_relations(
    provider: &dyn MetadataProvider,
    entity_type: &str,
    filter: &Filter,
) -> RelationTree {
    let mut tree = RelationTree::new();
    collect(provider, entity_type, filter, &mut tree);
    log::trace!("filter on {} references relations {:?}", entity_type, tree.paths());
    tree
}

/// Relations of `entity_type` a compiled predicate reaches into
///
/// Qualified columns contribute their relation path. An unqualified column
/// named after a relation (as in a many-to-many link condition) contributes
/// that relation.
pub fn predicate_relations(
    provider: &dyn MetadataProvider,
    entity_type: &str,
    predicate: &Predicate,
) -> RelationTree {
    let entity = provider.entity(entity_type);
    let mut tree = RelationTree::new();
    for column in predicate.columns() {
        if !column.relation_path.is_empty() {
            tree.insert_path(&column.relation_path);
        } else if entity.is_some_and(|e| e.find_relation(&column.field).is_some()) {
            tree.insert(column.field.clone(), RelationTree::new());
        }
    }
    tree
}

fn collect(provider: &dyn MetadataProvider, entity_type: &str, filter: &Filter, tree: &mut RelationTree) {
    for child in filter.and.iter().chain(filter.or.iter()) {
        collect(provider, entity_type, child, tree);
    }

    let Some(entity) = provider.entity(entity_type) else {
        return;
    };

    for (field, value) in &filter.fields {
        let Some(relation) = entity.find_relation(field) else {
            continue;
        };
        let mut subtree = RelationTree::new();
        if let FieldFilter::Relation(sub) = value {
            collect(provider, &relation.target_type, sub, &mut subtree);
        }
        tree.insert(field.clone(), subtree);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::metadata::{EntityMeta, MetadataRegistry, RelationKind, RelationMeta};
    use serde_json::json;

    fn registry() -> MetadataRegistry {
        MetadataRegistry::from_entities([
            EntityMeta::new("Parent", ["id"])
                .relation(RelationMeta::new("rel", RelationKind::OneToMany, "Child").mapped_by("parent"))
                .relation(
                    RelationMeta::new("owner", RelationKind::ManyToOne, "User").field_names(["ownerId"]),
                ),
            EntityMeta::new("Child", ["id"]).relation(
                RelationMeta::new("parent", RelationKind::ManyToOne, "Parent").field_names(["parentId"]),
            ),
            EntityMeta::new("User", ["id"])
                .relation(RelationMeta::new("profile", RelationKind::OneToOne, "Profile").owner(true)),
        ])
    }

    fn resolve(filter: serde_json::Value) -> RelationTree {
        referenced_relations(&registry(), "Parent", &Filter::from_json(&filter).unwrap())
    }

    #[test]
    fn test_same_relation_through_branches_merges() {
        let tree = resolve(json!({
            "and": [{"or": [{"rel": {"x": {"eq": 1}}}]}],
            "rel": {"y": {"eq": 2}}
        }));
        let mut expected = RelationTree::new();
        expected.insert("rel", RelationTree::new());
        assert_eq!(tree, expected);
        assert_eq!(serde_json::to_value(&tree).unwrap(), json!({"rel": {}}));
    }

    #[test]
    fn test_non_relation_fields_ignored() {
        assert!(resolve(json!({"name": {"eq": "x"}, "or": [{"age": {"gt": 1}}]})).is_empty());
    }

    #[test]
    fn test_nested_relations_use_target_metadata() {
        let tree = resolve(json!({"owner": {"profile": {"bio": {"like": "%x%"}}}}));
        assert_eq!(tree.paths(), vec!["owner".to_string(), "owner.profile".to_string()]);
    }

    #[test]
    fn test_deep_merge_keeps_both_subtrees() {
        let tree = resolve(json!({
            "or": [
                {"rel": {"parent": {"id": {"eq": 1}}}},
                {"rel": {"name": {"eq": "a"}}}
            ],
            "owner": {"id": {"eq": 3}}
        }));
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({"owner": {}, "rel": {"parent": {}}})
        );
    }

    #[test]
    fn test_relation_compared_directly_is_still_referenced() {
        let tree = resolve(json!({"owner": {"eq": 1}}));
        assert!(tree.contains("owner"));
    }

    #[test]
    fn test_unknown_entity_yields_empty_tree() {
        let filter = Filter::from_json(&json!({"rel": {"x": {"eq": 1}}})).unwrap();
        assert!(referenced_relations(&registry(), "Ghost", &filter).is_empty());
    }

    #[test]
    fn test_predicate_relations_from_columns() {
        use crate::predicate::{ColumnRef, CompareOp};
        let registry = MetadataRegistry::from_entities([EntityMeta::new("Post", ["id"])
            .relation(
                RelationMeta::new("tags", RelationKind::ManyToMany, "Tag")
                    .owner(true)
                    .inversed_by("posts"),
            )]);
        let predicate = Predicate::all([
            Predicate::compare(ColumnRef::field("tags"), CompareOp::Eq, 7),
            Predicate::compare(ColumnRef::field("title"), CompareOp::Eq, "x"),
            Predicate::compare(
                ColumnRef::with_path(vec!["author".into(), "profile".into()], "age"),
                CompareOp::Gt,
                18,
            ),
        ]);
        let tree = predicate_relations(&registry, "Post", &predicate);
        assert_eq!(tree.paths(), vec!["author", "author.profile", "tags"]);
    }

    #[test]
    fn test_merge_is_a_deep_union() {
        let mut a = RelationTree::new();
        let mut a_sub = RelationTree::new();
        a_sub.insert("x", RelationTree::new());
        a.insert("r", a_sub);

        let mut b = RelationTree::new();
        let mut b_sub = RelationTree::new();
        b_sub.insert("y", RelationTree::new());
        b.insert("r", b_sub);

        a.merge(b);
        assert_eq!(a.paths(), vec!["r", "r.x", "r.y"]);
    }
}
