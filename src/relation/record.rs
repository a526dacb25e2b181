//! Read access to source entity instances.
//!
//! The linker never mutates an entity; it only reads properties by name. Any
//! type that can answer `get(property)` with a JSON value can be linked.

use crate::error::{QueryError, QueryResult};
use serde_json::{Map, Value};

/// Property access on a loaded entity
pub trait EntityRecord {
    /// Value of `property`, or `None` when the property is absent
    fn get(&self, property: &str) -> Option<&Value>;

    /// Values of the named primary key properties, in order
    ///
    /// # Errors
    ///
    /// `MissingPrimaryKey` when any key is absent or null.
    fn primary_key_values(&self, entity: &str, keys: &[String]) -> QueryResult<Vec<Value>> {
        keys.iter()
            .map(|key| match self.get(key) {
                Some(value) if !value.is_null() => Ok(value.clone()),
                _ => Err(QueryError::MissingPrimaryKey {
                    entity: entity.to_string(),
                    field: key.clone(),
                }),
            })
            .collect()
    }
}

impl EntityRecord for Map<String, Value> {
    fn get(&self, property: &str) -> Option<&Value> {
        Map::get(self, property)
    }
}

impl EntityRecord for Value {
    fn get(&self, property: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(property))
    }
}

/// String key for a set of primary key values (`|`-joined for composite keys)
pub fn key_string(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primary_key_values() {
        let record = json!({"id": 7, "tenant": "t1"});
        let keys = vec!["id".to_string(), "tenant".to_string()];
        assert_eq!(
            record.primary_key_values("Node", &keys).unwrap(),
            vec![json!(7), json!("t1")]
        );
        assert_eq!(key_string(&record.primary_key_values("Node", &keys).unwrap()), "7|t1");
    }

    #[test]
    fn test_missing_or_null_primary_key() {
        let keys = vec!["id".to_string()];
        assert!(matches!(
            json!({"name": "x"}).primary_key_values("Node", &keys),
            Err(QueryError::MissingPrimaryKey { .. })
        ));
        assert!(json!({"id": null}).primary_key_values("Node", &keys).is_err());
    }

    #[test]
    fn test_non_object_value_has_no_properties() {
        assert!(EntityRecord::get(&json!(3), "id").is_none());
    }
}
