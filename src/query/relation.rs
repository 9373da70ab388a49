//! Relation scoping.
//!
//! Given an already-fetched parent row and a declared relation, derive the
//! equality predicate that scopes the child query to that parent. A single
//! hop only; chains through indirect relations are not followed.

use serde_json::json;

use crate::connector::Row;
use crate::filter::{Filter, FilterOperator};
use crate::schema::Relation;

/// Build the child-query filter scoping `relation` to `parent`.
///
/// When the parent row lacks the key value (column absent or JSON null) the
/// returned filter matches zero rows — never an unscoped fetch. An empty
/// `_in` list is guaranteed to match nothing, which is exactly the shape a
/// dangling reference should resolve to.
pub fn parent_scope(relation: &Relation, parent: &Row) -> Filter {
    match parent.get(&relation.local_key) {
        Some(value) if !value.is_null() => {
            Filter::predicate(&relation.foreign_key, FilterOperator::Eq, value.clone())
        }
        _ => Filter::predicate(&relation.foreign_key, FilterOperator::In, json!([])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RelationKind;
    use pretty_assertions::assert_eq;
    use serde_json::Value as JsonValue;

    fn author_relation() -> Relation {
        Relation {
            name: "author".to_string(),
            kind: RelationKind::ManyToOne,
            remote_entity: "users".to_string(),
            local_key: "author_id".to_string(),
            foreign_key: "id".to_string(),
        }
    }

    fn row(pairs: &[(&str, JsonValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_scope_by_parent_key() {
        let parent = row(&[("id", json!(7)), ("author_id", json!(42))]);
        let filter = parent_scope(&author_relation(), &parent);
        assert_eq!(
            filter,
            Filter::predicate("id", FilterOperator::Eq, json!(42))
        );
    }

    #[test]
    fn test_null_key_matches_nothing() {
        let parent = row(&[("id", json!(7)), ("author_id", JsonValue::Null)]);
        let filter = parent_scope(&author_relation(), &parent);
        assert_eq!(
            filter,
            Filter::predicate("id", FilterOperator::In, json!([]))
        );
    }

    #[test]
    fn test_missing_key_matches_nothing() {
        let parent = row(&[("id", json!(7))]);
        let filter = parent_scope(&author_relation(), &parent);
        assert_eq!(
            filter,
            Filter::predicate("id", FilterOperator::In, json!([]))
        );
    }
}
