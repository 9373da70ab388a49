//! Declarative filter trees.
//!
//! Filters arrive in a JSON wire shape:
//!
//! ```json
//! {
//!   "_and": [ { "status": { "_eq": "open" } } ],
//!   "_or":  [ { "priority": { "_eq": "high" } } ],
//!   "title": { "_like": "%rust%" }
//! }
//! ```
//!
//! The wire shape is parsed into a tagged tree at the boundary and validated
//! against the target entity's column set, so everything downstream works on
//! known columns and an exhaustive operator enum. A node keeps its clauses in
//! document order: combinator clauses (`_and`/`_or`) holding child filters,
//! and column predicates carrying exactly one operator each.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::schema::Entity;

/// Comparison operators supported in column predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "_eq")]
    Eq,
    #[serde(rename = "_neq")]
    Neq,
    #[serde(rename = "_lt")]
    Lt,
    #[serde(rename = "_lte")]
    Lte,
    #[serde(rename = "_gt")]
    Gt,
    #[serde(rename = "_gte")]
    Gte,
    #[serde(rename = "_in")]
    In,
    #[serde(rename = "_nin")]
    Nin,
    #[serde(rename = "_like")]
    Like,
    #[serde(rename = "_nlike")]
    Nlike,
    #[serde(rename = "_is_null")]
    IsNull,
}

impl FilterOperator {
    pub const ALL: [Self; 11] = [
        Self::Eq,
        Self::Neq,
        Self::Lt,
        Self::Lte,
        Self::Gt,
        Self::Gte,
        Self::In,
        Self::Nin,
        Self::Like,
        Self::Nlike,
        Self::IsNull,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "_eq",
            Self::Neq => "_neq",
            Self::Lt => "_lt",
            Self::Lte => "_lte",
            Self::Gt => "_gt",
            Self::Gte => "_gte",
            Self::In => "_in",
            Self::Nin => "_nin",
            Self::Like => "_like",
            Self::Nlike => "_nlike",
            Self::IsNull => "_is_null",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == s)
    }

    /// `_in`/`_nin` take a list of scalars; everything else takes one scalar.
    pub fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::Nin)
    }
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column/operator/value comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPredicate {
    pub column: String,
    pub operator: FilterOperator,
    pub value: JsonValue,
}

/// One clause of a filter node, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Predicate(ColumnPredicate),
}

/// A validated filter tree over one entity's columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    pub clauses: Vec<FilterClause>,
}

impl Filter {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// A filter holding a single column predicate.
    pub fn predicate(
        column: impl Into<String>,
        operator: FilterOperator,
        value: JsonValue,
    ) -> Self {
        Self {
            clauses: vec![FilterClause::Predicate(ColumnPredicate {
                column: column.into(),
                operator,
                value,
            })],
        }
    }

    /// Conjoin two filters. Empty sides are absorbed.
    pub fn and(self, other: Self) -> Self {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        Self {
            clauses: vec![FilterClause::And(vec![self, other])],
        }
    }

    /// Parse and validate a wire-shape filter against an entity.
    ///
    /// Fails with [`Error::InvalidFilter`] on any unknown column, unknown or
    /// disallowed operator, multi-operator predicate, or wrong value arity.
    /// Nothing is partially built on failure.
    pub fn parse(entity: &Entity, value: &JsonValue) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            Error::InvalidFilter(format!("expected a filter object, got {value}"))
        })?;

        let mut clauses = Vec::with_capacity(object.len());
        for (key, entry) in object {
            match key.as_str() {
                "_and" => clauses.push(FilterClause::And(Self::parse_children(entity, key, entry)?)),
                "_or" => clauses.push(FilterClause::Or(Self::parse_children(entity, key, entry)?)),
                "_exists" => {
                    // The legacy engine logged and dropped this key; dropping
                    // silently changes query semantics, so it is an error here.
                    return Err(Error::InvalidFilter(
                        "`_exists` is not a supported filter key".to_string(),
                    ));
                }
                column => clauses.push(FilterClause::Predicate(Self::parse_predicate(
                    entity, column, entry,
                )?)),
            }
        }

        Ok(Self { clauses })
    }

    fn parse_children(entity: &Entity, key: &str, value: &JsonValue) -> Result<Vec<Self>> {
        let children = value.as_array().ok_or_else(|| {
            Error::InvalidFilter(format!("`{key}` expects an array of filters"))
        })?;
        children
            .iter()
            .map(|child| Self::parse(entity, child))
            .collect()
    }

    fn parse_predicate(
        entity: &Entity,
        column: &str,
        value: &JsonValue,
    ) -> Result<ColumnPredicate> {
        let column_def = entity.column(column).ok_or_else(|| {
            Error::InvalidFilter(format!(
                "unknown column `{column}` on entity `{}`",
                entity.name
            ))
        })?;

        let body = value.as_object().ok_or_else(|| {
            Error::InvalidFilter(format!("predicate on `{column}` must be an object"))
        })?;
        if body.len() != 1 {
            return Err(Error::InvalidFilter(format!(
                "predicate on `{column}` must carry exactly one operator, got {}",
                body.len()
            )));
        }

        let Some((op_key, op_value)) = body.iter().next() else {
            return Err(Error::InvalidFilter(format!(
                "predicate on `{column}` must carry exactly one operator"
            )));
        };
        let operator = FilterOperator::parse(op_key).ok_or_else(|| {
            Error::InvalidFilter(format!("unknown operator `{op_key}` on `{column}`"))
        })?;
        if !column_def.filterable.allows(operator) {
            return Err(Error::InvalidFilter(format!(
                "operator `{operator}` is not allowed on column `{column}`"
            )));
        }

        match operator {
            FilterOperator::In | FilterOperator::Nin => {
                let items = op_value.as_array().ok_or_else(|| {
                    Error::InvalidFilter(format!("`{operator}` on `{column}` expects a list"))
                })?;
                if let Some(bad) = items.iter().find(|item| !is_scalar(item)) {
                    return Err(Error::InvalidFilter(format!(
                        "`{operator}` on `{column}` expects scalar list items, got {bad}"
                    )));
                }
            }
            // `_is_null` only tests nullity; its value is carried but ignored.
            FilterOperator::IsNull => {}
            _ => {
                if !is_scalar(op_value) {
                    return Err(Error::InvalidFilter(format!(
                        "`{operator}` on `{column}` expects a scalar value, got {op_value}"
                    )));
                }
            }
        }

        Ok(ColumnPredicate {
            column: column.to_string(),
            operator,
            value: op_value.clone(),
        })
    }

    /// Serialize back to the wire shape.
    ///
    /// Combinator clauses of the same kind at one level are merged into a
    /// single `_and`/`_or` array so the output is always a valid wire object.
    pub fn to_wire(&self) -> JsonValue {
        let mut object = serde_json::Map::new();
        for clause in &self.clauses {
            match clause {
                FilterClause::And(children) => append_children(&mut object, "_and", children),
                FilterClause::Or(children) => append_children(&mut object, "_or", children),
                FilterClause::Predicate(p) => {
                    let mut body = serde_json::Map::new();
                    body.insert(p.operator.as_str().to_string(), p.value.clone());
                    object.insert(p.column.clone(), JsonValue::Object(body));
                }
            }
        }
        JsonValue::Object(object)
    }
}

fn append_children(
    object: &mut serde_json::Map<String, JsonValue>,
    key: &str,
    children: &[Filter],
) {
    let rendered = children.iter().map(Filter::to_wire);
    match object.get_mut(key) {
        Some(JsonValue::Array(existing)) => existing.extend(rendered),
        _ => {
            object.insert(key.to_string(), JsonValue::Array(rendered.collect()));
        }
    }
}

fn is_scalar(value: &JsonValue) -> bool {
    matches!(
        value,
        JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType, Filterable};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tickets() -> Entity {
        Entity::new("tickets")
            .column_def(Column::new("id", ColumnType::Integer))
            .column_def(Column::new("status", ColumnType::String))
            .column_def(Column::new("priority", ColumnType::String))
            .column_def(
                Column::new("secret", ColumnType::String)
                    .filterable(Filterable::Enabled(false)),
            )
            .column_def(
                Column::new("owner", ColumnType::String)
                    .filterable(Filterable::Operators(vec![FilterOperator::Eq])),
            )
            .primary_key("id")
    }

    #[test]
    fn test_parse_single_predicate() {
        let filter = Filter::parse(&tickets(), &json!({"status": {"_eq": "open"}})).unwrap();
        assert_eq!(
            filter.clauses,
            vec![FilterClause::Predicate(ColumnPredicate {
                column: "status".to_string(),
                operator: FilterOperator::Eq,
                value: json!("open"),
            })]
        );
    }

    #[test]
    fn test_parse_nested_combinators() {
        let filter = Filter::parse(
            &tickets(),
            &json!({
                "_and": [
                    {"status": {"_eq": "open"}},
                    {"_or": [
                        {"priority": {"_eq": "high"}},
                        {"priority": {"_eq": "urgent"}}
                    ]}
                ]
            }),
        )
        .unwrap();

        assert_matches!(&filter.clauses[..], [FilterClause::And(children)] => {
            assert_eq!(children.len(), 2);
            assert_matches!(&children[1].clauses[..], [FilterClause::Or(grand)] => {
                assert_eq!(grand.len(), 2);
            });
        });
    }

    #[test]
    fn test_unknown_column_rejected() {
        let err = Filter::parse(&tickets(), &json!({"nope": {"_eq": 1}})).unwrap_err();
        assert_matches!(err, Error::InvalidFilter(msg) => assert!(msg.contains("nope")));
    }

    #[test]
    fn test_exists_rejected() {
        let err = Filter::parse(&tickets(), &json!({"_exists": {"other": {}}})).unwrap_err();
        assert_matches!(err, Error::InvalidFilter(msg) => assert!(msg.contains("_exists")));
    }

    #[test]
    fn test_multi_operator_predicate_rejected() {
        let err =
            Filter::parse(&tickets(), &json!({"id": {"_eq": 1, "_gt": 0}})).unwrap_err();
        assert_matches!(err, Error::InvalidFilter(_));
    }

    #[test]
    fn test_empty_operator_map_rejected() {
        let err = Filter::parse(&tickets(), &json!({"id": {}})).unwrap_err();
        assert_matches!(err, Error::InvalidFilter(_));
    }

    #[test]
    fn test_in_requires_list() {
        let err = Filter::parse(&tickets(), &json!({"id": {"_in": 3}})).unwrap_err();
        assert_matches!(err, Error::InvalidFilter(msg) => assert!(msg.contains("list")));

        assert!(Filter::parse(&tickets(), &json!({"id": {"_in": [1, 2]}})).is_ok());
    }

    #[test]
    fn test_scalar_operators_reject_lists_and_null() {
        assert_matches!(
            Filter::parse(&tickets(), &json!({"id": {"_eq": [1]}})),
            Err(Error::InvalidFilter(_))
        );
        assert_matches!(
            Filter::parse(&tickets(), &json!({"id": {"_eq": null}})),
            Err(Error::InvalidFilter(_))
        );
        // Nullity checks go through `_is_null` instead.
        assert!(Filter::parse(&tickets(), &json!({"id": {"_is_null": true}})).is_ok());
    }

    #[test]
    fn test_filterable_policy_enforced() {
        assert_matches!(
            Filter::parse(&tickets(), &json!({"secret": {"_eq": "x"}})),
            Err(Error::InvalidFilter(_))
        );
        assert!(Filter::parse(&tickets(), &json!({"owner": {"_eq": "ana"}})).is_ok());
        assert_matches!(
            Filter::parse(&tickets(), &json!({"owner": {"_like": "a%"}})),
            Err(Error::InvalidFilter(_))
        );
    }

    #[test]
    fn test_wire_round_trip() {
        let wire = json!({
            "_and": [
                {"status": {"_eq": "open"}},
                {"_or": [
                    {"priority": {"_eq": "high"}},
                    {"priority": {"_eq": "urgent"}}
                ]}
            ],
            "status": {"_neq": "closed"}
        });
        let filter = Filter::parse(&tickets(), &wire).unwrap();
        assert_eq!(filter.to_wire(), wire);
        assert_eq!(Filter::parse(&tickets(), &filter.to_wire()).unwrap(), filter);
    }

    #[test]
    fn test_and_absorbs_empty() {
        let p = Filter::predicate("status", FilterOperator::Eq, json!("open"));
        assert_eq!(Filter::empty().and(p.clone()), p);
        assert_eq!(p.clone().and(Filter::empty()), p);
    }
}
