//! Compiled query plans.
//!
//! The translator lowers validated filter trees into [`Condition`], a
//! backend-neutral boolean expression; connectors turn that into their native
//! query language. A [`QueryPlan`] bundles the condition with the projected
//! field list, pagination and the relation-hop tag for a select/count call.

pub mod project;
pub mod relation;
pub mod translate;

use serde_json::Value as JsonValue;

use crate::filter::FilterOperator;
use crate::schema::RelationKind;

/// A single compiled comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub column: String,
    pub operator: FilterOperator,
    pub value: JsonValue,
}

/// Backend-neutral boolean expression over column comparisons.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// All children must hold. An empty `All` holds trivially.
    All(Vec<Condition>),
    /// Any child must hold.
    Any(Vec<Condition>),
    Compare(Comparison),
}

impl Condition {
    /// Collapse a group to its single child where possible.
    pub(crate) fn all(mut children: Vec<Condition>) -> Self {
        if children.len() == 1 {
            children.remove(0)
        } else {
            Self::All(children)
        }
    }

    pub(crate) fn any(mut children: Vec<Condition>) -> Self {
        if children.len() == 1 {
            children.remove(0)
        } else {
            Self::Any(children)
        }
    }
}

/// Pagination window. `skip` counts pages of `take` rows; a `take` of zero
/// disables pagination entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    pub skip: u64,
    pub take: u64,
}

impl Page {
    pub fn new(skip: u64, take: u64) -> Self {
        Self { skip, take }
    }

    /// Build from optional wire arguments; absent or zero `take` means no
    /// pagination.
    pub fn from_args(skip: Option<u64>, take: Option<u64>) -> Option<Self> {
        let take = take.unwrap_or(0);
        if take == 0 {
            return None;
        }
        Some(Self::new(skip.unwrap_or(0), take))
    }

    pub fn offset(&self) -> u64 {
        self.skip * self.take
    }

    pub fn limit(&self) -> u64 {
        self.take
    }
}

/// Translator output handed to a connector's `query`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub entity: String,
    /// Physical columns to fetch, projection order.
    pub fields: Vec<String>,
    pub condition: Option<Condition>,
    pub page: Option<Page>,
    /// Count rows instead of returning them.
    pub count: bool,
    /// Set when this select resolves a relation hop; `ManyToOne` tells the
    /// connector a single row (or null) is expected.
    pub relation: Option<RelationKind>,
}

impl QueryPlan {
    pub fn select(entity: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            entity: entity.into(),
            fields,
            condition: None,
            page: None,
            count: false,
            relation: None,
        }
    }

    pub fn count_rows(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            fields: Vec::new(),
            condition: None,
            page: None,
            count: true,
            relation: None,
        }
    }

    pub fn with_condition(mut self, condition: Option<Condition>) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_page(mut self, page: Option<Page>) -> Self {
        self.page = page;
        self
    }

    pub fn with_relation(mut self, relation: Option<RelationKind>) -> Self {
        self.relation = relation;
        self
    }
}
