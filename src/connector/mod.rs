//! Storage connectors.
//!
//! A connector executes compiled query plans against one storage backend.
//! The engine never builds backend-specific statements itself: it hands the
//! connector the backend-neutral [`Condition`](crate::query::Condition) form
//! and the connector translates it into its native query language.
//!
//! Connectors are registered on the engine by name; each entity declares
//! which connector serves it.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod sql;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::query::{Condition, QueryPlan};

/// A fetched row: flat column → value mapping.
pub type Row = serde_json::Map<String, JsonValue>;

/// Arguments for an insert. `pk_columns` lets the connector refetch the
/// canonical row by the generated key(s) without reaching back into entity
/// configuration.
#[derive(Debug, Clone)]
pub struct CreateArgs {
    pub entity: String,
    /// Columns to return from the refetch; empty means all.
    pub fields: Vec<String>,
    pub data: Row,
    pub pk_columns: Vec<String>,
}

/// Arguments for an update. The refetch after the write uses the primary
/// keys captured from the matched rows, not the original condition, so a
/// filter that no longer matches after the write still returns the touched
/// row.
#[derive(Debug, Clone)]
pub struct UpdateArgs {
    pub entity: String,
    pub fields: Vec<String>,
    pub condition: Option<Condition>,
    pub data: Row,
    pub pk_columns: Vec<String>,
}

/// Arguments for a delete.
#[derive(Debug, Clone)]
pub struct RemoveArgs {
    pub entity: String,
    pub condition: Option<Condition>,
}

/// A compiled connector request, the payload of the `beforeSendQuery` hook
/// stage.
#[derive(Debug, Clone)]
pub enum ConnectorRequest {
    Query(QueryPlan),
    Create(CreateArgs),
    Update(UpdateArgs),
    Remove(RemoveArgs),
}

/// Result payload of an operation, the payload of the `afterQueryResult`
/// hook stage.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    Rows(Vec<Row>),
    Row(Option<Row>),
    Count(u64),
}

impl OperationOutput {
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Rows(rows) => rows,
            Self::Row(Some(row)) => vec![row],
            Self::Row(None) | Self::Count(_) => Vec::new(),
        }
    }

    pub fn into_row(self) -> Option<Row> {
        match self {
            Self::Row(row) => row,
            Self::Rows(rows) => rows.into_iter().next(),
            Self::Count(_) => None,
        }
    }

    pub fn into_count(self) -> u64 {
        match self {
            Self::Count(count) => count,
            Self::Rows(rows) => rows.len() as u64,
            Self::Row(Some(_)) => 1,
            Self::Row(None) => 0,
        }
    }
}

/// Backend executor for compiled query plans.
#[async_trait]
pub trait DataConnector: Send + Sync {
    /// Execute a select or count. A `ManyToOne` relation tag on the plan
    /// yields `Row` (first row or null); a `count` plan yields `Count`.
    async fn query(&self, plan: QueryPlan) -> Result<OperationOutput>;

    /// Insert one row, then refetch it by primary key(s). `None` when
    /// nothing was inserted.
    async fn create(&self, args: CreateArgs) -> Result<Option<Row>>;

    /// Update matching rows, then refetch by the captured primary keys.
    /// `None` when the condition matched no rows — not an error.
    async fn update(&self, args: UpdateArgs) -> Result<Option<Row>>;

    /// Delete matching rows, returning the removed count.
    async fn remove(&self, args: RemoveArgs) -> Result<u64>;
}
