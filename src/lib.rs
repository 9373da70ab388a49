//! Configuration-driven CRUD engine.
//!
//! Describe tables, columns and relations once as [`Entity`] metadata, plug
//! in a [`DataConnector`], and the engine serves list/count/create/update/
//! delete operations with declarative nested filtering, field projection,
//! one-hop relation resolution, role-based authorization and lifecycle
//! hooks. The transport layer (GraphQL or REST routing, schema registration)
//! stays outside: it turns wire requests into [`OperationArgs`] and calls
//! the orchestrators on [`Engine`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use tablesmith::{
//!     Caller, Column, ColumnType, Engine, Entity, MemoryConnector, OperationArgs,
//! };
//!
//! # async fn demo() -> tablesmith::Result<()> {
//! let engine = Engine::builder()
//!     .connector("default", Arc::new(MemoryConnector::new()))
//!     .entity(
//!         Entity::new("tickets")
//!             .column_def(Column::new("id", ColumnType::Integer).not_editable())
//!             .column_def(Column::new("status", ColumnType::String))
//!             .primary_key("id"),
//!     )
//!     .build()?;
//!
//! let open = engine
//!     .list(
//!         "tickets",
//!         OperationArgs::new()
//!             .with_filter(json!({ "status": { "_eq": "open" } }))
//!             .with_fields(["status"]),
//!         &Caller::anonymous(),
//!     )
//!     .await?;
//! # let _ = open;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod connector;
pub mod engine;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod ops;
pub mod query;
pub mod schema;

pub use auth::{Caller, Gate, RowPolicy};
pub use connector::memory::MemoryConnector;
#[cfg(feature = "postgres")]
pub use connector::sql::SqlConnector;
pub use connector::{
    ConnectorRequest, CreateArgs, DataConnector, OperationOutput, RemoveArgs, Row, UpdateArgs,
};
pub use engine::{Engine, EngineBuilder};
pub use error::{Error, Result};
pub use filter::{ColumnPredicate, Filter, FilterClause, FilterOperator};
pub use hooks::{
    AfterQueryResultHook, BeforeResolverHook, BeforeSendQueryHook, HookRegistry, OperationContext,
};
pub use ops::{OperationArgs, Related};
pub use query::project::project;
pub use query::relation::parent_scope;
pub use query::translate::translate;
pub use query::{Comparison, Condition, Page, QueryPlan};
pub use schema::args::{ArgumentCache, ArgumentOptions, ArgumentSet, DataField, FilterField};
pub use schema::{
    Column, ColumnType, Entity, Filterable, OperationKind, Relation, RelationKind, RoleRules,
};
