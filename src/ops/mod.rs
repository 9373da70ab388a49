//! Operation orchestrators.
//!
//! Each CRUD operation is a fixed pipeline over the same stages:
//! `beforeResolver` hook → authorization → input normalization (writes) /
//! projection (reads) → filter merging → translation → `beforeSendQuery`
//! hook → connector execution → `afterQueryResult` hook. The read side lives
//! in [`read`], the write side in [`write`]; both are `impl Engine` blocks.

pub mod read;
pub mod write;

use serde_json::Value as JsonValue;

use crate::connector::Row;

/// Wire-level arguments of one operation, as handed to the engine (and to
/// `beforeResolver` hooks, which may rewrite them wholesale).
#[derive(Debug, Clone, Default)]
pub struct OperationArgs {
    /// Wire-shape filter; parsed and validated after the `beforeResolver`
    /// stage.
    pub filter: Option<JsonValue>,
    /// Write payload for create/update.
    pub data: Option<Row>,
    /// Requested output field shape.
    pub fields: Vec<String>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl OperationArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: JsonValue) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = data.as_object().cloned();
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_page(mut self, skip: u64, take: u64) -> Self {
        self.skip = Some(skip);
        self.take = Some(take);
        self
    }
}

/// Result of a relation-hop read: the to-one side yields at most one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Option<Row>),
    Many(Vec<Row>),
}
