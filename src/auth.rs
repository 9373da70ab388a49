//! Role-based authorization.
//!
//! An entity declares role lists per operation; an empty list leaves the
//! operation open. The gate also carries optional row-level policies — per
//! (entity, operation) functions that derive an extra wire filter from the
//! caller (owner-only scoping and the like), ANDed onto the operation's
//! filter before translation.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::schema::{Entity, OperationKind};

/// The caller of an operation: identity plus role set.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub id: Option<String>,
    pub roles: Vec<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(id: impl Into<String>, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            id: Some(id.into()),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_roles(roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            id: None,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

/// Derives an extra row-level wire filter for a caller, or `None` to leave
/// the operation unscoped.
pub type RowPolicy = dyn Fn(&Caller) -> Option<JsonValue> + Send + Sync;

/// Authorization gate: role checks plus registered row-level policies.
#[derive(Default)]
pub struct Gate {
    policies: HashMap<(String, OperationKind), Arc<RowPolicy>>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a row-level policy for an entity/operation pair.
    pub fn row_policy<F>(&mut self, entity: &str, operation: OperationKind, policy: F)
    where
        F: Fn(&Caller) -> Option<JsonValue> + Send + Sync + 'static,
    {
        self.policies
            .insert((entity.to_string(), operation), Arc::new(policy));
    }

    /// Check whether `caller` may perform `operation` on `entity`.
    ///
    /// Returns the validated row-level filter to AND onto the operation's
    /// filter, if a policy produced one. Denial is terminal: the caller gets
    /// [`Error::Authorization`] and no connector call is made.
    pub fn check(
        &self,
        entity: &Entity,
        operation: OperationKind,
        caller: &Caller,
    ) -> Result<Option<Filter>> {
        let required = entity.roles.for_operation(operation);
        if !required.is_empty() {
            let allowed = caller.roles.iter().any(|role| required.contains(role));
            if !allowed {
                tracing::warn!(
                    entity = %entity.name,
                    %operation,
                    caller = caller.id.as_deref().unwrap_or("<anonymous>"),
                    "operation denied"
                );
                return Err(Error::Authorization {
                    entity: entity.name.clone(),
                    operation,
                });
            }
        }

        let policy = self.policies.get(&(entity.name.clone(), operation));
        match policy.and_then(|p| p(caller)) {
            Some(wire) => Ok(Some(Filter::parse(entity, &wire)?)),
            None => Ok(None),
        }
    }
}
