//! Engine assembly.
//!
//! The [`Engine`] owns the validated entity set, the named connectors, the
//! hook registry, the authorization gate and the argument-set cache. It is
//! built once at startup via [`EngineBuilder`] and shared read-only across
//! request tasks; per-request state lives in
//! [`OperationContext`](crate::hooks::OperationContext).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::auth::{Caller, Gate};
use crate::connector::DataConnector;
use crate::error::{Error, Result};
use crate::hooks::{AfterQueryResultHook, BeforeResolverHook, BeforeSendQueryHook, HookRegistry};
use crate::schema::args::{ArgumentCache, ArgumentOptions, ArgumentSet};
use crate::schema::{Entity, OperationKind};

pub struct Engine {
    entities: HashMap<String, Arc<Entity>>,
    connectors: HashMap<String, Arc<dyn DataConnector>>,
    pub(crate) hooks: HookRegistry,
    pub(crate) gate: Gate,
    arguments: ArgumentCache,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("entities", &self.entities.keys().collect::<Vec<_>>())
            .field("connectors", &self.connectors.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub(crate) fn entity(&self, name: &str) -> Result<Arc<Entity>> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Config(format!("unknown entity `{name}`")))
    }

    pub(crate) fn connector_for(&self, entity: &Entity) -> Result<Arc<dyn DataConnector>> {
        self.connectors
            .get(&entity.connector)
            .cloned()
            .ok_or_else(|| {
                Error::Config(format!(
                    "entity `{}` names unknown connector `{}`",
                    entity.name, entity.connector
                ))
            })
    }

    /// The argument surface the transport registers for an entity, memoized
    /// per `(entity, options)`.
    pub fn arguments(&self, entity: &str, options: &ArgumentOptions) -> Result<Arc<ArgumentSet>> {
        let entity = self.entity(entity)?;
        Ok(self.arguments.get_or_build(&entity, options))
    }
}

/// Builder collecting entities, connectors, hooks and row policies, with all
/// configuration validation up front in [`EngineBuilder::build`].
#[derive(Default)]
pub struct EngineBuilder {
    entities: Vec<Entity>,
    connectors: HashMap<String, Arc<dyn DataConnector>>,
    hooks: HookRegistry,
    gate: Gate,
}

impl EngineBuilder {
    pub fn entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn entities(mut self, entities: impl IntoIterator<Item = Entity>) -> Self {
        self.entities.extend(entities);
        self
    }

    /// Register a connector under a name entities can bind to.
    pub fn connector(mut self, name: &str, connector: Arc<dyn DataConnector>) -> Self {
        self.connectors.insert(name.to_string(), connector);
        self
    }

    pub fn before_resolver(
        mut self,
        entity: &str,
        operation: OperationKind,
        hook: Arc<dyn BeforeResolverHook>,
    ) -> Self {
        self.hooks.before_resolver(entity, operation, hook);
        self
    }

    pub fn before_send_query(
        mut self,
        entity: &str,
        operation: OperationKind,
        hook: Arc<dyn BeforeSendQueryHook>,
    ) -> Self {
        self.hooks.before_send_query(entity, operation, hook);
        self
    }

    pub fn after_query_result(
        mut self,
        entity: &str,
        operation: OperationKind,
        hook: Arc<dyn AfterQueryResultHook>,
    ) -> Self {
        self.hooks.after_query_result(entity, operation, hook);
        self
    }

    /// Register a row-level authorization policy.
    pub fn row_policy<F>(mut self, entity: &str, operation: OperationKind, policy: F) -> Self
    where
        F: Fn(&Caller) -> Option<JsonValue> + Send + Sync + 'static,
    {
        self.gate.row_policy(entity, operation, policy);
        self
    }

    /// Validate the configuration and assemble the engine.
    pub fn build(self) -> Result<Engine> {
        let mut entities: HashMap<String, Arc<Entity>> = HashMap::new();
        for entity in &self.entities {
            if entities
                .insert(entity.name.clone(), Arc::new(entity.clone()))
                .is_some()
            {
                return Err(Error::Config(format!(
                    "duplicate entity `{}`",
                    entity.name
                )));
            }
        }

        for entity in entities.values() {
            if !self.connectors.contains_key(&entity.connector) {
                return Err(Error::Config(format!(
                    "entity `{}` names unknown connector `{}`",
                    entity.name, entity.connector
                )));
            }
            for pk in &entity.primary_keys {
                if !entity.has_column(pk) {
                    return Err(Error::Config(format!(
                        "primary key `{pk}` is not a column of `{}`",
                        entity.name
                    )));
                }
            }
            for relation in &entity.relations {
                if !entity.has_column(&relation.local_key) {
                    return Err(Error::Config(format!(
                        "relation `{}` on `{}`: local key `{}` is not a column",
                        relation.name, entity.name, relation.local_key
                    )));
                }
                let remote = entities.get(&relation.remote_entity).ok_or_else(|| {
                    Error::Config(format!(
                        "relation `{}` on `{}` targets unknown entity `{}`",
                        relation.name, entity.name, relation.remote_entity
                    ))
                })?;
                if !remote.has_column(&relation.foreign_key) {
                    return Err(Error::Config(format!(
                        "relation `{}` on `{}`: foreign key `{}` is not a column of `{}`",
                        relation.name, entity.name, relation.foreign_key, remote.name
                    )));
                }
            }
        }

        tracing::debug!(
            entities = entities.len(),
            connectors = self.connectors.len(),
            "engine built"
        );

        Ok(Engine {
            entities,
            connectors: self.connectors,
            hooks: self.hooks,
            gate: self.gate,
            arguments: ArgumentCache::default(),
        })
    }
}
