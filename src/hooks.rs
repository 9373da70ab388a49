//! Lifecycle hook pipeline.
//!
//! Three extension points wrap every operation:
//!
//! 1. `beforeResolver` — rewrite the incoming arguments before anything else
//!    looks at them;
//! 2. `beforeSendQuery` — rewrite the compiled connector request before it is
//!    executed;
//! 3. `afterQueryResult` — rewrite the result payload before it is returned.
//!
//! Hooks are registered as an ordered list per (entity, operation, stage) and
//! run by explicit sequential composition: each hook's output is the next
//! hook's input, and a stage with no registrations is an identity pass. A
//! hook error aborts the whole operation; nothing is retried.
//!
//! The [`OperationContext`] travels through all three stages of one call, so
//! hooks can stash private state for a later stage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::auth::Caller;
use crate::connector::{ConnectorRequest, OperationOutput};
use crate::error::Result;
use crate::ops::OperationArgs;
use crate::schema::OperationKind;

/// Per-call state threaded through the hook stages. Created for each request
/// and discarded with the response.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub caller: Caller,
    /// Free-form bag for hooks to pass state between stages.
    pub state: serde_json::Map<String, JsonValue>,
}

impl OperationContext {
    pub fn new(caller: Caller) -> Self {
        Self {
            caller,
            state: serde_json::Map::new(),
        }
    }
}

#[async_trait]
pub trait BeforeResolverHook: Send + Sync {
    async fn call(&self, args: OperationArgs, ctx: &mut OperationContext)
        -> Result<OperationArgs>;
}

#[async_trait]
pub trait BeforeSendQueryHook: Send + Sync {
    async fn call(
        &self,
        request: ConnectorRequest,
        ctx: &mut OperationContext,
    ) -> Result<ConnectorRequest>;
}

#[async_trait]
pub trait AfterQueryResultHook: Send + Sync {
    async fn call(
        &self,
        output: OperationOutput,
        ctx: &mut OperationContext,
    ) -> Result<OperationOutput>;
}

type StageKey = (String, OperationKind);

/// Ordered hook lists per (entity, operation, stage).
#[derive(Default)]
pub struct HookRegistry {
    before_resolver: HashMap<StageKey, Vec<Arc<dyn BeforeResolverHook>>>,
    before_send_query: HashMap<StageKey, Vec<Arc<dyn BeforeSendQueryHook>>>,
    after_query_result: HashMap<StageKey, Vec<Arc<dyn AfterQueryResultHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_resolver(
        &mut self,
        entity: &str,
        operation: OperationKind,
        hook: Arc<dyn BeforeResolverHook>,
    ) {
        self.before_resolver
            .entry((entity.to_string(), operation))
            .or_default()
            .push(hook);
    }

    pub fn before_send_query(
        &mut self,
        entity: &str,
        operation: OperationKind,
        hook: Arc<dyn BeforeSendQueryHook>,
    ) {
        self.before_send_query
            .entry((entity.to_string(), operation))
            .or_default()
            .push(hook);
    }

    pub fn after_query_result(
        &mut self,
        entity: &str,
        operation: OperationKind,
        hook: Arc<dyn AfterQueryResultHook>,
    ) {
        self.after_query_result
            .entry((entity.to_string(), operation))
            .or_default()
            .push(hook);
    }

    pub async fn run_before_resolver(
        &self,
        entity: &str,
        operation: OperationKind,
        mut args: OperationArgs,
        ctx: &mut OperationContext,
    ) -> Result<OperationArgs> {
        if let Some(hooks) = self.before_resolver.get(&(entity.to_string(), operation)) {
            for hook in hooks {
                args = hook.call(args, ctx).await?;
            }
        }
        Ok(args)
    }

    pub async fn run_before_send_query(
        &self,
        entity: &str,
        operation: OperationKind,
        mut request: ConnectorRequest,
        ctx: &mut OperationContext,
    ) -> Result<ConnectorRequest> {
        if let Some(hooks) = self.before_send_query.get(&(entity.to_string(), operation)) {
            for hook in hooks {
                request = hook.call(request, ctx).await?;
            }
        }
        Ok(request)
    }

    pub async fn run_after_query_result(
        &self,
        entity: &str,
        operation: OperationKind,
        mut output: OperationOutput,
        ctx: &mut OperationContext,
    ) -> Result<OperationOutput> {
        if let Some(hooks) = self.after_query_result.get(&(entity.to_string(), operation)) {
            for hook in hooks {
                output = hook.call(output, ctx).await?;
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use serde_json::json;

    struct PushField(&'static str);

    #[async_trait]
    impl BeforeResolverHook for PushField {
        async fn call(
            &self,
            mut args: OperationArgs,
            ctx: &mut OperationContext,
        ) -> Result<OperationArgs> {
            args.fields.push(self.0.to_string());
            ctx.state.insert("last".to_string(), json!(self.0));
            Ok(args)
        }
    }

    struct Fail;

    #[async_trait]
    impl BeforeResolverHook for Fail {
        async fn call(
            &self,
            _args: OperationArgs,
            _ctx: &mut OperationContext,
        ) -> Result<OperationArgs> {
            Err(Error::Hook("rejected".to_string()))
        }
    }

    #[tokio::test]
    async fn test_hooks_compose_in_registration_order() {
        let mut registry = HookRegistry::new();
        registry.before_resolver("posts", OperationKind::Read, Arc::new(PushField("first")));
        registry.before_resolver("posts", OperationKind::Read, Arc::new(PushField("second")));

        let mut ctx = OperationContext::new(Caller::anonymous());
        let args = registry
            .run_before_resolver(
                "posts",
                OperationKind::Read,
                OperationArgs::default(),
                &mut ctx,
            )
            .await
            .unwrap();

        assert_eq!(args.fields, vec!["first", "second"]);
        assert_eq!(ctx.state.get("last"), Some(&json!("second")));
    }

    #[tokio::test]
    async fn test_unregistered_stage_is_identity() {
        let registry = HookRegistry::new();
        let mut ctx = OperationContext::new(Caller::anonymous());
        let args = OperationArgs::default().with_fields(["title"]);
        let out = registry
            .run_before_resolver("posts", OperationKind::Read, args.clone(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(out.fields, args.fields);
    }

    #[tokio::test]
    async fn test_hook_failure_aborts() {
        let mut registry = HookRegistry::new();
        registry.before_resolver("posts", OperationKind::Read, Arc::new(Fail));
        registry.before_resolver("posts", OperationKind::Read, Arc::new(PushField("never")));

        let mut ctx = OperationContext::new(Caller::anonymous());
        let err = registry
            .run_before_resolver(
                "posts",
                OperationKind::Read,
                OperationArgs::default(),
                &mut ctx,
            )
            .await
            .unwrap_err();
        assert_matches!(err, Error::Hook(_));
        assert!(ctx.state.is_empty());
    }
}
