//! Read orchestrators: list, relation hops, count.

use crate::auth::Caller;
use crate::connector::{ConnectorRequest, OperationOutput, Row};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::hooks::OperationContext;
use crate::ops::{OperationArgs, Related};
use crate::query::project::project;
use crate::query::relation::parent_scope;
use crate::query::translate::translate;
use crate::query::{Page, QueryPlan};
use crate::schema::{OperationKind, RelationKind};

impl Engine {
    /// List rows of an entity.
    pub async fn list(
        &self,
        entity: &str,
        args: OperationArgs,
        caller: &Caller,
    ) -> Result<Vec<Row>> {
        let output = self.fetch(entity, args, caller, None, false).await?;
        Ok(output.into_rows())
    }

    /// Resolve one declared relation hop from an already-fetched parent row.
    ///
    /// The child entity's own read authorization applies. A to-one relation
    /// yields at most one row; a to-many relation yields a list. A parent
    /// row with a null key yields an empty result, not an error.
    pub async fn related(
        &self,
        entity: &str,
        relation: &str,
        parent: &Row,
        args: OperationArgs,
        caller: &Caller,
    ) -> Result<Related> {
        let parent_entity = self.entity(entity)?;
        let relation = parent_entity
            .relation_named(relation)
            .ok_or_else(|| {
                Error::Config(format!("unknown relation `{relation}` on `{entity}`"))
            })?
            .clone();

        let scope = parent_scope(&relation, parent);
        let output = self
            .fetch(
                &relation.remote_entity,
                args,
                caller,
                Some((scope, relation.kind)),
                false,
            )
            .await?;

        Ok(match relation.kind {
            RelationKind::ManyToOne => Related::One(output.into_row()),
            RelationKind::OneToMany => Related::Many(output.into_rows()),
        })
    }

    /// Count rows matching a filter. Pagination arguments are ignored.
    pub async fn count(
        &self,
        entity: &str,
        args: OperationArgs,
        caller: &Caller,
    ) -> Result<u64> {
        let output = self.fetch(entity, args, caller, None, true).await?;
        Ok(output.into_count())
    }

    /// Shared select pipeline.
    async fn fetch(
        &self,
        entity: &str,
        args: OperationArgs,
        caller: &Caller,
        scope: Option<(Filter, RelationKind)>,
        count: bool,
    ) -> Result<OperationOutput> {
        let entity = self.entity(entity)?;
        tracing::debug!(entity = %entity.name, count, "read");
        let mut ctx = OperationContext::new(caller.clone());

        let args = self
            .hooks
            .run_before_resolver(&entity.name, OperationKind::Read, args, &mut ctx)
            .await?;
        let row_filter = self.gate.check(&entity, OperationKind::Read, caller)?;

        let mut filter = match &args.filter {
            Some(wire) => Filter::parse(&entity, wire)?,
            None => Filter::empty(),
        };
        if let Some((scope_filter, _)) = &scope {
            filter = filter.and(scope_filter.clone());
        }
        if let Some(row_filter) = row_filter {
            filter = filter.and(row_filter);
        }
        let condition = translate(&filter);

        let plan = if count {
            QueryPlan::count_rows(&entity.name).with_condition(condition)
        } else {
            QueryPlan::select(&entity.name, project(&entity, &args.fields))
                .with_condition(condition)
                .with_page(Page::from_args(args.skip, args.take))
                .with_relation(scope.as_ref().map(|(_, kind)| *kind))
        };

        let request = self
            .hooks
            .run_before_send_query(
                &entity.name,
                OperationKind::Read,
                ConnectorRequest::Query(plan),
                &mut ctx,
            )
            .await?;
        let ConnectorRequest::Query(plan) = request else {
            return Err(Error::Hook(
                "beforeSendQuery changed the request kind".to_string(),
            ));
        };

        let output = self.connector_for(&entity)?.query(plan).await?;
        self.hooks
            .run_after_query_result(&entity.name, OperationKind::Read, output, &mut ctx)
            .await
    }
}
