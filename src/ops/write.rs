//! Write orchestrators: create, update, delete.

use crate::auth::Caller;
use crate::connector::{ConnectorRequest, CreateArgs, OperationOutput, RemoveArgs, Row, UpdateArgs};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::hooks::OperationContext;
use crate::ops::OperationArgs;
use crate::query::project::project;
use crate::query::translate::translate;
use crate::schema::{Entity, OperationKind};

impl Engine {
    /// Insert one row and return the canonical refetched row, or `None` when
    /// nothing was inserted.
    pub async fn create(
        &self,
        entity: &str,
        args: OperationArgs,
        caller: &Caller,
    ) -> Result<Option<Row>> {
        let entity = self.entity(entity)?;
        tracing::debug!(entity = %entity.name, "create");
        let mut ctx = OperationContext::new(caller.clone());

        let args = self
            .hooks
            .run_before_resolver(&entity.name, OperationKind::Create, args, &mut ctx)
            .await?;
        self.gate.check(&entity, OperationKind::Create, caller)?;

        let data = normalize(&entity, args.data.clone().unwrap_or_default());
        let request = CreateArgs {
            entity: entity.name.clone(),
            fields: project(&entity, &args.fields),
            data,
            pk_columns: entity.primary_keys.clone(),
        };

        let request = self
            .hooks
            .run_before_send_query(
                &entity.name,
                OperationKind::Create,
                ConnectorRequest::Create(request),
                &mut ctx,
            )
            .await?;
        let ConnectorRequest::Create(request) = request else {
            return Err(Error::Hook(
                "beforeSendQuery changed the request kind".to_string(),
            ));
        };

        let created = self.connector_for(&entity)?.create(request).await?;
        let output = self
            .hooks
            .run_after_query_result(
                &entity.name,
                OperationKind::Create,
                OperationOutput::Row(created),
                &mut ctx,
            )
            .await?;
        Ok(output.into_row())
    }

    /// Update the rows matched by the filter and return the refetched row,
    /// or `None` when the filter matched nothing (not an error).
    pub async fn update(
        &self,
        entity: &str,
        args: OperationArgs,
        caller: &Caller,
    ) -> Result<Option<Row>> {
        let entity = self.entity(entity)?;
        tracing::debug!(entity = %entity.name, "update");
        let mut ctx = OperationContext::new(caller.clone());

        let args = self
            .hooks
            .run_before_resolver(&entity.name, OperationKind::Update, args, &mut ctx)
            .await?;
        let row_filter = self.gate.check(&entity, OperationKind::Update, caller)?;
        let condition = translate(&self.merged_filter(&entity, &args, row_filter)?);

        let data = normalize(&entity, args.data.clone().unwrap_or_default());
        let request = UpdateArgs {
            entity: entity.name.clone(),
            fields: project(&entity, &args.fields),
            condition,
            data,
            pk_columns: entity.primary_keys.clone(),
        };

        let request = self
            .hooks
            .run_before_send_query(
                &entity.name,
                OperationKind::Update,
                ConnectorRequest::Update(request),
                &mut ctx,
            )
            .await?;
        let ConnectorRequest::Update(request) = request else {
            return Err(Error::Hook(
                "beforeSendQuery changed the request kind".to_string(),
            ));
        };

        let updated = self.connector_for(&entity)?.update(request).await?;
        let output = self
            .hooks
            .run_after_query_result(
                &entity.name,
                OperationKind::Update,
                OperationOutput::Row(updated),
                &mut ctx,
            )
            .await?;
        Ok(output.into_row())
    }

    /// Delete the rows matched by the filter, returning the removed count.
    pub async fn remove(
        &self,
        entity: &str,
        args: OperationArgs,
        caller: &Caller,
    ) -> Result<u64> {
        let entity = self.entity(entity)?;
        tracing::debug!(entity = %entity.name, "delete");
        let mut ctx = OperationContext::new(caller.clone());

        let args = self
            .hooks
            .run_before_resolver(&entity.name, OperationKind::Delete, args, &mut ctx)
            .await?;
        let row_filter = self.gate.check(&entity, OperationKind::Delete, caller)?;
        let condition = translate(&self.merged_filter(&entity, &args, row_filter)?);

        let request = RemoveArgs {
            entity: entity.name.clone(),
            condition,
        };
        let request = self
            .hooks
            .run_before_send_query(
                &entity.name,
                OperationKind::Delete,
                ConnectorRequest::Remove(request),
                &mut ctx,
            )
            .await?;
        let ConnectorRequest::Remove(request) = request else {
            return Err(Error::Hook(
                "beforeSendQuery changed the request kind".to_string(),
            ));
        };

        let removed = self.connector_for(&entity)?.remove(request).await?;
        let output = self
            .hooks
            .run_after_query_result(
                &entity.name,
                OperationKind::Delete,
                OperationOutput::Count(removed),
                &mut ctx,
            )
            .await?;
        Ok(output.into_count())
    }

    fn merged_filter(
        &self,
        entity: &Entity,
        args: &OperationArgs,
        row_filter: Option<Filter>,
    ) -> Result<Filter> {
        let mut filter = match &args.filter {
            Some(wire) => Filter::parse(entity, wire)?,
            None => Filter::empty(),
        };
        if let Some(row_filter) = row_filter {
            filter = filter.and(row_filter);
        }
        Ok(filter)
    }
}

/// Trim a write payload to the entity's writable surface: known columns that
/// are editable, plus primary keys (so client-supplied composite keys
/// survive). Everything else is dropped silently.
fn normalize(entity: &Entity, data: Row) -> Row {
    let mut normalized = Row::new();
    for (column, value) in data {
        let keep = entity
            .column(&column)
            .is_some_and(|c| c.editable || entity.primary_keys.contains(&column));
        if keep {
            normalized.insert(column, value);
        } else {
            tracing::debug!(entity = %entity.name, %column, "dropped non-writable field");
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn accounts() -> Entity {
        Entity::new("accounts")
            .column_def(Column::new("id", ColumnType::Integer).not_editable())
            .column_def(Column::new("email", ColumnType::String))
            .column_def(Column::new("created_at", ColumnType::String).not_editable())
            .primary_key("id")
    }

    #[test]
    fn test_normalize_keeps_editable_and_keys() {
        let data = json!({
            "id": 7,
            "email": "a@b.c",
            "created_at": "2026-01-01",
            "unknown": true
        });
        let normalized = normalize(&accounts(), data.as_object().cloned().unwrap());
        assert_eq!(
            normalized,
            json!({"id": 7, "email": "a@b.c"}).as_object().cloned().unwrap()
        );
    }
}
