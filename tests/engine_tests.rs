//! End-to-end engine tests over the in-memory connector.
//!
//! These drive the full operation pipeline — hooks, authorization, filter
//! parsing, translation, projection, relation scoping, connector execution —
//! the way a transport layer would.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value as JsonValue, json};

use tablesmith::{
    AfterQueryResultHook, BeforeResolverHook, BeforeSendQueryHook, Caller, Column, ColumnType,
    ConnectorRequest, CreateArgs, DataConnector, Engine, Entity, Error, MemoryConnector,
    OperationArgs, OperationContext, OperationKind, OperationOutput, Page, QueryPlan, Related,
    RelationKind, RemoveArgs, Result, RoleRules, Row, UpdateArgs,
};

// ============================================================================
// Fixtures
// ============================================================================

fn users_entity() -> Entity {
    Entity::new("users")
        .column_def(Column::new("id", ColumnType::Integer).not_editable())
        .column_def(Column::new("name", ColumnType::String))
        .primary_key("id")
        .relation(tablesmith::Relation {
            name: "posts".to_string(),
            kind: RelationKind::OneToMany,
            remote_entity: "posts".to_string(),
            local_key: "id".to_string(),
            foreign_key: "author_id".to_string(),
        })
}

fn posts_entity() -> Entity {
    Entity::new("posts")
        .column_def(Column::new("id", ColumnType::Integer).not_editable())
        .column_def(Column::new("title", ColumnType::String))
        .column_def(Column::new("status", ColumnType::String))
        .column_def(Column::new("priority", ColumnType::String))
        .column_def(Column::new("author_id", ColumnType::Integer))
        .column_def(Column::new("views", ColumnType::Integer))
        .primary_key("id")
        .relation(tablesmith::Relation {
            name: "author".to_string(),
            kind: RelationKind::ManyToOne,
            remote_entity: "users".to_string(),
            local_key: "author_id".to_string(),
            foreign_key: "id".to_string(),
        })
        .roles(RoleRules {
            delete: vec!["admin".to_string()],
            ..RoleRules::default()
        })
}

fn memberships_entity() -> Entity {
    Entity::new("memberships")
        .column_def(Column::new("group_id", ColumnType::Integer))
        .column_def(Column::new("user_id", ColumnType::Integer))
        .column_def(Column::new("role", ColumnType::String))
        .primary_key("group_id")
        .primary_key("user_id")
}

fn seeded_connector() -> Arc<MemoryConnector> {
    Arc::new(
        MemoryConnector::new()
            .with_rows(
                "users",
                json!([
                    {"id": 1, "name": "ana"},
                    {"id": 2, "name": "bo"}
                ]),
            )
            .with_rows(
                "posts",
                json!([
                    {"id": 1, "title": "a", "status": "open",   "priority": "high",   "author_id": 1,    "views": 10},
                    {"id": 2, "title": "b", "status": "open",   "priority": "urgent", "author_id": 1,    "views": 20},
                    {"id": 3, "title": "c", "status": "open",   "priority": "low",    "author_id": 2,    "views": 30},
                    {"id": 4, "title": "d", "status": "closed", "priority": "high",   "author_id": 2,    "views": 40},
                    {"id": 5, "title": "e", "status": "closed", "priority": "urgent", "author_id": null, "views": 50}
                ]),
            )
            .with_rows("memberships", json!([])),
    )
}

fn engine_over(connector: Arc<dyn DataConnector>) -> Engine {
    Engine::builder()
        .connector("default", connector)
        .entity(users_entity())
        .entity(posts_entity())
        .entity(memberships_entity())
        .build()
        .expect("valid configuration")
}

fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .map(|row| row.get("id").and_then(JsonValue::as_i64).unwrap_or(-1))
        .collect()
}

// ============================================================================
// Filter translation semantics
// ============================================================================

mod filtering {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_and_of_or_composes_correctly() {
        let engine = engine_over(seeded_connector());
        // status=open AND (priority=high OR priority=urgent) — must not be
        // (status=open AND priority=high) OR priority=urgent.
        let rows = engine
            .list(
                "posts",
                OperationArgs::new().with_filter(json!({
                    "_and": [
                        {"status": {"_eq": "open"}},
                        {"_or": [
                            {"priority": {"_eq": "high"}},
                            {"priority": {"_eq": "urgent"}}
                        ]}
                    ]
                })),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_predicates_inside_or_join_with_or() {
        let engine = engine_over(seeded_connector());
        let rows = engine
            .list(
                "posts",
                OperationArgs::new().with_filter(json!({
                    "_or": [{
                        "status": {"_eq": "closed"},
                        "priority": {"_eq": "low"}
                    }]
                })),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        // closed OR low, not closed AND low.
        assert_eq!(ids(&rows), vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_top_level_predicates_join_with_and() {
        let engine = engine_over(seeded_connector());
        let rows = engine
            .list(
                "posts",
                OperationArgs::new().with_filter(json!({
                    "status": {"_eq": "open"},
                    "priority": {"_eq": "urgent"}
                })),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![2]);
    }

    #[tokio::test]
    async fn test_empty_in_matches_nothing() {
        let engine = engine_over(seeded_connector());
        let rows = engine
            .list(
                "posts",
                OperationArgs::new().with_filter(json!({"id": {"_in": []}})),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(rows, Vec::<Row>::new());
    }

    #[tokio::test]
    async fn test_empty_nin_matches_everything() {
        let engine = engine_over(seeded_connector());
        let rows = engine
            .list(
                "posts",
                OperationArgs::new().with_filter(json!({"id": {"_nin": []}})),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_range_and_like_operators() {
        let engine = engine_over(seeded_connector());
        let rows = engine
            .list(
                "posts",
                OperationArgs::new().with_filter(json!({
                    "views": {"_gte": 20},
                    "status": {"_like": "clo%"}
                })),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![4, 5]);
    }

    #[tokio::test]
    async fn test_is_null_tests_nullity() {
        let engine = engine_over(seeded_connector());
        let rows = engine
            .list(
                "posts",
                OperationArgs::new().with_filter(json!({"author_id": {"_is_null": true}})),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![5]);
    }

    #[tokio::test]
    async fn test_invalid_filter_aborts_before_any_connector_call() {
        let counting = Arc::new(CountingConnector::default());
        let engine = engine_over(counting.clone());
        let err = engine
            .list(
                "posts",
                OperationArgs::new().with_filter(json!({"nope": {"_eq": 1}})),
                &Caller::anonymous(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));
        assert_eq!(counting.calls(), 0);
    }
}

// ============================================================================
// Projection & pagination
// ============================================================================

mod reading {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_projection_always_includes_primary_keys() {
        let engine = engine_over(seeded_connector());
        let rows = engine
            .list(
                "posts",
                OperationArgs::new()
                    .with_filter(json!({"id": {"_eq": 1}}))
                    .with_fields(["title"]),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(
            rows,
            vec![json!({"id": 1, "title": "a"}).as_object().cloned().unwrap()]
        );

        // Even a zero-field request still fetches the keys.
        let rows = engine
            .list(
                "posts",
                OperationArgs::new().with_filter(json!({"id": {"_eq": 1}})),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(rows, vec![json!({"id": 1}).as_object().cloned().unwrap()]);
    }

    #[tokio::test]
    async fn test_pagination_skips_pages() {
        let engine = engine_over(seeded_connector());
        let rows = engine
            .list(
                "posts",
                OperationArgs::new().with_page(1, 2),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_count_applies_filter_and_ignores_pagination() {
        let engine = engine_over(seeded_connector());
        let count = engine
            .count(
                "posts",
                OperationArgs::new()
                    .with_filter(json!({"status": {"_eq": "open"}}))
                    .with_page(1, 1),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(count, 3);
    }
}

// ============================================================================
// Relation hops
// ============================================================================

mod relations {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_to_one_returns_single_row() {
        let engine = engine_over(seeded_connector());
        let parent = json!({"id": 1, "author_id": 1}).as_object().cloned().unwrap();
        let related = engine
            .related(
                "posts",
                "author",
                &parent,
                OperationArgs::new().with_fields(["name"]),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(
            related,
            Related::One(Some(
                json!({"id": 1, "name": "ana"}).as_object().cloned().unwrap()
            ))
        );
    }

    #[tokio::test]
    async fn test_to_one_with_null_key_is_empty_not_unscoped() {
        let engine = engine_over(seeded_connector());
        let parent = json!({"id": 5, "author_id": null}).as_object().cloned().unwrap();
        let related = engine
            .related(
                "posts",
                "author",
                &parent,
                OperationArgs::new().with_fields(["name"]),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(related, Related::One(None));
    }

    #[tokio::test]
    async fn test_to_many_scopes_to_parent_and_merges_filter() {
        let engine = engine_over(seeded_connector());
        let parent = json!({"id": 1}).as_object().cloned().unwrap();
        let related = engine
            .related(
                "users",
                "posts",
                &parent,
                OperationArgs::new().with_filter(json!({"priority": {"_eq": "urgent"}})),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        let Related::Many(rows) = related else {
            panic!("expected a to-many result")
        };
        assert_eq!(ids(&rows), vec![2]);
    }
}

// ============================================================================
// Writes
// ============================================================================

mod writes {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_returns_canonical_refetched_row() {
        let engine = engine_over(seeded_connector());
        let created = engine
            .create(
                "posts",
                OperationArgs::new()
                    .with_data(json!({
                        "title": "f",
                        "status": "open",
                        "priority": "low",
                        "author_id": 2,
                        "views": 0,
                        "not_a_column": true
                    }))
                    .with_fields(["title", "status"]),
                &Caller::anonymous(),
            )
            .await
            .unwrap()
            .expect("inserted row");
        assert_eq!(
            created,
            json!({"id": 6, "title": "f", "status": "open"})
                .as_object()
                .cloned()
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_create_with_composite_key_refetches_exact_row() {
        let engine = engine_over(seeded_connector());
        let caller = Caller::anonymous();
        engine
            .create(
                "memberships",
                OperationArgs::new()
                    .with_data(json!({"group_id": 1, "user_id": 9, "role": "owner"})),
                &caller,
            )
            .await
            .unwrap();
        let created = engine
            .create(
                "memberships",
                OperationArgs::new()
                    .with_data(json!({"group_id": 1, "user_id": 10, "role": "member"}))
                    .with_fields(["role"]),
                &caller,
            )
            .await
            .unwrap()
            .expect("inserted row");
        assert_eq!(
            created,
            json!({"group_id": 1, "user_id": 10, "role": "member"})
                .as_object()
                .cloned()
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_update_refetches_even_when_filter_denormalizes() {
        let engine = engine_over(seeded_connector());
        // The filter selects by the very column the write changes.
        let updated = engine
            .update(
                "posts",
                OperationArgs::new()
                    .with_filter(json!({"id": {"_eq": 1}, "status": {"_eq": "open"}}))
                    .with_data(json!({"status": "closed"}))
                    .with_fields(["status"]),
                &Caller::anonymous(),
            )
            .await
            .unwrap()
            .expect("updated row");
        assert_eq!(
            updated,
            json!({"id": 1, "status": "closed"}).as_object().cloned().unwrap()
        );
    }

    #[tokio::test]
    async fn test_update_zero_matches_returns_empty_not_error() {
        let engine = engine_over(seeded_connector());
        let updated = engine
            .update(
                "posts",
                OperationArgs::new()
                    .with_filter(json!({"status": {"_eq": "archived"}}))
                    .with_data(json!({"status": "closed"})),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(updated, None);
    }

    #[tokio::test]
    async fn test_delete_returns_removed_count() {
        let connector = seeded_connector();
        let engine = engine_over(connector.clone());
        let removed = engine
            .remove(
                "posts",
                OperationArgs::new().with_filter(json!({"status": {"_eq": "open"}})),
                &Caller::with_roles(["admin"]),
            )
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert_eq!(connector.rows("posts").len(), 2);
    }
}

// ============================================================================
// Authorization
// ============================================================================

mod authorization {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_delete_denied_before_any_connector_call() {
        let counting = Arc::new(CountingConnector::default());
        let engine = engine_over(counting.clone());
        let err = engine
            .remove(
                "posts",
                OperationArgs::new().with_filter(json!({"id": {"_eq": 1}})),
                &Caller::anonymous(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authorization { .. }));
        assert_eq!(counting.calls(), 0);
    }

    #[tokio::test]
    async fn test_row_policy_scopes_reads() {
        let engine = Engine::builder()
            .connector("default", seeded_connector())
            .entity(users_entity())
            .entity(posts_entity())
            .entity(memberships_entity())
            .row_policy("posts", OperationKind::Read, |caller| {
                caller
                    .id
                    .as_ref()
                    .and_then(|id| id.parse::<i64>().ok())
                    .map(|id| json!({"author_id": {"_eq": id}}))
            })
            .build()
            .unwrap();

        let rows = engine
            .list(
                "posts",
                OperationArgs::new().with_filter(json!({"status": {"_eq": "open"}})),
                &Caller::new("1", Vec::<String>::new()),
            )
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![1, 2]);
    }
}

// ============================================================================
// Lifecycle hooks
// ============================================================================

mod lifecycle {
    use super::*;
    use pretty_assertions::assert_eq;

    struct InjectFilter;

    #[async_trait]
    impl BeforeResolverHook for InjectFilter {
        async fn call(
            &self,
            mut args: OperationArgs,
            ctx: &mut OperationContext,
        ) -> Result<OperationArgs> {
            args.filter = Some(json!({"status": {"_eq": "open"}}));
            ctx.state.insert("injected".to_string(), json!(true));
            Ok(args)
        }
    }

    struct CapPageSize;

    #[async_trait]
    impl BeforeSendQueryHook for CapPageSize {
        async fn call(
            &self,
            request: ConnectorRequest,
            _ctx: &mut OperationContext,
        ) -> Result<ConnectorRequest> {
            match request {
                ConnectorRequest::Query(plan) => {
                    let page = Page::new(0, 2);
                    Ok(ConnectorRequest::Query(plan.with_page(Some(page))))
                }
                other => Ok(other),
            }
        }
    }

    struct StampRows;

    #[async_trait]
    impl AfterQueryResultHook for StampRows {
        async fn call(
            &self,
            output: OperationOutput,
            ctx: &mut OperationContext,
        ) -> Result<OperationOutput> {
            // Reads state written by the first stage: the context bag spans
            // the whole call.
            let injected = ctx.state.get("injected").cloned().unwrap_or(json!(false));
            match output {
                OperationOutput::Rows(mut rows) => {
                    for row in &mut rows {
                        row.insert("hooked".to_string(), injected.clone());
                    }
                    Ok(OperationOutput::Rows(rows))
                }
                other => Ok(other),
            }
        }
    }

    struct RejectEverything;

    #[async_trait]
    impl BeforeSendQueryHook for RejectEverything {
        async fn call(
            &self,
            _request: ConnectorRequest,
            _ctx: &mut OperationContext,
        ) -> Result<ConnectorRequest> {
            Err(Error::Hook("nope".to_string()))
        }
    }

    #[tokio::test]
    async fn test_three_stage_rewrite_pipeline() {
        let engine = Engine::builder()
            .connector("default", seeded_connector())
            .entity(users_entity())
            .entity(posts_entity())
            .entity(memberships_entity())
            .before_resolver("posts", OperationKind::Read, Arc::new(InjectFilter))
            .before_send_query("posts", OperationKind::Read, Arc::new(CapPageSize))
            .after_query_result("posts", OperationKind::Read, Arc::new(StampRows))
            .build()
            .unwrap();

        let rows = engine
            .list("posts", OperationArgs::new(), &Caller::anonymous())
            .await
            .unwrap();

        // beforeResolver narrowed to open posts, beforeSendQuery capped the
        // page at two rows, afterQueryResult stamped each row.
        assert_eq!(ids(&rows), vec![1, 2]);
        assert!(rows.iter().all(|row| row.get("hooked") == Some(&json!(true))));
    }

    #[tokio::test]
    async fn test_failing_hook_aborts_before_connector() {
        let counting = Arc::new(CountingConnector::default());
        let engine = Engine::builder()
            .connector("default", counting.clone())
            .entity(users_entity())
            .entity(posts_entity())
            .entity(memberships_entity())
            .before_send_query("posts", OperationKind::Read, Arc::new(RejectEverything))
            .build()
            .unwrap();

        let err = engine
            .list("posts", OperationArgs::new(), &Caller::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Hook(_)));
        assert_eq!(counting.calls(), 0);
    }
}

// ============================================================================
// Argument surface
// ============================================================================

mod arguments {
    use super::*;
    use pretty_assertions::assert_eq;
    use tablesmith::ArgumentOptions;

    #[tokio::test]
    async fn test_argument_sets_are_memoized_per_entity() {
        let engine = engine_over(seeded_connector());
        let options = ArgumentOptions::read();

        let first = engine.arguments("posts", &options).unwrap();
        let second = engine.arguments("posts", &options).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.pagination);
        assert!(first.filter_fields.is_some());

        let err = engine.arguments("nope", &options).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

// ============================================================================
// Counting connector (delegates to memory, tallies calls)
// ============================================================================

#[derive(Default)]
struct CountingConnector {
    inner: MemoryConnector,
    calls: AtomicUsize,
}

impl CountingConnector {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataConnector for CountingConnector {
    async fn query(&self, plan: QueryPlan) -> Result<OperationOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.query(plan).await
    }

    async fn create(&self, args: CreateArgs) -> Result<Option<Row>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create(args).await
    }

    async fn update(&self, args: UpdateArgs) -> Result<Option<Row>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.update(args).await
    }

    async fn remove(&self, args: RemoveArgs) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(args).await
    }
}
