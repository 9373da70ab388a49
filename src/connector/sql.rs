//! Postgres connector.
//!
//! Renders compiled conditions into parenthesized WHERE clauses with
//! numbered placeholders and a bind list, and executes them over a
//! `sqlx::PgPool`. One statement per operation (plus the write refetch);
//! no cross-entity transactions.
//!
//! Row values come back as JSON via `to_jsonb`, so the connector stays
//! agnostic of per-column Rust types.

use serde_json::Value as JsonValue;
use sqlx::PgPool;
use sqlx::postgres::{PgArguments, PgPoolOptions};

use crate::connector::{CreateArgs, DataConnector, OperationOutput, RemoveArgs, Row, UpdateArgs};
use crate::error::{Error, Result};
use crate::filter::FilterOperator;
use crate::query::{Comparison, Condition, QueryPlan};
use crate::schema::RelationKind;

use async_trait::async_trait;

/// SQL connector over a Postgres pool.
#[derive(Clone)]
pub struct SqlConnector {
    pool: PgPool,
}

impl SqlConnector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a fresh pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(Error::connector)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_json_rows(&self, sql: &str, params: &[JsonValue]) -> Result<Vec<Row>> {
        tracing::debug!(%sql, "select");
        let mut query = sqlx::query_scalar::<_, JsonValue>(sql);
        for value in params {
            query = bind_scalar(query, value);
        }
        let values = query
            .fetch_all(&self.pool)
            .await
            .map_err(Error::connector)?;
        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                JsonValue::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    /// Refetch rows by a key condition, honoring the projection.
    async fn refetch(
        &self,
        entity: &str,
        fields: &[String],
        condition: Condition,
    ) -> Result<Vec<Row>> {
        let plan = QueryPlan::select(entity, fields.to_vec()).with_condition(Some(condition));
        Ok(self.query(plan).await?.into_rows())
    }
}

#[async_trait]
impl DataConnector for SqlConnector {
    async fn query(&self, plan: QueryPlan) -> Result<OperationOutput> {
        let table = quote_ident(&plan.entity);
        let mut params = Vec::new();
        let where_clause = render_where(plan.condition.as_ref(), &mut params);

        if plan.count {
            let sql = format!("SELECT COUNT(*) FROM {table}{where_clause}");
            tracing::debug!(%sql, "count");
            let mut query = sqlx::query_scalar::<_, i64>(&sql);
            for value in &params {
                query = bind_count(query, value);
            }
            let count = query
                .fetch_one(&self.pool)
                .await
                .map_err(Error::connector)?;
            return Ok(OperationOutput::Count(count.max(0) as u64));
        }

        let columns = render_columns(&plan.fields);
        let paging = plan
            .page
            .map(|page| format!(" LIMIT {} OFFSET {}", page.limit(), page.offset()))
            .unwrap_or_default();
        let sql = format!(
            "SELECT to_jsonb(sub.*) FROM (SELECT {columns} FROM {table}{where_clause}{paging}) AS sub"
        );
        let mut rows = self.fetch_json_rows(&sql, &params).await?;

        if plan.relation == Some(RelationKind::ManyToOne) {
            let first = if rows.is_empty() {
                None
            } else {
                Some(rows.remove(0))
            };
            return Ok(OperationOutput::Row(first));
        }
        Ok(OperationOutput::Rows(rows))
    }

    async fn create(&self, args: CreateArgs) -> Result<Option<Row>> {
        let table = quote_ident(&args.entity);
        let mut params = Vec::new();

        let sql = if args.data.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES RETURNING to_jsonb({table}.*)")
        } else {
            let columns: Vec<String> = args.data.keys().map(|c| quote_ident(c)).collect();
            let values: Vec<String> = args
                .data
                .values()
                .map(|value| render_value(value, &mut params))
                .collect();
            format!(
                "INSERT INTO {table} ({}) VALUES ({}) RETURNING to_jsonb({table}.*)",
                columns.join(", "),
                values.join(", ")
            )
        };
        tracing::debug!(%sql, "insert");

        let mut query = sqlx::query_scalar::<_, JsonValue>(&sql);
        for value in &params {
            query = bind_scalar(query, value);
        }
        let inserted = query
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::connector)?;
        let Some(JsonValue::Object(inserted)) = inserted else {
            return Ok(None);
        };

        // Re-fetch by the generated key(s) so the caller gets the canonical
        // row, defaults included.
        let keys = key_condition(&args.pk_columns, std::slice::from_ref(&inserted))?;
        Ok(self
            .refetch(&args.entity, &args.fields, keys)
            .await?
            .into_iter()
            .next())
    }

    async fn update(&self, args: UpdateArgs) -> Result<Option<Row>> {
        let table = quote_ident(&args.entity);

        // Capture the keys of the rows the condition matches now; the
        // refetch goes by these keys, not by re-running the condition.
        let mut params = Vec::new();
        let where_clause = render_where(args.condition.as_ref(), &mut params);
        let pk_list = render_columns(&args.pk_columns);
        let capture_sql = format!(
            "SELECT to_jsonb(sub.*) FROM (SELECT {pk_list} FROM {table}{where_clause}) AS sub"
        );
        let matched = self.fetch_json_rows(&capture_sql, &params).await?;
        if matched.is_empty() {
            return Ok(None);
        }
        let keys = key_condition(&args.pk_columns, &matched)?;

        // A payload normalized down to nothing is a no-op write; the refetch
        // below still returns the matched row.
        if !args.data.is_empty() {
            let mut params = Vec::new();
            let assignments: Vec<String> = args
                .data
                .iter()
                .map(|(column, value)| {
                    format!("{} = {}", quote_ident(column), render_value(value, &mut params))
                })
                .collect();
            let where_keys = render_where(Some(&keys), &mut params);
            let sql = format!("UPDATE {table} SET {}{where_keys}", assignments.join(", "));
            tracing::debug!(%sql, "update");

            let mut query = sqlx::query(&sql);
            for value in &params {
                query = bind_query(query, value);
            }
            query.execute(&self.pool).await.map_err(Error::connector)?;
        }

        Ok(self
            .refetch(&args.entity, &args.fields, keys)
            .await?
            .into_iter()
            .next())
    }

    async fn remove(&self, args: RemoveArgs) -> Result<u64> {
        let table = quote_ident(&args.entity);
        let mut params = Vec::new();
        let where_clause = render_where(args.condition.as_ref(), &mut params);
        let sql = format!("DELETE FROM {table}{where_clause}");
        tracing::debug!(%sql, "delete");

        let mut query = sqlx::query(&sql);
        for value in &params {
            query = bind_query(query, value);
        }
        let result = query.execute(&self.pool).await.map_err(Error::connector)?;
        Ok(result.rows_affected())
    }
}

/// Key-set condition for write refetches: `pk IN (...)` for a single-column
/// key, `OR` of per-row `AND` groups for composite keys.
fn key_condition(pk_columns: &[String], rows: &[Row]) -> Result<Condition> {
    let value_of = |row: &Row, pk: &String| -> Result<JsonValue> {
        row.get(pk).cloned().ok_or_else(|| {
            Error::Connector(anyhow::anyhow!("write did not return key column `{pk}`"))
        })
    };

    if let [pk] = pk_columns {
        let values = rows
            .iter()
            .map(|row| value_of(row, pk))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Condition::Compare(Comparison {
            column: pk.clone(),
            operator: FilterOperator::In,
            value: JsonValue::Array(values),
        }));
    }

    let groups = rows
        .iter()
        .map(|row| {
            let comparisons = pk_columns
                .iter()
                .map(|pk| {
                    Ok(Condition::Compare(Comparison {
                        column: pk.clone(),
                        operator: FilterOperator::Eq,
                        value: value_of(row, pk)?,
                    }))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Condition::All(comparisons))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Condition::Any(groups))
}

fn render_where(condition: Option<&Condition>, params: &mut Vec<JsonValue>) -> String {
    match condition {
        Some(condition) => format!(" WHERE {}", render_condition(condition, params)),
        None => String::new(),
    }
}

fn render_condition(condition: &Condition, params: &mut Vec<JsonValue>) -> String {
    match condition {
        Condition::All(children) if children.is_empty() => "TRUE".to_string(),
        Condition::Any(children) if children.is_empty() => "FALSE".to_string(),
        Condition::All(children) => group(children, " AND ", params),
        Condition::Any(children) => group(children, " OR ", params),
        Condition::Compare(cmp) => render_comparison(cmp, params),
    }
}

fn group(children: &[Condition], joiner: &str, params: &mut Vec<JsonValue>) -> String {
    let parts: Vec<String> = children
        .iter()
        .map(|child| render_condition(child, params))
        .collect();
    format!("({})", parts.join(joiner))
}

fn render_comparison(cmp: &Comparison, params: &mut Vec<JsonValue>) -> String {
    let column = quote_ident(&cmp.column);
    match cmp.operator {
        FilterOperator::Eq => format!("{column} = {}", render_value(&cmp.value, params)),
        FilterOperator::Neq => format!("{column} <> {}", render_value(&cmp.value, params)),
        FilterOperator::Lt => format!("{column} < {}", render_value(&cmp.value, params)),
        FilterOperator::Lte => format!("{column} <= {}", render_value(&cmp.value, params)),
        FilterOperator::Gt => format!("{column} > {}", render_value(&cmp.value, params)),
        FilterOperator::Gte => format!("{column} >= {}", render_value(&cmp.value, params)),
        FilterOperator::In | FilterOperator::Nin => {
            let items = cmp.value.as_array().cloned().unwrap_or_default();
            let negated = cmp.operator == FilterOperator::Nin;
            if items.is_empty() {
                // IN () is not valid SQL; the empty list has fixed truth.
                return if negated { "TRUE" } else { "FALSE" }.to_string();
            }
            let placeholders: Vec<String> = items
                .iter()
                .map(|item| render_value(item, params))
                .collect();
            let keyword = if negated { "NOT IN" } else { "IN" };
            format!("{column} {keyword} ({})", placeholders.join(", "))
        }
        FilterOperator::Like => format!("{column} LIKE {}", render_value(&cmp.value, params)),
        FilterOperator::Nlike => {
            format!("{column} NOT LIKE {}", render_value(&cmp.value, params))
        }
        FilterOperator::IsNull => format!("{column} IS NULL"),
    }
}

/// Push a bind value and return its placeholder; JSON null renders as a NULL
/// literal so untyped null binds never reach the driver.
fn render_value(value: &JsonValue, params: &mut Vec<JsonValue>) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }
    params.push(value.clone());
    format!("${}", params.len())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn bind_query<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    value: &JsonValue,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match value {
        JsonValue::String(s) => query.bind(s.clone()),
        JsonValue::Number(n) if n.is_i64() => query.bind(n.as_i64().unwrap_or_default()),
        JsonValue::Number(n) => query.bind(n.as_f64().unwrap_or_default()),
        JsonValue::Bool(b) => query.bind(*b),
        other => query.bind(other.clone()),
    }
}

fn bind_scalar<'q>(
    query: sqlx::query::QueryScalar<'q, sqlx::Postgres, JsonValue, PgArguments>,
    value: &JsonValue,
) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, JsonValue, PgArguments> {
    match value {
        JsonValue::String(s) => query.bind(s.clone()),
        JsonValue::Number(n) if n.is_i64() => query.bind(n.as_i64().unwrap_or_default()),
        JsonValue::Number(n) => query.bind(n.as_f64().unwrap_or_default()),
        JsonValue::Bool(b) => query.bind(*b),
        other => query.bind(other.clone()),
    }
}

fn bind_count<'q>(
    query: sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, PgArguments>,
    value: &JsonValue,
) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, PgArguments> {
    match value {
        JsonValue::String(s) => query.bind(s.clone()),
        JsonValue::Number(n) if n.is_i64() => query.bind(n.as_i64().unwrap_or_default()),
        JsonValue::Number(n) => query.bind(n.as_f64().unwrap_or_default()),
        JsonValue::Bool(b) => query.bind(*b),
        other => query.bind(other.clone()),
    }
}

fn render_columns(fields: &[String]) -> String {
    if fields.is_empty() {
        return "*".to_string();
    }
    fields
        .iter()
        .map(|f| quote_ident(f))
        .collect::<Vec<_>>()
        .join(", ")
}
