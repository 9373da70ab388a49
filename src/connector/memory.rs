//! In-memory connector.
//!
//! Evaluates compiled conditions directly against JSON rows held in process
//! memory. Used for fixtures and tests, and as the reference semantics for
//! condition evaluation: comparisons against a null (or absent) column are
//! false, `_in []` matches nothing, `_nin []` matches everything, and
//! `_like` patterns use SQL `%`/`_` wildcards.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::{Value as JsonValue, json};

use crate::connector::{CreateArgs, DataConnector, OperationOutput, RemoveArgs, Row, UpdateArgs};
use crate::error::{Error, Result};
use crate::filter::FilterOperator;
use crate::query::{Comparison, Condition, QueryPlan};
use crate::schema::RelationKind;

/// Table store: entity name → rows, insertion order preserved.
#[derive(Default)]
pub struct MemoryConnector {
    tables: RwLock<HashMap<String, Vec<Row>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding from a JSON array literal; non-object items are
    /// ignored.
    pub fn with_rows(self, entity: &str, rows: JsonValue) -> Self {
        let rows = match rows {
            JsonValue::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    JsonValue::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        self.tables.write().insert(entity.to_string(), rows);
        self
    }

    /// Replace an entity's rows.
    pub fn seed(&self, entity: &str, rows: Vec<Row>) {
        self.tables.write().insert(entity.to_string(), rows);
    }

    /// Snapshot an entity's rows, for assertions.
    pub fn rows(&self, entity: &str) -> Vec<Row> {
        self.tables.read().get(entity).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl DataConnector for MemoryConnector {
    async fn query(&self, plan: QueryPlan) -> Result<OperationOutput> {
        let tables = self.tables.read();
        let rows = tables.get(&plan.entity).cloned().unwrap_or_default();
        drop(tables);

        let mut matched: Vec<Row> = rows
            .into_iter()
            .filter(|row| plan.condition.as_ref().is_none_or(|c| matches(c, row)))
            .collect();

        if plan.count {
            return Ok(OperationOutput::Count(matched.len() as u64));
        }

        if let Some(page) = plan.page {
            matched = matched
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.limit() as usize)
                .collect();
        }

        let mut projected: Vec<Row> = matched
            .into_iter()
            .map(|row| project_row(row, &plan.fields))
            .collect();

        if plan.relation == Some(RelationKind::ManyToOne) {
            let first = if projected.is_empty() {
                None
            } else {
                Some(projected.remove(0))
            };
            return Ok(OperationOutput::Row(first));
        }
        Ok(OperationOutput::Rows(projected))
    }

    async fn create(&self, args: CreateArgs) -> Result<Option<Row>> {
        let mut tables = self.tables.write();
        let rows = tables.entry(args.entity.clone()).or_default();

        let mut row = args.data;
        // Single integer keys autogenerate like a serial column; composite
        // keys must arrive with the data.
        if let [pk] = &args.pk_columns[..] {
            if row.get(pk).is_none_or(JsonValue::is_null) {
                let next = rows
                    .iter()
                    .filter_map(|r| r.get(pk).and_then(JsonValue::as_i64))
                    .max()
                    .unwrap_or(0)
                    + 1;
                row.insert(pk.clone(), json!(next));
            }
        }
        for pk in &args.pk_columns {
            if row.get(pk).is_none_or(JsonValue::is_null) {
                return Err(Error::Connector(anyhow::anyhow!(
                    "insert into `{}` is missing primary key `{pk}`",
                    args.entity
                )));
            }
        }

        rows.push(row.clone());

        let refetched = rows
            .iter()
            .find(|candidate| key_matches(candidate, &row, &args.pk_columns))
            .cloned();
        Ok(refetched.map(|r| project_row(r, &args.fields)))
    }

    async fn update(&self, args: UpdateArgs) -> Result<Option<Row>> {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(&args.entity) else {
            return Ok(None);
        };

        // Capture the matched rows before writing; the refetch goes by these
        // keys, not by re-running the condition, so a filter that stops
        // matching after the write still returns the touched row.
        let matched: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| args.condition.as_ref().is_none_or(|c| matches(c, row)))
            .map(|(i, _)| i)
            .collect();
        if matched.is_empty() {
            return Ok(None);
        }

        for &index in &matched {
            for (column, value) in &args.data {
                rows[index].insert(column.clone(), value.clone());
            }
        }

        Ok(Some(project_row(rows[matched[0]].clone(), &args.fields)))
    }

    async fn remove(&self, args: RemoveArgs) -> Result<u64> {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(&args.entity) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !args.condition.as_ref().is_none_or(|c| matches(c, row)));
        Ok((before - rows.len()) as u64)
    }
}

/// Evaluate a compiled condition against one row.
pub(crate) fn matches(condition: &Condition, row: &Row) -> bool {
    match condition {
        Condition::All(children) => children.iter().all(|c| matches(c, row)),
        Condition::Any(children) => children.iter().any(|c| matches(c, row)),
        Condition::Compare(cmp) => compare(cmp, row),
    }
}

fn compare(cmp: &Comparison, row: &Row) -> bool {
    let actual = row.get(&cmp.column).unwrap_or(&JsonValue::Null);
    match cmp.operator {
        FilterOperator::Eq => json_eq(actual, &cmp.value),
        FilterOperator::Neq => !actual.is_null() && !json_eq(actual, &cmp.value),
        FilterOperator::Lt => ordering(actual, &cmp.value).is_some_and(std::cmp::Ordering::is_lt),
        FilterOperator::Lte => ordering(actual, &cmp.value).is_some_and(std::cmp::Ordering::is_le),
        FilterOperator::Gt => ordering(actual, &cmp.value).is_some_and(std::cmp::Ordering::is_gt),
        FilterOperator::Gte => ordering(actual, &cmp.value).is_some_and(std::cmp::Ordering::is_ge),
        FilterOperator::In => list_items(&cmp.value).iter().any(|v| json_eq(actual, v)),
        FilterOperator::Nin => {
            let items = list_items(&cmp.value);
            // An empty exclusion list excludes nothing, null never matches a
            // non-empty one.
            items.is_empty()
                || (!actual.is_null() && !items.iter().any(|v| json_eq(actual, v)))
        }
        FilterOperator::Like => actual
            .as_str()
            .is_some_and(|s| like_match(cmp.value.as_str().unwrap_or_default(), s)),
        FilterOperator::Nlike => actual
            .as_str()
            .is_some_and(|s| !like_match(cmp.value.as_str().unwrap_or_default(), s)),
        FilterOperator::IsNull => actual.is_null(),
    }
}

fn list_items(value: &JsonValue) -> &[JsonValue] {
    value.as_array().map_or(&[], Vec::as_slice)
}

/// Whether two rows agree on every key column.
fn key_matches(candidate: &Row, row: &Row, pk_columns: &[String]) -> bool {
    pk_columns.iter().all(|pk| {
        match (candidate.get(pk), row.get(pk)) {
            (Some(a), Some(b)) => json_eq(a, b),
            _ => false,
        }
    })
}

/// Equality with numeric coercion: `1` and `1.0` compare equal, as they
/// would in SQL.
fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn ordering(a: &JsonValue, b: &JsonValue) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (JsonValue::Number(_), JsonValue::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// SQL LIKE: `%` matches any run, `_` matches one character.
fn like_match(pattern: &str, value: &str) -> bool {
    let translated = format!(
        "(?s)^{}$",
        regex::escape(pattern).replace('%', ".*").replace('_', ".")
    );
    Regex::new(&translated).map(|re| re.is_match(value)).unwrap_or(false)
}

/// Restrict a row to the projected fields; an empty projection keeps the
/// whole row.
fn project_row(row: Row, fields: &[String]) -> Row {
    if fields.is_empty() {
        return row;
    }
    let mut out = Row::new();
    for field in fields {
        if let Some(value) = row.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }
    out
}
