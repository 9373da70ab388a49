//! Argument-set building.
//!
//! The transport layer registers, per entity, an argument surface: pagination
//! args, a filter input listing each filterable column with its permitted
//! operators (plus implicit `_and`/`_or` self-references), and a data input
//! listing writable columns. Building that surface walks the entity metadata,
//! so the result is memoized per `(entity, options)`.
//!
//! The cache is an explicit structure owned by this module — no global
//! state. Computation happens outside the lock: a concurrent first access on
//! the same key may recompute redundantly, which is safe because the value is
//! pure and deterministic for a key; the last write wins.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::filter::FilterOperator;
use crate::schema::{ColumnType, Entity};

/// Which parts of the argument surface to build, plus the `include` /
/// `required` column selections. The literal `"pk"` in either list stands
/// for every primary-key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ArgumentOptions {
    pub filter: bool,
    pub data: bool,
    pub pagination: bool,
    pub include: Option<Vec<String>>,
    pub required: Option<Vec<String>>,
}

impl ArgumentOptions {
    /// Typical read surface: filter + pagination.
    pub fn read() -> Self {
        Self {
            filter: true,
            pagination: true,
            ..Self::default()
        }
    }

    /// Typical write surface: data input only.
    pub fn write() -> Self {
        Self {
            data: true,
            ..Self::default()
        }
    }

    fn selected(&self, entity: &Entity, column: &str) -> bool {
        match &self.include {
            None => true,
            Some(include) => {
                include.iter().any(|name| name == column)
                    || (entity.primary_keys.iter().any(|pk| pk == column)
                        && include.iter().any(|name| name == "pk"))
            }
        }
    }

    fn is_required(&self, entity: &Entity, column: &str) -> bool {
        match &self.required {
            None => false,
            Some(required) => {
                required.iter().any(|name| name == column)
                    || (entity.primary_keys.iter().any(|pk| pk == column)
                        && required.iter().any(|name| name == "pk"))
            }
        }
    }
}

/// One filterable column and the operators it accepts. `_in`/`_nin` are
/// list-valued; the rest take one scalar of the column's type.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterField {
    pub column: String,
    pub column_type: ColumnType,
    pub operators: Vec<FilterOperator>,
}

/// One writable column of the data input.
#[derive(Debug, Clone, PartialEq)]
pub struct DataField {
    pub column: String,
    pub column_type: ColumnType,
    pub required: bool,
}

/// The compiled argument surface for one `(entity, options)` pair.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArgumentSet {
    /// Expose `skip`/`take` pagination arguments.
    pub pagination: bool,
    pub filter_fields: Option<Vec<FilterField>>,
    pub data_fields: Option<Vec<DataField>>,
}

/// Build the argument surface for an entity. Pure; memoized by
/// [`ArgumentCache`].
pub fn build_argument_set(entity: &Entity, options: &ArgumentOptions) -> ArgumentSet {
    let filter_fields = options.filter.then(|| {
        entity
            .columns
            .iter()
            .filter(|column| column.filterable.is_enabled())
            .filter(|column| options.selected(entity, &column.name))
            .map(|column| FilterField {
                column: column.name.clone(),
                column_type: column.column_type,
                operators: column.filterable.operators(),
            })
            .collect()
    });

    let data_fields = options.data.then(|| {
        entity
            .columns
            .iter()
            .filter(|column| {
                column.editable || entity.primary_keys.contains(&column.name)
            })
            .filter(|column| options.selected(entity, &column.name))
            .map(|column| DataField {
                column: column.name.clone(),
                column_type: column.column_type,
                required: options.is_required(entity, &column.name),
            })
            .collect()
    });

    ArgumentSet {
        pagination: options.pagination,
        filter_fields,
        data_fields,
    }
}

/// Memoized argument sets, keyed by `(entity name, options)`.
#[derive(Default)]
pub struct ArgumentCache {
    inner: RwLock<HashMap<(String, ArgumentOptions), Arc<ArgumentSet>>>,
}

impl ArgumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(&self, entity: &Entity, options: &ArgumentOptions) -> Arc<ArgumentSet> {
        let key = (entity.name.clone(), options.clone());
        if let Some(hit) = self.inner.read().get(&key) {
            return hit.clone();
        }
        let built = Arc::new(build_argument_set(entity, options));
        self.inner.write().insert(key, built.clone());
        built
    }
}
