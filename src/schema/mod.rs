//! Entity configuration metadata.
//!
//! Entities describe the tables exposed through the engine: columns, primary
//! keys, relations, role requirements and the connector that serves them.
//! Configuration is deserialized (or built in code) once at startup, validated
//! by the engine builder, and shared read-only afterwards.

pub mod args;

use serde::{Deserialize, Serialize};

use crate::filter::FilterOperator;

/// The four operation kinds an entity can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Semantic column type, used for argument building and write validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Json,
}

/// Which filter operators a column accepts.
///
/// Mirrors the wire configuration: `true`/`false` or an explicit operator
/// list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filterable {
    Enabled(bool),
    Operators(Vec<FilterOperator>),
}

impl Default for Filterable {
    fn default() -> Self {
        Self::Enabled(true)
    }
}

impl Filterable {
    /// Whether the column can be filtered at all.
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Enabled(enabled) => *enabled,
            Self::Operators(ops) => !ops.is_empty(),
        }
    }

    /// Whether a specific operator is permitted on the column.
    pub fn allows(&self, operator: FilterOperator) -> bool {
        match self {
            Self::Enabled(enabled) => *enabled,
            Self::Operators(ops) => ops.contains(&operator),
        }
    }

    /// The concrete operator list this policy exposes.
    pub fn operators(&self) -> Vec<FilterOperator> {
        match self {
            Self::Enabled(true) => FilterOperator::ALL.to_vec(),
            Self::Enabled(false) => Vec::new(),
            Self::Operators(ops) => ops.clone(),
        }
    }
}

/// A physical column on an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Writable through create/update.
    #[serde(default = "default_true")]
    pub editable: bool,
    /// Exposed through the generated API surface.
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub filterable: Filterable,
}

impl Column {
    /// Shorthand for a fully open column of the given type.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            editable: true,
            visible: true,
            filterable: Filterable::default(),
        }
    }

    pub fn not_editable(mut self) -> Self {
        self.editable = false;
        self
    }

    pub fn not_nullable(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn filterable(mut self, filterable: Filterable) -> Self {
        self.filterable = filterable;
        self
    }
}

/// Direction of a declared relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    /// The owning entity references one remote row (`local_key` holds the
    /// reference).
    #[serde(rename = "n:1")]
    ManyToOne,
    /// Remote rows reference the owning entity (`foreign_key` on the remote
    /// side points back at `local_key`).
    #[serde(rename = "1:n")]
    OneToMany,
}

/// A single declared relation hop between two entities.
///
/// The scoping predicate is always `remote.foreign_key = parent.local_key`;
/// `local_key` must exist on the declaring entity and `foreign_key` on the
/// remote one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    /// Field name the relation is exposed under.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RelationKind,
    pub remote_entity: String,
    pub local_key: String,
    pub foreign_key: String,
}

/// Role lists per operation. An empty list leaves the operation open.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleRules {
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub create: Vec<String>,
    #[serde(default)]
    pub update: Vec<String>,
    #[serde(default)]
    pub delete: Vec<String>,
}

impl RoleRules {
    pub fn for_operation(&self, operation: OperationKind) -> &[String] {
        match operation {
            OperationKind::Read => &self.read,
            OperationKind::Create => &self.create,
            OperationKind::Update => &self.update,
            OperationKind::Delete => &self.delete,
        }
    }
}

/// A table descriptor exposed through the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub roles: RoleRules,
    /// Name of the connector that serves this entity.
    #[serde(default = "default_connector")]
    pub connector: String,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_keys: Vec::new(),
            relations: Vec::new(),
            roles: RoleRules::default(),
            connector: default_connector(),
        }
    }

    pub fn column_def(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_keys.push(name.into());
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn roles(mut self, roles: RoleRules) -> Self {
        self.roles = roles;
        self
    }

    pub fn served_by(mut self, connector: impl Into<String>) -> Self {
        self.connector = connector.into();
        self
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Look up a relation by its exposed field name.
    pub fn relation_named(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }
}

fn default_true() -> bool {
    true
}

fn default_connector() -> String {
    "default".to_string()
}
