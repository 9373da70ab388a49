//! Field projection.
//!
//! Maps a requested output shape onto the minimal set of physical columns to
//! fetch. Primary keys are always included (row identity is needed for
//! relation resolution and write refetches), and a requested n:1 relation
//! field pulls in the owning-side key column so the nested resolution has a
//! value to scope by. Unknown names are assumed to be virtual fields resolved
//! elsewhere and are dropped without error.

use crate::schema::{Entity, RelationKind};

/// Compute the physical column list for a requested field shape.
///
/// The result is duplicate-free and order-stable: primary keys first, then
/// columns in first-occurrence order of the request.
pub fn project(entity: &Entity, requested: &[String]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::with_capacity(entity.primary_keys.len() + requested.len());
    for pk in &entity.primary_keys {
        push_unique(&mut fields, pk);
    }

    for name in requested {
        if entity.has_column(name) {
            push_unique(&mut fields, name);
        }
        let to_one = entity
            .relations
            .iter()
            .find(|r| r.name == *name && r.kind == RelationKind::ManyToOne);
        if let Some(relation) = to_one {
            push_unique(&mut fields, &relation.local_key);
        }
    }

    fields
}

fn push_unique(fields: &mut Vec<String>, name: &str) {
    if !fields.iter().any(|f| f == name) {
        fields.push(name.to_string());
    }
}
