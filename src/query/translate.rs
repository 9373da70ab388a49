//! Filter-to-condition lowering.
//!
//! A depth-first walk that threads the AND/OR union context downward. Column
//! predicates do not carry their own connective: they join their siblings
//! with the mode inherited from the nearest enclosing combinator, AND when no
//! ancestor combinator exists. This inheritance is what makes
//! `{"_or": [{"a": {...}, "b": {...}}]}` mean `a OR b` while the same two
//! predicates at the top level mean `a AND b`.

use crate::filter::{Filter, FilterClause};
use crate::query::{Comparison, Condition};

/// Union context inherited from the nearest enclosing combinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnionMode {
    And,
    Or,
}

/// Lower a validated filter tree into a backend-neutral condition.
///
/// Returns `None` for a filter with no effective clauses (no constraint).
/// Pure: the input is never mutated, and there is no partial output.
pub fn translate(filter: &Filter) -> Option<Condition> {
    if filter.is_empty() {
        return None;
    }
    Some(lower(filter, UnionMode::And))
}

fn lower(filter: &Filter, mode: UnionMode) -> Condition {
    let mut predicates = Vec::new();
    let mut combined = Vec::new();

    for clause in &filter.clauses {
        match clause {
            FilterClause::Predicate(p) => predicates.push(Condition::Compare(Comparison {
                column: p.column.clone(),
                operator: p.operator,
                value: p.value.clone(),
            })),
            // Empty combinators constrain nothing and are dropped, matching
            // the legacy engine's no-op behavior for `{"_or": []}`.
            FilterClause::And(children) if children.is_empty() => {}
            FilterClause::Or(children) if children.is_empty() => {}
            FilterClause::And(children) => combined.push(Condition::all(
                children.iter().map(|c| lower(c, UnionMode::And)).collect(),
            )),
            FilterClause::Or(children) => combined.push(Condition::any(
                children.iter().map(|c| lower(c, UnionMode::Or)).collect(),
            )),
        }
    }

    if combined.is_empty() {
        // Pure predicate node: siblings join with the inherited union mode.
        return match mode {
            UnionMode::And => Condition::all(predicates),
            UnionMode::Or => Condition::any(predicates),
        };
    }

    // Mixed node: direct column predicates AND with the combinator results.
    predicates.extend(combined);
    Condition::all(predicates)
}
