//! Final ordering of merged changes.
//!
//! Changes address the pre-edit document, so they are applied from the end
//! backwards: descending start offset, and at equal offsets deletes before
//! replaces before inserts. Offsets of earlier (lower) changes stay valid
//! while later ones are applied.

use std::cmp::Reverse;
use std::collections::HashMap;

use crate::model::{Change, ChangeId};

/// Sort into application order. Stable for changes at the same offset and
/// of the same kind.
pub fn order_changes(changes: &mut [Change]) {
    changes.sort_by_key(|c| (Reverse(c.from), c.kind.application_rank()));
}

/// One warning per change that is ordered before a change it depends on.
#[must_use]
pub fn dependency_warnings(ordered: &[Change]) -> Vec<String> {
    let position: HashMap<&ChangeId, usize> = ordered
        .iter()
        .enumerate()
        .map(|(i, c)| (&c.id, i))
        .collect();
    let mut warnings = Vec::new();
    for (i, change) in ordered.iter().enumerate() {
        for dep in &change.depends_on {
            if position.get(dep).is_some_and(|&j| j > i) {
                warnings.push(format!(
                    "change {} is applied before its dependency {dep}",
                    change.id
                ));
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_descending_offset_then_kind() {
        let mut changes = vec![
            Change::insert(5, "i").with_id("ins"),
            Change::insert(20, "x").with_id("late"),
            Change::replace(5, 7, "ab", "r").with_id("rep"),
            Change::delete(5, 6, "a").with_id("del"),
        ];
        order_changes(&mut changes);
        let ids: Vec<_> = changes.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["late", "del", "rep", "ins"]);
    }

    #[test]
    fn warns_when_dependency_comes_later() {
        let mut changes = vec![
            Change::insert(0, "base").with_id("c1"),
            Change::insert(10, "uses base").with_id("c2").depending_on("c1"),
        ];
        order_changes(&mut changes);
        let warnings = dependency_warnings(&changes);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("c2"));
    }

    #[test]
    fn satisfied_and_external_dependencies_are_quiet() {
        let changes = vec![
            Change::insert(10, "a").with_id("c1"),
            Change::insert(0, "b").with_id("c2").depending_on("c1"),
            Change::insert(0, "c").with_id("c3").depending_on("elsewhere"),
        ];
        assert!(dependency_warnings(&changes).is_empty());
    }
}
