//! Cross-operation dependency check.
//!
//! Builds one directed graph over the change ids of both operations (edge
//! `dependency -> dependent`) and reports a cycle as Critical, or an acyclic
//! dependency that crosses operations as High.

use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;

use crate::model::{ConflictKind, Operation, Severity};

use super::{Finding, push_unique};

pub(super) fn check(a: &Operation, b: &Operation) -> Option<Finding> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for change in a.changes.iter().chain(&b.changes) {
        graph.add_node(change.id.as_str());
        for dep in &change.depends_on {
            graph.add_edge(dep.as_str(), change.id.as_str(), ());
        }
    }

    let mut crossing = Vec::new();
    for (from, to) in [(a, b), (b, a)] {
        for change in &from.changes {
            if change
                .depends_on
                .iter()
                .any(|dep| to.changes.iter().any(|c| &c.id == dep))
            {
                push_unique(&mut crossing, &change.id);
            }
        }
    }

    let cyclic = is_cyclic_directed(&graph);
    if !cyclic && crossing.is_empty() {
        return None;
    }

    let (severity, description) = if cyclic {
        (
            Severity::Critical,
            format!("dependency cycle between {} and {}", a.agent_id, b.agent_id),
        )
    } else {
        (
            Severity::High,
            format!(
                "{} change(s) depend on the other operation ({} / {})",
                crossing.len(),
                a.agent_id,
                b.agent_id
            ),
        )
    };

    Some(Finding {
        kind: ConflictKind::DependencyViolation,
        severity,
        changes: crossing,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::op;
    use crate::model::Change;

    #[test]
    fn cross_dependency_is_high() {
        let a = op("a", vec![Change::insert(0, "x").with_id("a1")]);
        let b = op("b", vec![Change::insert(50, "y").with_id("b1").depending_on("a1")]);
        let f = check(&a, &b).unwrap();
        assert_eq!(f.severity, Severity::High);
        assert_eq!(f.changes.len(), 1);
        assert_eq!(f.changes[0].as_str(), "b1");
    }

    #[test]
    fn cycle_is_critical() {
        let a = op("a", vec![Change::insert(0, "x").with_id("a1").depending_on("b1")]);
        let b = op("b", vec![Change::insert(50, "y").with_id("b1").depending_on("a1")]);
        assert_eq!(check(&a, &b).unwrap().severity, Severity::Critical);
    }

    #[test]
    fn internal_dependencies_are_fine() {
        let a = op(
            "a",
            vec![
                Change::insert(0, "x").with_id("a1"),
                Change::insert(5, "y").with_id("a2").depending_on("a1"),
            ],
        );
        let b = op("b", vec![Change::insert(50, "z").with_id("b1")]);
        assert!(check(&a, &b).is_none());
    }

    #[test]
    fn dependency_on_unknown_change_is_ignored() {
        let a = op("a", vec![Change::insert(0, "x").with_id("a1").depending_on("elsewhere")]);
        let b = op("b", vec![Change::insert(50, "z").with_id("b1")]);
        assert!(check(&a, &b).is_none());
    }
}
