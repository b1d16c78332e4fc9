//! PARTITION step of the merge pipeline.
//!
//! Operations are first sorted into processing order, then greedily placed
//! into groups in which every pair of members may be merged:
//!
//! ```text
//! sorted: [B(high), A(medium), C(medium)]
//!   B            -> group 0
//!   A  ~ B       -> group 0   (mutually mergeable, gap 1)
//!   C  !~ B      -> group 1
//! ```

use std::cmp::Reverse;

use crate::config::MergeConfig;
use crate::model::Operation;

/// Sort by priority, then timestamp, with user-initiated operations first
/// among equals. The sort is stable.
pub fn sort_for_merge(ops: &mut [Operation]) {
    ops.sort_by_key(|op| {
        (
            op.priority,
            op.timestamp,
            Reverse(op.metadata.user_initiated),
        )
    });
}

/// Whether two operations may share a merge group.
///
/// Both must list each other in `mergeable_with` and sit at most
/// `max_priority_gap` apart. If their changes overlap by more than the
/// tolerance, both must also accept an auto-merge resolution.
#[must_use]
pub fn can_merge(a: &Operation, b: &Operation, config: &MergeConfig) -> bool {
    if !a.is_mutually_mergeable(b) {
        return false;
    }
    if a.priority.gap(b.priority) > config.max_priority_gap {
        return false;
    }
    if a.max_overlap_with(b) > config.overlap_tolerance {
        return a.capabilities.supports_auto_merge() && b.capabilities.supports_auto_merge();
    }
    true
}

/// Greedily group already-sorted operations. Each operation joins the first
/// group whose every member it can merge with, or starts a new one.
#[must_use]
pub fn partition<'a>(ops: &'a [Operation], config: &MergeConfig) -> Vec<Vec<&'a Operation>> {
    let mut groups: Vec<Vec<&Operation>> = Vec::new();
    for op in ops {
        match groups
            .iter_mut()
            .find(|g| g.iter().all(|member| can_merge(member, op, config)))
        {
            Some(group) => group.push(op),
            None => groups.push(vec![op]),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentId, Change, Priority, ResolutionStrategy};
    use crate::testing::op;

    fn agent(s: &str) -> AgentId {
        AgentId::new(s).unwrap()
    }

    #[test]
    fn sort_puts_user_initiated_first_among_equals() {
        let mut a = op("a", vec![Change::insert(0, "a")]).at(10);
        let mut b = op("b", vec![Change::insert(0, "b")]).at(10);
        b.metadata.user_initiated = true;
        a.metadata.user_initiated = false;
        let c = op("c", vec![Change::insert(0, "c")]).at(5).with_priority(Priority::Low);
        let mut ops = vec![c, a, b];
        sort_for_merge(&mut ops);
        let order: Vec<_> = ops.iter().map(|o| o.agent_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn can_merge_requires_mutual_declaration() {
        let a = op("a", vec![Change::insert(0, "a")]).mergeable_with(agent("b"));
        let b = op("b", vec![Change::insert(50, "b")]);
        assert!(!can_merge(&a, &b, &MergeConfig::default()));
        let b = b.mergeable_with(agent("a"));
        assert!(can_merge(&a, &b, &MergeConfig::default()));
    }

    #[test]
    fn can_merge_rejects_wide_priority_gap() {
        let a = op("a", vec![Change::insert(0, "a")])
            .mergeable_with(agent("b"))
            .with_priority(Priority::Critical);
        let b = op("b", vec![Change::insert(50, "b")])
            .mergeable_with(agent("a"))
            .with_priority(Priority::Low);
        assert!(!can_merge(&a, &b, &MergeConfig::default()));
    }

    #[test]
    fn heavy_overlap_needs_auto_merge_support() {
        let a = op("a", vec![Change::insert(0, "abcdef")]).mergeable_with(agent("b"));
        let b = op("b", vec![Change::insert(0, "uvwxyz")])
            .mergeable_with(agent("a"))
            .supporting([ResolutionStrategy::PriorityWins]);
        assert!(!can_merge(&a, &b, &MergeConfig::default()));
        let b = b.supporting([ResolutionStrategy::SemanticMerge]);
        assert!(can_merge(&a, &b, &MergeConfig::default()));
    }

    #[test]
    fn partition_is_greedy_and_pairwise() {
        let a = op("a", vec![Change::insert(0, "a")])
            .mergeable_with(agent("b"))
            .mergeable_with(agent("c"));
        let b = op("b", vec![Change::insert(10, "b")]).mergeable_with(agent("a"));
        let c = op("c", vec![Change::insert(20, "c")]).mergeable_with(agent("a"));
        let ops = vec![a, b, c];
        let groups = partition(&ops, &MergeConfig::default());
        // c merges with a but not with b, so it starts its own group.
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1][0].agent_id.as_str(), "c");
    }
}
