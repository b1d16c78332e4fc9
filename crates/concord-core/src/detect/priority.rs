//! Priority gap check: operations of different urgency touching the same text.

use crate::model::{ConflictKind, Operation, Severity};

use super::{Finding, push_unique};

pub(super) fn check(a: &Operation, b: &Operation, gap_threshold: u8) -> Option<Finding> {
    let gap = a.priority.gap(b.priority);
    if gap == 0 || gap < gap_threshold {
        return None;
    }

    let mut changes = Vec::new();
    for ca in &a.changes {
        for cb in &b.changes {
            if ca.overlap(cb) > 0 {
                push_unique(&mut changes, &ca.id);
                push_unique(&mut changes, &cb.id);
            }
        }
    }
    if changes.is_empty() {
        return None;
    }

    Some(Finding {
        kind: ConflictKind::PriorityConflict,
        severity: if gap >= 2 {
            Severity::High
        } else {
            Severity::Medium
        },
        changes,
        description: format!(
            "{} ({}) and {} ({}) touch the same text",
            a.agent_id, a.priority, b.agent_id, b.priority
        ),
    })
}
