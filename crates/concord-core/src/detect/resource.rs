//! Exclusive-access check.

use crate::model::{ChangeKind, ConflictKind, EXCLUSIVE_ACCESS_TAG, Operation, Priority, Severity};

use super::Finding;

/// Why an operation needs the document to itself, if it does.
pub(super) fn exclusive_reason(op: &Operation, replace_span: usize) -> Option<String> {
    if op.priority == Priority::Critical {
        return Some("critical priority".to_owned());
    }
    if op.metadata.tags.contains(EXCLUSIVE_ACCESS_TAG) {
        return Some(format!("tagged {EXCLUSIVE_ACCESS_TAG}"));
    }
    op.changes
        .iter()
        .find(|c| c.kind == ChangeKind::Replace && c.extent() > replace_span)
        .map(|c| format!("replace of {} characters", c.extent()))
}

pub(super) fn check(a: &Operation, b: &Operation, replace_span: usize) -> Option<Finding> {
    let (holder, reason) = exclusive_reason(a, replace_span)
        .map(|r| (a, r))
        .or_else(|| exclusive_reason(b, replace_span).map(|r| (b, r)))?;

    Some(Finding {
        kind: ConflictKind::ResourceContention,
        severity: Severity::High,
        changes: Vec::new(),
        description: format!("{} needs exclusive access ({reason})", holder.agent_id),
    })
}
