//! Positional overlap check.
//!
//! Sums the overlap of every cross pair of changes that collide by more than
//! the tolerance, then grades the pair by how much of the combined extent is
//! contested.

use crate::model::{ConflictKind, Operation, Severity};

use super::{Finding, push_unique};

/// Severity for a given contested fraction of the combined extent.
///
/// `> 0.8` Critical, `> 0.5` High, `> 0.2` Medium, otherwise Low.
#[must_use]
pub fn severity_for_ratio(ratio: f64) -> Severity {
    if ratio > 0.8 {
        Severity::Critical
    } else if ratio > 0.5 {
        Severity::High
    } else if ratio > 0.2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

pub(super) fn check(a: &Operation, b: &Operation, tolerance: usize) -> Option<Finding> {
    let mut overlapping = 0usize;
    let mut changes = Vec::new();
    for ca in &a.changes {
        for cb in &b.changes {
            let n = ca.overlap(cb);
            if n > tolerance {
                overlapping += n;
                push_unique(&mut changes, &ca.id);
                push_unique(&mut changes, &cb.id);
            }
        }
    }
    if overlapping == 0 {
        return None;
    }

    let total = a.total_extent() + b.total_extent();
    let ratio = if total == 0 {
        1.0
    } else {
        (overlapping as f64 / total as f64).min(1.0)
    };

    Some(Finding {
        kind: ConflictKind::OverlappingEdits,
        severity: severity_for_ratio(ratio),
        changes,
        description: format!(
            "{overlapping} of {total} characters contested between {} and {} ({:.0}%)",
            a.agent_id,
            b.agent_id,
            ratio * 100.0
        ),
    })
}
