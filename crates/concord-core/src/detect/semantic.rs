//! Intention compatibility check.
//!
//! Only change pairs that both carry a [`SemanticContext`](crate::model::SemanticContext)
//! and sit within the wider of their two scopes are compared.

use crate::model::{Change, ConflictKind, Intention, Operation, Severity};

use super::{Finding, push_unique};

/// Compatibility below this is a conflict.
const CONFLICT_BELOW: f64 = 0.3;
/// Compatibility below this is a High conflict.
const HIGH_BELOW: f64 = 0.1;

pub(super) fn check(a: &Operation, b: &Operation) -> Option<Finding> {
    let mut lowest: Option<(f64, &Change, &Change, Intention, Intention)> = None;

    for ca in &a.changes {
        let Some(xa) = &ca.semantic_context else {
            continue;
        };
        for cb in &b.changes {
            let Some(xb) = &cb.semantic_context else {
                continue;
            };
            if !xa.scope.max(xb.scope).covers(ca.distance(cb)) {
                continue;
            }
            let score = xa.intention.compatibility(xb.intention);
            if lowest.is_none_or(|(best, ..)| score < best) {
                lowest = Some((score, ca, cb, xa.intention, xb.intention));
            }
        }
    }

    let (score, ca, cb, ia, ib) = lowest?;
    if score >= CONFLICT_BELOW {
        return None;
    }

    let mut changes = Vec::new();
    push_unique(&mut changes, &ca.id);
    push_unique(&mut changes, &cb.id);

    Some(Finding {
        kind: ConflictKind::SemanticConflict,
        severity: if score < HIGH_BELOW {
            Severity::High
        } else {
            Severity::Medium
        },
        changes,
        description: format!(
            "{} ({ia}) and {} ({ib}) have compatibility {score:.2}",
            a.agent_id, b.agent_id,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::op;
    use crate::model::{Scope, SemanticContext};

    fn annotated(at: usize, intention: Intention, scope: Scope) -> Change {
        Change::insert(at, "text").with_context(SemanticContext::new(intention, scope, 0.9))
    }

    #[test]
    fn correction_vs_restructuring_in_sentence_is_medium() {
        let a = op("a", vec![annotated(10, Intention::Correction, Scope::Sentence)]);
        let b = op("b", vec![annotated(60, Intention::Restructuring, Scope::Sentence)]);
        let f = check(&a, &b).unwrap();
        assert_eq!(f.kind, ConflictKind::SemanticConflict);
        assert_eq!(f.severity, Severity::Medium);
        assert!(f.description.contains("0.20"), "{}", f.description);
    }

    #[test]
    fn content_addition_vs_restructuring_is_high() {
        let a = op("a", vec![annotated(10, Intention::ContentAddition, Scope::Paragraph)]);
        let b = op("b", vec![annotated(300, Intention::Restructuring, Scope::Word)]);
        assert_eq!(check(&a, &b).unwrap().severity, Severity::High);
    }

    #[test]
    fn out_of_scope_pairs_are_ignored() {
        let a = op("a", vec![annotated(0, Intention::Correction, Scope::Word)]);
        let b = op("b", vec![annotated(50, Intention::Restructuring, Scope::Word)]);
        assert!(check(&a, &b).is_none());
    }

    #[test]
    fn compatible_intentions_do_not_conflict() {
        let a = op("a", vec![annotated(0, Intention::Correction, Scope::Sentence)]);
        let b = op("b", vec![annotated(20, Intention::Formatting, Scope::Sentence)]);
        assert!(check(&a, &b).is_none());
    }

    #[test]
    fn missing_context_is_skipped() {
        let a = op("a", vec![Change::insert(0, "x")]);
        let b = op("b", vec![annotated(2, Intention::Restructuring, Scope::Document)]);
        assert!(check(&a, &b).is_none());
    }
}
