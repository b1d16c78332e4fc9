//! The four merge strategies.
//!
//! Each strategy combines two [`MergeSide`]s. Groups larger than two are
//! folded left to right, the accumulated side taking the better priority of
//! the two it was built from.
//!
//! | Strategy         | Applicable when                         | Confidence |
//! |------------------|-----------------------------------------|------------|
//! | `NonOverlapping` | no cross pair of changes overlaps       | 0.9        |
//! | `PriorityBased`  | the sides have different priorities     | 0.8        |
//! | `Semantic`       | every change carries a semantic context | mean score |
//! | `TextBased`      | always                                  | 0.7        |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::MergeConfig;
use crate::model::{Change, ChangeKind, Operation, Priority, change_compatibility};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A named way of combining two sets of changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Concatenate changes that do not touch.
    NonOverlapping,
    /// Keep the more urgent side, plus whatever of the other side fits.
    PriorityBased,
    /// Combine compatible intentions.
    Semantic,
    /// Textual fallback for colliding insertions.
    TextBased,
}

impl MergeStrategy {
    /// Order in which strategies are tried for a group.
    pub const PREFERENCE: [Self; 4] = [
        Self::NonOverlapping,
        Self::PriorityBased,
        Self::Semantic,
        Self::TextBased,
    ];
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonOverlapping => write!(f, "non_overlapping"),
            Self::PriorityBased => write!(f, "priority_based"),
            Self::Semantic => write!(f, "semantic"),
            Self::TextBased => write!(f, "text_based"),
        }
    }
}

/// One input to a pairwise merge.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeSide {
    /// Urgency of the side (best of its members once folded).
    pub priority: Priority,
    /// Changes contributed by the side.
    pub changes: Vec<Change>,
}

impl From<&Operation> for MergeSide {
    fn from(op: &Operation) -> Self {
        Self {
            priority: op.priority,
            changes: op.changes.clone(),
        }
    }
}

/// A successful pairwise merge.
#[derive(Clone, Debug, PartialEq)]
pub struct StrategyOutput {
    /// Combined changes, unordered.
    pub changes: Vec<Change>,
    /// How much the result can be trusted, in `[0, 1]`.
    pub confidence: f64,
    /// Non-fatal notes, e.g. discarded changes.
    pub warnings: Vec<String>,
    /// A human should confirm the result.
    pub requires_user_review: bool,
}

/// A pairwise merge that could not be completed.
#[derive(Clone, Debug, PartialEq)]
pub struct StrategyFailure {
    /// Which strategy failed.
    pub strategy: MergeStrategy,
    /// Why.
    pub reason: String,
    /// A human should look at the inputs.
    pub requires_user_review: bool,
}

// ---------------------------------------------------------------------------
// Applicability / dispatch
// ---------------------------------------------------------------------------

fn any_cross_overlap(left: &MergeSide, right: &MergeSide) -> bool {
    left.changes
        .iter()
        .any(|l| right.changes.iter().any(|r| l.overlap(r) > 0))
}

/// Whether `strategy` can be used for this pair of sides.
#[must_use]
pub fn is_applicable(strategy: MergeStrategy, left: &MergeSide, right: &MergeSide) -> bool {
    match strategy {
        MergeStrategy::NonOverlapping => !any_cross_overlap(left, right),
        MergeStrategy::PriorityBased => left.priority != right.priority,
        MergeStrategy::Semantic => left
            .changes
            .iter()
            .chain(&right.changes)
            .all(|c| c.semantic_context.is_some()),
        MergeStrategy::TextBased => true,
    }
}

/// The first applicable strategy in [`MergeStrategy::PREFERENCE`] order.
#[must_use]
pub fn select(left: &MergeSide, right: &MergeSide) -> MergeStrategy {
    MergeStrategy::PREFERENCE
        .into_iter()
        .find(|s| is_applicable(*s, left, right))
        .unwrap_or(MergeStrategy::TextBased)
}

/// Merge two sides with `strategy`.
///
/// # Errors
/// Only the semantic strategy can fail, when the sides' intentions are on
/// average too incompatible.
pub fn apply(
    strategy: MergeStrategy,
    left: &MergeSide,
    right: &MergeSide,
    config: &MergeConfig,
) -> Result<StrategyOutput, StrategyFailure> {
    match strategy {
        MergeStrategy::NonOverlapping => Ok(non_overlapping(left, right)),
        MergeStrategy::PriorityBased => Ok(priority_based(left, right)),
        MergeStrategy::Semantic => semantic(left, right, config),
        MergeStrategy::TextBased => Ok(text_based(left, right, config)),
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn non_overlapping(left: &MergeSide, right: &MergeSide) -> StrategyOutput {
    StrategyOutput {
        changes: left.changes.iter().chain(&right.changes).cloned().collect(),
        confidence: 0.9,
        warnings: Vec::new(),
        requires_user_review: false,
    }
}

fn priority_based(left: &MergeSide, right: &MergeSide) -> StrategyOutput {
    let (winner, loser) = if right.priority.outranks(left.priority) {
        (right, left)
    } else {
        (left, right)
    };
    let mut kept = winner.changes.clone();
    let mut warnings = Vec::new();
    for change in &loser.changes {
        if kept.iter().all(|k| k.overlap(change) == 0) {
            kept.push(change.clone());
        } else {
            warnings.push(format!(
                "discarded change {} ({} priority) overlapping {} priority edits",
                change.id, loser.priority, winner.priority
            ));
        }
    }
    StrategyOutput {
        changes: kept,
        confidence: 0.8,
        warnings,
        requires_user_review: false,
    }
}

/// Mean intention compatibility over every cross pair of changes.
#[must_use]
pub fn mean_compatibility(left: &MergeSide, right: &MergeSide) -> f64 {
    let scores: Vec<f64> = left
        .changes
        .iter()
        .flat_map(|l| right.changes.iter().map(move |r| change_compatibility(l, r)))
        .collect();
    if scores.is_empty() {
        return 1.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

fn semantic(
    left: &MergeSide,
    right: &MergeSide,
    config: &MergeConfig,
) -> Result<StrategyOutput, StrategyFailure> {
    let mean = mean_compatibility(left, right);
    if mean < config.semantic_failure_threshold {
        return Err(StrategyFailure {
            strategy: MergeStrategy::Semantic,
            reason: format!(
                "intentions too incompatible (mean compatibility {mean:.2} < {:.2})",
                config.semantic_failure_threshold
            ),
            requires_user_review: true,
        });
    }

    let mut paired = vec![false; right.changes.len()];
    let mut changes = Vec::new();
    let mut warnings = Vec::new();
    for l in &left.changes {
        let partner = right
            .changes
            .iter()
            .enumerate()
            .filter(|(i, r)| {
                !paired[*i]
                    && l.overlap(r) > 0
                    && change_compatibility(l, r) > config.semantic_pairing_threshold
            })
            .find_map(|(i, r)| combine(l, r).map(|combined| (i, r, combined)));
        match partner {
            Some((i, r, combined)) => {
                paired[i] = true;
                warnings.push(format!(
                    "combined {} and {} into [{}, {})",
                    l.id, r.id, combined.from, combined.to
                ));
                changes.push(combined);
            }
            None => changes.push(l.clone()),
        }
    }
    changes.extend(
        right
            .changes
            .iter()
            .zip(&paired)
            .filter(|(_, used)| !**used)
            .map(|(r, _)| r.clone()),
    );

    Ok(StrategyOutput {
        changes,
        confidence: mean,
        warnings,
        requires_user_review: false,
    })
}

fn confidence_of(c: &Change) -> f64 {
    c.semantic_context.as_ref().map_or(0.0, |ctx| ctx.confidence)
}

/// Text removed by the union of two colliding ranges, stitched from both
/// sides. `None` if either side's `removed_text` does not span its range.
fn union_removed(a: &Change, b: &Change) -> Option<String> {
    let spans = |c: &Change| c.removed_text.chars().count() == c.to - c.from;
    if !spans(a) || !spans(b) {
        return None;
    }
    let (first, second) = if a.from <= b.from { (a, b) } else { (b, a) };
    let mut text = first.removed_text.clone();
    if second.to > first.to {
        let skip = first.to.saturating_sub(second.from);
        text.extend(second.removed_text.chars().skip(skip));
    }
    Some(text)
}

/// Union two colliding changes, keeping the text of the more confident one.
fn combine(a: &Change, b: &Change) -> Option<Change> {
    let winner = if confidence_of(b) > confidence_of(a) { b } else { a };
    let mut merged = winner.clone();
    merged.removed_text = union_removed(a, b)?;
    merged.from = a.from.min(b.from);
    merged.to = a.to.max(b.to);
    merged.kind = if merged.from == merged.to {
        ChangeKind::Insert
    } else if merged.inserted_text.is_empty() {
        ChangeKind::Delete
    } else {
        ChangeKind::Replace
    };
    for dep in a.depends_on.iter().chain(&b.depends_on) {
        if !merged.depends_on.contains(dep) && *dep != a.id && *dep != b.id {
            merged.depends_on.push(dep.clone());
        }
    }
    Some(merged)
}

fn has_sentence_punctuation(s: &str) -> bool {
    s.contains(['.', '!', '?'])
}

fn text_based(left: &MergeSide, right: &MergeSide, config: &MergeConfig) -> StrategyOutput {
    let mut changes = left.changes.clone();
    let mut warnings = Vec::new();

    for r in &right.changes {
        let slot = changes.iter().position(|l| {
            l.kind == ChangeKind::Insert && r.kind == ChangeKind::Insert && l.overlap(r) > 0
        });
        let Some(i) = slot else {
            if let Some(l) = changes.iter().find(|l| l.overlap(r) > 0) {
                warnings.push(format!("{} and {} overlap and were kept as-is", l.id, r.id));
            }
            changes.push(r.clone());
            continue;
        };

        let l = &changes[i];
        if l.inserted_text.contains(&r.inserted_text) {
            warnings.push(format!("{} is contained in {}, dropped", r.id, l.id));
        } else if r.inserted_text.contains(&l.inserted_text) {
            warnings.push(format!("{} is contained in {}, dropped", l.id, r.id));
            changes[i] = r.clone();
        } else if l.inserted_len() < config.text_concat_max_len
            && r.inserted_len() < config.text_concat_max_len
            && !has_sentence_punctuation(&l.inserted_text)
            && !has_sentence_punctuation(&r.inserted_text)
        {
            warnings.push(format!("joined insertions {} and {}", l.id, r.id));
            let joined = format!("{} {}", l.inserted_text, r.inserted_text);
            changes[i].inserted_text = joined;
        } else {
            warnings.push(format!("{} and {} overlap and were kept as-is", l.id, r.id));
            changes.push(r.clone());
        }
    }

    StrategyOutput {
        changes,
        confidence: 0.7,
        warnings,
        requires_user_review: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Intention, Scope, SemanticContext};

    fn side(priority: Priority, changes: Vec<Change>) -> MergeSide {
        MergeSide { priority, changes }
    }

    fn ctx(intention: Intention, confidence: f64) -> SemanticContext {
        SemanticContext::new(intention, Scope::Sentence, confidence)
    }

    #[test]
    fn selection_follows_preference_order() {
        let a = side(Priority::Medium, vec![Change::insert(0, "a")]);
        let b = side(Priority::Medium, vec![Change::insert(50, "b")]);
        assert_eq!(select(&a, &b), MergeStrategy::NonOverlapping);

        let c = side(Priority::High, vec![Change::insert(0, "c")]);
        assert_eq!(select(&a, &c), MergeStrategy::PriorityBased);

        let d = side(Priority::Medium, vec![Change::insert(0, "d")]);
        assert_eq!(select(&a, &d), MergeStrategy::TextBased);

        let e = side(Priority::Medium, vec![Change::insert(0, "e").with_context(ctx(Intention::Correction, 0.5))]);
        let f = side(Priority::Medium, vec![Change::insert(0, "f").with_context(ctx(Intention::Formatting, 0.5))]);
        assert_eq!(select(&e, &f), MergeStrategy::Semantic);
    }

    #[test]
    fn priority_based_keeps_winner_and_non_overlapping_rest() {
        let hi = side(Priority::High, vec![Change::replace(8, 12, "abcd", "goodbye")]);
        let lo = side(
            Priority::Medium,
            vec![Change::insert(10, "hello"), Change::insert(40, "later")],
        );
        let out = apply(MergeStrategy::PriorityBased, &lo, &hi, &MergeConfig::default()).unwrap();
        assert_eq!(out.changes.len(), 2);
        assert_eq!(out.changes[0].inserted_text, "goodbye");
        assert_eq!(out.changes[1].inserted_text, "later");
        assert_eq!(out.warnings.len(), 1);
        assert!((out.confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn semantic_fails_below_threshold() {
        let a = side(Priority::Medium, vec![Change::insert(0, "x").with_context(ctx(Intention::Correction, 0.9))]);
        let b = side(Priority::Medium, vec![Change::insert(30, "y").with_context(ctx(Intention::Restructuring, 0.9))]);
        let err = apply(MergeStrategy::Semantic, &a, &b, &MergeConfig::default()).unwrap_err();
        assert!(err.requires_user_review);
        assert!(err.reason.contains("0.20"), "{}", err.reason);
    }

    #[test]
    fn semantic_pairs_compatible_changes_keeping_confident_text() {
        let a = side(
            Priority::Medium,
            vec![Change::replace(0, 5, "teh c", "the c").with_context(ctx(Intention::Correction, 0.6))],
        );
        let b = side(
            Priority::Medium,
            vec![Change::replace(3, 9, " cat s", " kitten s").with_context(ctx(Intention::Correction, 0.95))],
        );
        let out = apply(MergeStrategy::Semantic, &a, &b, &MergeConfig::default()).unwrap();
        assert_eq!(out.changes.len(), 1);
        let c = &out.changes[0];
        assert_eq!((c.from, c.to), (0, 9));
        assert_eq!(c.inserted_text, " kitten s");
        assert_eq!(c.removed_text, "teh cat s");
        assert!((out.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn semantic_keeps_distant_insertions_apart() {
        let x = Change::insert(10, "X").with_context(ctx(Intention::Correction, 0.9));
        let y = Change::insert(60, "Y").with_context(ctx(Intention::Correction, 0.8));
        let a = side(Priority::Medium, vec![x.clone()]);
        let b = side(Priority::Medium, vec![y.clone()]);
        let out = apply(MergeStrategy::Semantic, &a, &b, &MergeConfig::default()).unwrap();
        assert_eq!(out.changes, vec![x, y]);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn semantic_refuses_to_combine_inconsistent_removed_text() {
        let a = side(
            Priority::Medium,
            vec![Change::replace(0, 5, "te", "the").with_context(ctx(Intention::Correction, 0.6))],
        );
        let b = side(
            Priority::Medium,
            vec![Change::replace(3, 9, " cat s", " kitten s").with_context(ctx(Intention::Correction, 0.9))],
        );
        let out = apply(MergeStrategy::Semantic, &a, &b, &MergeConfig::default()).unwrap();
        assert_eq!(out.changes.len(), 2);
        assert_eq!(out.changes[0].removed_text, "te");
    }

    #[test]
    fn semantic_combines_point_inside_range_as_replace() {
        let point = Change::insert(4, "very ").with_context(ctx(Intention::Enhancement, 0.9));
        let range = Change::replace(2, 8, "a big ", "a large ")
            .with_context(ctx(Intention::Enhancement, 0.7));
        let a = side(Priority::Medium, vec![range]);
        let b = side(Priority::Medium, vec![point]);
        let out = apply(MergeStrategy::Semantic, &a, &b, &MergeConfig::default()).unwrap();
        assert_eq!(out.changes.len(), 1);
        let c = &out.changes[0];
        assert_eq!((c.from, c.to, c.kind), (2, 8, ChangeKind::Replace));
        assert_eq!(c.removed_text, "a big ");
        assert_eq!(c.inserted_text, "very ");
    }

    #[test]
    fn semantic_leaves_weak_pairs_unpaired() {
        let a = side(Priority::Medium, vec![Change::insert(0, "x").with_context(ctx(Intention::Enhancement, 0.9))]);
        let b = side(Priority::Medium, vec![Change::insert(5, "y").with_context(ctx(Intention::ContentAddition, 0.9))]);
        // 0.5 mean: passes, but below the pairing threshold.
        let out = apply(MergeStrategy::Semantic, &a, &b, &MergeConfig::default()).unwrap();
        assert_eq!(out.changes.len(), 2);
    }

    #[test]
    fn text_based_superstring_wins() {
        let a = side(Priority::Medium, vec![Change::insert(4, "hello")]);
        let b = side(Priority::Medium, vec![Change::insert(4, "hello world")]);
        let out = apply(MergeStrategy::TextBased, &a, &b, &MergeConfig::default()).unwrap();
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].inserted_text, "hello world");
        assert!(out.requires_user_review);
    }

    #[test]
    fn text_based_joins_short_fragments() {
        let a = side(Priority::Medium, vec![Change::insert(4, "quick")]);
        let b = side(Priority::Medium, vec![Change::insert(4, "brown")]);
        let out = apply(MergeStrategy::TextBased, &a, &b, &MergeConfig::default()).unwrap();
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].inserted_text, "quick brown");
    }

    #[test]
    fn text_based_keeps_sentences_apart() {
        let a = side(Priority::Medium, vec![Change::insert(4, "It rained.")]);
        let b = side(Priority::Medium, vec![Change::insert(4, "It snowed!")]);
        let out = apply(MergeStrategy::TextBased, &a, &b, &MergeConfig::default()).unwrap();
        assert_eq!(out.changes.len(), 2);
        assert!((out.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn text_based_passes_range_overlaps_through() {
        let a = side(Priority::Medium, vec![Change::delete(0, 10, "x".repeat(10))]);
        let b = side(Priority::Medium, vec![Change::delete(5, 15, "x".repeat(10))]);
        let out = apply(MergeStrategy::TextBased, &a, &b, &MergeConfig::default()).unwrap();
        assert_eq!(out.changes.len(), 2);
        assert_eq!(out.warnings.len(), 1);
    }
}
