//! Atomic text edits and their geometry.
//!
//! A [`Change`] addresses the *pre-edit* document with half-open character
//! offsets `[from, to)`. Every engine measures changes the same way:
//!
//! - **extent**: `to - from` for a non-empty range, otherwise the length of
//!   the inserted text (a pure insertion has an empty range but still adds
//!   that many characters);
//! - **overlap**: see [`Change::overlap`];
//! - **distance**: the gap between two ranges, `0` when they touch or overlap.
//!
//! All lengths count `char`s, never bytes.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::ChangeId;

// ---------------------------------------------------------------------------
// ChangeKind
// ---------------------------------------------------------------------------

/// What a change does to its range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Add text at a point (`from == to`).
    Insert,
    /// Remove the text in `[from, to)`.
    Delete,
    /// Replace the text in `[from, to)` with new text.
    Replace,
}

impl ChangeKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 3] = [Self::Insert, Self::Delete, Self::Replace];

    /// Position of this kind when several changes start at the same offset:
    /// deletes first, then replaces, then inserts.
    #[must_use]
    pub const fn application_rank(self) -> u8 {
        match self {
            Self::Delete => 0,
            Self::Replace => 1,
            Self::Insert => 2,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Delete => write!(f, "delete"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

// ---------------------------------------------------------------------------
// Intention / Scope
// ---------------------------------------------------------------------------

/// Why an agent made a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intention {
    /// Fix spelling, grammar or factual errors.
    Correction,
    /// Improve wording without changing meaning.
    Enhancement,
    /// Adjust presentation only.
    Formatting,
    /// Add new material.
    ContentAddition,
    /// Move or reorganise existing material.
    Restructuring,
}

/// Symmetric intention compatibility, indexed by [`Intention::index`].
const COMPATIBILITY: [[f64; 5]; 5] = [
    // correction enhancement formatting content_addition restructuring
    [0.9, 0.7, 0.8, 0.6, 0.2],
    [0.7, 0.8, 0.6, 0.5, 0.25],
    [0.8, 0.6, 0.9, 0.7, 0.4],
    [0.6, 0.5, 0.7, 0.9, 0.05],
    [0.2, 0.25, 0.4, 0.05, 0.5],
];

/// Compatibility assumed when either side carries no semantic context.
pub const UNKNOWN_COMPATIBILITY: f64 = 0.5;

impl Intention {
    /// Every intention, in table order.
    pub const ALL: [Self; 5] = [
        Self::Correction,
        Self::Enhancement,
        Self::Formatting,
        Self::ContentAddition,
        Self::Restructuring,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Correction => 0,
            Self::Enhancement => 1,
            Self::Formatting => 2,
            Self::ContentAddition => 3,
            Self::Restructuring => 4,
        }
    }

    /// How well two intentions coexist on nearby text, in `[0, 1]`.
    #[must_use]
    pub const fn compatibility(self, other: Self) -> f64 {
        COMPATIBILITY[self.index()][other.index()]
    }
}

impl fmt::Display for Intention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Correction => write!(f, "correction"),
            Self::Enhancement => write!(f, "enhancement"),
            Self::Formatting => write!(f, "formatting"),
            Self::ContentAddition => write!(f, "content_addition"),
            Self::Restructuring => write!(f, "restructuring"),
        }
    }
}

/// How far a change's meaning reaches into surrounding text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// About 10 characters.
    Word,
    /// About 100 characters.
    Sentence,
    /// About 500 characters.
    Paragraph,
    /// About 2000 characters.
    Section,
    /// The whole document.
    Document,
}

impl Scope {
    /// Reach in characters; `None` means unbounded.
    #[must_use]
    pub const fn reach(self) -> Option<usize> {
        match self {
            Self::Word => Some(10),
            Self::Sentence => Some(100),
            Self::Paragraph => Some(500),
            Self::Section => Some(2000),
            Self::Document => None,
        }
    }

    /// Whether two changes `distance` characters apart fall inside this scope.
    #[must_use]
    pub fn covers(self, distance: usize) -> bool {
        self.reach().is_none_or(|reach| distance <= reach)
    }
}

/// Optional semantic annotation an agent attaches to a change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SemanticContext {
    /// Why the change was made.
    pub intention: Intention,
    /// How far its meaning reaches.
    pub scope: Scope,
    /// The agent's confidence in the change, in `[0, 1]`.
    pub confidence: f64,
    /// The change must not alter formatting.
    #[serde(default)]
    pub preserve_formatting: bool,
    /// The change must not drop content.
    #[serde(default)]
    pub preserve_content: bool,
}

impl SemanticContext {
    /// Create a context with no preservation flags.
    #[must_use]
    pub const fn new(intention: Intention, scope: Scope, confidence: f64) -> Self {
        Self {
            intention,
            scope,
            confidence,
            preserve_formatting: false,
            preserve_content: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// A single insert, delete or replace at a character range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Identifier, unique within the consolidation pass.
    #[serde(default = "ChangeId::generate")]
    pub id: ChangeId,
    /// What the change does.
    pub kind: ChangeKind,
    /// Start offset (inclusive) in the pre-edit document.
    pub from: usize,
    /// End offset (exclusive) in the pre-edit document.
    pub to: usize,
    /// Text added by the change (empty for deletes).
    #[serde(default)]
    pub inserted_text: String,
    /// Text removed by the change (empty for inserts).
    #[serde(default)]
    pub removed_text: String,
    /// Milliseconds since the Unix epoch when the change was made.
    #[serde(default)]
    pub timestamp: u64,
    /// Changes that must be applied before this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ChangeId>,
    /// Optional semantic annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_context: Option<SemanticContext>,
}

impl Change {
    fn build(kind: ChangeKind, from: usize, to: usize, inserted: String, removed: String) -> Self {
        Self {
            id: ChangeId::generate(),
            kind,
            from,
            to,
            inserted_text: inserted,
            removed_text: removed,
            timestamp: 0,
            depends_on: Vec::new(),
            semantic_context: None,
        }
    }

    /// Insert `text` at offset `at`.
    #[must_use]
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::build(ChangeKind::Insert, at, at, text.into(), String::new())
    }

    /// Delete `[from, to)`, which currently reads `removed`.
    #[must_use]
    pub fn delete(from: usize, to: usize, removed: impl Into<String>) -> Self {
        Self::build(ChangeKind::Delete, from, to, String::new(), removed.into())
    }

    /// Replace `[from, to)` (currently `removed`) with `inserted`.
    #[must_use]
    pub fn replace(
        from: usize,
        to: usize,
        removed: impl Into<String>,
        inserted: impl Into<String>,
    ) -> Self {
        Self::build(ChangeKind::Replace, from, to, inserted.into(), removed.into())
    }

    /// Set an explicit identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ChangeId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the creation timestamp.
    #[must_use]
    pub const fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Declare that `id` must be applied before this change.
    #[must_use]
    pub fn depending_on(mut self, id: impl Into<ChangeId>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    /// Attach a semantic context.
    #[must_use]
    pub const fn with_context(mut self, context: SemanticContext) -> Self {
        self.semantic_context = Some(context);
        self
    }

    /// Length of the inserted text in characters.
    #[must_use]
    pub fn inserted_len(&self) -> usize {
        self.inserted_text.chars().count()
    }

    /// Whether the change addresses a point rather than a range.
    #[must_use]
    pub const fn is_point(&self) -> bool {
        self.from == self.to
    }

    /// Characters affected by this change.
    #[must_use]
    pub fn extent(&self) -> usize {
        if self.is_point() {
            self.inserted_len()
        } else {
            self.to - self.from
        }
    }

    /// Characters by which two changes collide.
    ///
    /// - two ranges: length of the intersection;
    /// - a point insertion inside a range (`from <= p < to`): the inserted
    ///   length, since all of it lands in contested text;
    /// - two insertions at the same point: the shorter inserted length.
    #[must_use]
    pub fn overlap(&self, other: &Self) -> usize {
        match (self.is_point(), other.is_point()) {
            (false, false) => {
                let start = self.from.max(other.from);
                let end = self.to.min(other.to);
                end.saturating_sub(start)
            }
            (true, false) => point_in_range(self, other),
            (false, true) => point_in_range(other, self),
            (true, true) => {
                if self.from == other.from {
                    self.inserted_len().min(other.inserted_len())
                } else {
                    0
                }
            }
        }
    }

    /// Gap in characters between the two changes' ranges.
    #[must_use]
    pub const fn distance(&self, other: &Self) -> usize {
        if self.to <= other.from {
            other.from - self.to
        } else if other.to <= self.from {
            self.from - other.to
        } else {
            0
        }
    }

    /// Check structural consistency.
    ///
    /// # Errors
    /// Returns a description of the first inconsistency found.
    pub fn validate(&self) -> Result<(), String> {
        if self.from > self.to {
            return Err(format!(
                "change {}: start {} is after end {}",
                self.id, self.from, self.to
            ));
        }
        match self.kind {
            ChangeKind::Insert if !self.is_point() => {
                return Err(format!("change {}: insert must address a point", self.id));
            }
            ChangeKind::Delete | ChangeKind::Replace if self.is_point() => {
                return Err(format!(
                    "change {}: {} must address a non-empty range",
                    self.id, self.kind
                ));
            }
            _ => {}
        }
        if let Some(ctx) = &self.semantic_context
            && !(0.0..=1.0).contains(&ctx.confidence)
        {
            return Err(format!(
                "change {}: confidence {} outside [0, 1]",
                self.id, ctx.confidence
            ));
        }
        Ok(())
    }
}

fn point_in_range(point: &Change, range: &Change) -> usize {
    if range.from <= point.from && point.from < range.to {
        point.inserted_len()
    } else {
        0
    }
}

/// Intention compatibility of two changes, or [`UNKNOWN_COMPATIBILITY`] when
/// either lacks a semantic context.
#[must_use]
pub fn change_compatibility(a: &Change, b: &Change) -> f64 {
    match (&a.semantic_context, &b.semantic_context) {
        (Some(x), Some(y)) => x.intention.compatibility(y.intention),
        _ => UNKNOWN_COMPATIBILITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatibility_table_is_symmetric() {
        for a in Intention::ALL {
            for b in Intention::ALL {
                assert!(
                    (a.compatibility(b) - b.compatibility(a)).abs() < f64::EPSILON,
                    "{a} vs {b}"
                );
            }
        }
    }

    #[test]
    fn correction_and_restructuring_are_barely_compatible() {
        let c = Intention::Correction.compatibility(Intention::Restructuring);
        assert!((c - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn extent_of_insert_is_text_length() {
        assert_eq!(Change::insert(10, "hello").extent(), 5);
        assert_eq!(Change::insert(0, "héllo").extent(), 5);
        assert_eq!(Change::replace(8, 12, "abcd", "goodbye").extent(), 4);
    }

    #[test]
    fn range_overlap_is_intersection() {
        let a = Change::delete(0, 10, "0123456789");
        let b = Change::delete(5, 20, "x".repeat(15));
        assert_eq!(a.overlap(&b), 5);
        assert_eq!(b.overlap(&a), 5);
        let c = Change::delete(10, 12, "ab");
        assert_eq!(a.overlap(&c), 0, "half-open ranges only touch");
    }

    #[test]
    fn insert_inside_replaced_range_collides_fully() {
        let ins = Change::insert(10, "hello");
        let rep = Change::replace(8, 12, "abcd", "goodbye");
        assert_eq!(ins.overlap(&rep), 5);
        assert_eq!(rep.overlap(&ins), 5);
    }

    #[test]
    fn insert_at_range_end_does_not_collide() {
        let ins = Change::insert(12, "tail");
        let rep = Change::replace(8, 12, "abcd", "x");
        assert_eq!(ins.overlap(&rep), 0);
    }

    #[test]
    fn inserts_at_same_point_collide_by_shorter_text() {
        let a = Change::insert(4, "abc");
        let b = Change::insert(4, "abcdef");
        assert_eq!(a.overlap(&b), 3);
        assert_eq!(Change::insert(5, "abc").overlap(&b), 0);
    }

    #[test]
    fn distance_between_ranges() {
        let a = Change::delete(0, 10, "x".repeat(10));
        let b = Change::delete(40, 50, "x".repeat(10));
        assert_eq!(a.distance(&b), 30);
        assert_eq!(b.distance(&a), 30);
        assert_eq!(a.distance(&Change::delete(5, 15, "x".repeat(10))), 0);
    }

    #[test]
    fn scope_reach() {
        assert!(Scope::Sentence.covers(100));
        assert!(!Scope::Sentence.covers(101));
        assert!(Scope::Document.covers(usize::MAX));
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let mut c = Change::delete(5, 9, "abcd");
        c.to = 2;
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_ranged_insert_and_empty_delete() {
        let mut ins = Change::insert(3, "x");
        ins.to = 4;
        assert!(ins.validate().is_err());
        assert!(Change::delete(3, 3, "").validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_confidence() {
        let c = Change::insert(0, "x")
            .with_context(SemanticContext::new(Intention::Formatting, Scope::Word, 1.5));
        assert!(c.validate().is_err());
    }

    #[test]
    fn missing_context_defaults_to_half() {
        let a = Change::insert(0, "x");
        let b = Change::insert(0, "y")
            .with_context(SemanticContext::new(Intention::Correction, Scope::Word, 0.9));
        assert!((change_compatibility(&a, &b) - UNKNOWN_COMPATIBILITY).abs() < f64::EPSILON);
    }

    #[test]
    fn application_rank_orders_delete_replace_insert() {
        assert!(ChangeKind::Delete.application_rank() < ChangeKind::Replace.application_rank());
        assert!(ChangeKind::Replace.application_rank() < ChangeKind::Insert.application_rank());
    }
}
