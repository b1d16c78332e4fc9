//! Conflict Detection Engine.
//!
//! Classifies conflicts between operations targeting the same document.
//! Every pair of operations submitted within the simultaneity window is run
//! through five checks in a fixed order; the first positive check is the
//! pair's conflict:
//!
//! 1. [`overlap`]: changes contest the same characters
//! 2. [`semantic`]: nearby changes pursue incompatible intentions
//! 3. [`dependency`]: changes depend across operations, or form a cycle
//! 4. [`resource`]: one side needs exclusive access
//! 5. [`priority`]: operations of different urgency touch the same text
//!
//! Pairs that declare each other in `mergeable_with` are never checked.

pub mod dependency;
pub mod overlap;
pub mod priority;
pub mod resource;
pub mod semantic;

use tracing::instrument;

use crate::config::DetectionConfig;
use crate::error::ConsolidationError;
use crate::model::{ChangeId, Conflict, ConflictId, ConflictKind, Operation, Severity};

pub use overlap::severity_for_ratio;

// ---------------------------------------------------------------------------
// Detector seam
// ---------------------------------------------------------------------------

/// Anything that can classify conflicts among a document's queued operations.
///
/// The manager owns one of these; replacing it lets callers tune detection
/// or inject failures.
pub trait Detector: Send {
    /// Return every conflict among `ops`, most severe first.
    ///
    /// # Errors
    /// Implementations may fail; the manager reports the failure as
    /// [`ConsolidationError::InternalFailure`] and releases the lock.
    fn detect(&self, ops: &[Operation], now_ms: u64) -> Result<Vec<Conflict>, ConsolidationError>;
}

/// Result of one positive check before it is stamped into a [`Conflict`].
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Finding {
    pub kind: ConflictKind,
    pub severity: Severity,
    pub changes: Vec<ChangeId>,
    pub description: String,
}

pub(crate) fn push_unique(ids: &mut Vec<ChangeId>, id: &ChangeId) {
    if !ids.contains(id) {
        ids.push(id.clone());
    }
}

// ---------------------------------------------------------------------------
// ConflictDetector
// ---------------------------------------------------------------------------

/// The standard five-check detector.
#[derive(Clone, Debug, Default)]
pub struct ConflictDetector {
    config: DetectionConfig,
}

impl ConflictDetector {
    /// Create a detector with the given thresholds.
    #[must_use]
    pub const fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Thresholds in use.
    #[must_use]
    pub const fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Every pairwise conflict among `ops`, sorted by severity descending.
    /// Pairs at equal severity keep discovery order.
    #[instrument(skip_all, fields(operations = ops.len()))]
    pub fn detect_conflicts(&self, ops: &[Operation], now_ms: u64) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for (i, a) in ops.iter().enumerate() {
            for b in &ops[i + 1..] {
                if let Some(conflict) = self.detect_pair(a, b, now_ms) {
                    conflicts.push(conflict);
                }
            }
        }
        conflicts.extend(self.detect_group(ops));
        conflicts.sort_by(|x, y| y.severity.cmp(&x.severity));
        tracing::debug!(conflicts = conflicts.len(), "detection finished");
        conflicts
    }

    /// The conflict between one pair of operations, if any.
    #[must_use]
    pub fn detect_pair(&self, a: &Operation, b: &Operation, now_ms: u64) -> Option<Conflict> {
        if a.timestamp.abs_diff(b.timestamp) > self.config.simultaneity_window_ms {
            tracing::debug!(a = %a.id, b = %b.id, "outside simultaneity window");
            return None;
        }
        if a.is_mutually_mergeable(b) {
            tracing::debug!(a = %a.id, b = %b.id, "mutually mergeable, skipped");
            return None;
        }

        let finding = overlap::check(a, b, self.config.overlap_tolerance)
            .or_else(|| semantic::check(a, b))
            .or_else(|| dependency::check(a, b))
            .or_else(|| resource::check(a, b, self.config.exclusive_replace_span))
            .or_else(|| priority::check(a, b, self.config.priority_gap_threshold))?;

        tracing::debug!(
            a = %a.id,
            b = %b.id,
            kind = %finding.kind,
            severity = %finding.severity,
            "pair conflicts"
        );

        let user_visible = finding.severity >= Severity::High
            || a.metadata.requires_user_review
            || b.metadata.requires_user_review;

        Some(Conflict {
            id: ConflictId::generate(),
            kind: finding.kind,
            severity: finding.severity,
            operations: vec![a.id.clone(), b.id.clone()],
            changes: finding.changes,
            detected_at: now_ms,
            user_visible,
            description: finding.description,
        })
    }

    /// Conflicts that only appear among three or more operations.
    ///
    /// Currently none are recognised; pairwise detection covers every known
    /// conflict kind.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn detect_group(&self, ops: &[Operation]) -> Vec<Conflict> {
        tracing::trace!(operations = ops.len(), "no group-level checks");
        Vec::new()
    }
}

impl Detector for ConflictDetector {
    fn detect(&self, ops: &[Operation], now_ms: u64) -> Result<Vec<Conflict>, ConsolidationError> {
        Ok(self.detect_conflicts(ops, now_ms))
    }
}
