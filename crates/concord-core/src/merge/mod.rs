//! Change Merging Engine.
//!
//! Turns a set of operations into one ordered change list:
//!
//! - **partition**: sort the operations and group those that may be merged
//!   ([`partition`]).
//! - **strategy**: per group, fold members pairwise with the first applicable
//!   strategy ([`strategy`]).
//! - **ordering**: concatenate every group's output, sort into application
//!   order and flag dependency violations ([`ordering`]).
//!
//! A group that fails to merge does not fail the others. Its changes come
//! back verbatim in [`MergeResult::unmerged_changes`].

pub mod ordering;
pub mod partition;
pub mod strategy;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::MergeConfig;
use crate::error::ConsolidationError;
use crate::model::{Change, Operation};

pub use strategy::{MergeSide, MergeStrategy, StrategyFailure, StrategyOutput};

// ---------------------------------------------------------------------------
// MergeResult
// ---------------------------------------------------------------------------

/// Outcome of merging a set of operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    /// Every group merged.
    pub success: bool,
    /// Changes in application order.
    pub final_changes: Vec<Change>,
    /// Non-fatal notes.
    pub warnings: Vec<String>,
    /// One entry per failed group.
    pub errors: Vec<String>,
    /// A human should confirm the result.
    pub requires_user_review: bool,
    /// Changes of failed groups, verbatim.
    pub unmerged_changes: Vec<Change>,
    /// Lowest confidence across merged groups.
    pub confidence: f64,
    /// Strategies used, one per pairwise fold.
    pub strategies: Vec<MergeStrategy>,
}

impl MergeResult {
    /// A successful result carrying `changes` untouched.
    #[must_use]
    pub const fn passthrough(changes: Vec<Change>) -> Self {
        Self {
            success: true,
            final_changes: changes,
            warnings: Vec::new(),
            errors: Vec::new(),
            requires_user_review: false,
            unmerged_changes: Vec::new(),
            confidence: 1.0,
            strategies: Vec::new(),
        }
    }

    /// Number of groups that failed.
    #[must_use]
    pub fn failed_groups(&self) -> usize {
        self.errors.len()
    }
}

// ---------------------------------------------------------------------------
// Merger seam
// ---------------------------------------------------------------------------

/// Anything that can merge a document's operations.
pub trait Merger: Send {
    /// Merge `ops` choosing strategies automatically.
    ///
    /// # Errors
    /// Implementations may fail; the manager reports the failure as
    /// [`ConsolidationError::InternalFailure`] and releases the lock.
    fn merge(&self, ops: &[Operation]) -> Result<MergeResult, ConsolidationError>;

    /// Merge `ops` with one fixed strategy, ignoring grouping.
    ///
    /// # Errors
    /// As for [`Merger::merge`].
    fn merge_with(
        &self,
        strategy: MergeStrategy,
        ops: &[Operation],
    ) -> Result<MergeResult, ConsolidationError>;
}

// ---------------------------------------------------------------------------
// MergeEngine
// ---------------------------------------------------------------------------

/// Accumulates the per-group outcomes of one merge call.
#[derive(Default)]
struct Accumulator {
    merged: Vec<Change>,
    unmerged: Vec<Change>,
    warnings: Vec<String>,
    errors: Vec<String>,
    review: bool,
    confidence: Option<f64>,
    strategies: Vec<MergeStrategy>,
}

impl Accumulator {
    fn note_confidence(&mut self, c: f64) {
        self.confidence = Some(self.confidence.map_or(c, |cur| cur.min(c)));
    }

    fn fail_group(&mut self, group: &[&Operation], failure: &StrategyFailure) {
        self.errors.push(format!(
            "group of {} operation(s) failed ({}): {}",
            group.len(),
            failure.strategy,
            failure.reason
        ));
        self.review |= failure.requires_user_review;
        self.unmerged
            .extend(group.iter().flat_map(|op| op.changes.iter().cloned()));
    }

    fn finish(mut self) -> MergeResult {
        ordering::order_changes(&mut self.merged);
        self.warnings
            .extend(ordering::dependency_warnings(&self.merged));
        MergeResult {
            success: self.errors.is_empty(),
            final_changes: self.merged,
            warnings: self.warnings,
            errors: self.errors,
            requires_user_review: self.review,
            unmerged_changes: self.unmerged,
            confidence: self.confidence.unwrap_or(1.0),
            strategies: self.strategies,
        }
    }
}

/// The standard merging engine.
#[derive(Clone, Debug, Default)]
pub struct MergeEngine {
    config: MergeConfig,
}

impl MergeEngine {
    /// Create an engine with the given thresholds.
    #[must_use]
    pub const fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Thresholds in use.
    #[must_use]
    pub const fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Merge `ops` into one ordered change list.
    ///
    /// No operations yields an empty success; one operation yields its
    /// changes unchanged.
    #[instrument(skip_all, fields(operations = ops.len()))]
    pub fn merge_operations(&self, ops: &[Operation]) -> MergeResult {
        match ops {
            [] => return MergeResult::passthrough(Vec::new()),
            [only] => return MergeResult::passthrough(only.changes.clone()),
            _ => {}
        }

        let mut sorted = ops.to_vec();
        partition::sort_for_merge(&mut sorted);
        let groups = partition::partition(&sorted, &self.config);
        tracing::debug!(groups = groups.len(), "partitioned operations");

        let mut acc = Accumulator::default();
        for group in &groups {
            self.merge_group(group, None, &mut acc);
        }
        let result = acc.finish();
        if !result.success {
            tracing::warn!(failed = result.failed_groups(), "merge left groups unmerged");
        }
        result
    }

    /// Merge `ops` as a single group with one fixed strategy.
    #[instrument(skip_all, fields(operations = ops.len(), %strategy))]
    pub fn merge_with(&self, strategy: MergeStrategy, ops: &[Operation]) -> MergeResult {
        if ops.len() < 2 {
            return self.merge_operations(ops);
        }
        let mut sorted = ops.to_vec();
        partition::sort_for_merge(&mut sorted);
        let group: Vec<&Operation> = sorted.iter().collect();
        let mut acc = Accumulator::default();
        self.merge_group(&group, Some(strategy), &mut acc);
        acc.finish()
    }

    fn merge_group(&self, group: &[&Operation], fixed: Option<MergeStrategy>, acc: &mut Accumulator) {
        let Some((first, rest)) = group.split_first() else {
            return;
        };
        if rest.is_empty() {
            acc.merged.extend(first.changes.iter().cloned());
            acc.note_confidence(1.0);
            return;
        }

        let mut folded = MergeSide::from(*first);
        let mut confidence = 1.0_f64;
        let mut warnings = Vec::new();
        let mut review = false;
        let mut used = Vec::new();

        for next in rest {
            let right = MergeSide::from(*next);
            let chosen = fixed.unwrap_or_else(|| strategy::select(&folded, &right));
            tracing::debug!(strategy = %chosen, "folding group member");
            match strategy::apply(chosen, &folded, &right, &self.config) {
                Ok(out) => {
                    confidence = confidence.min(out.confidence);
                    warnings.extend(out.warnings);
                    review |= out.requires_user_review;
                    used.push(chosen);
                    folded = MergeSide {
                        priority: folded.priority.min(right.priority),
                        changes: out.changes,
                    };
                }
                Err(failure) => {
                    tracing::warn!(strategy = %failure.strategy, reason = %failure.reason, "group merge failed");
                    acc.fail_group(group, &failure);
                    return;
                }
            }
        }

        acc.merged.extend(folded.changes);
        acc.warnings.extend(warnings);
        acc.review |= review;
        acc.strategies.extend(used);
        acc.note_confidence(confidence);
    }
}

impl Merger for MergeEngine {
    fn merge(&self, ops: &[Operation]) -> Result<MergeResult, ConsolidationError> {
        Ok(self.merge_operations(ops))
    }

    fn merge_with(
        &self,
        strategy: MergeStrategy,
        ops: &[Operation],
    ) -> Result<MergeResult, ConsolidationError> {
        Ok(Self::merge_with(self, strategy, ops))
    }
}
