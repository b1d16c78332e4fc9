//! RESOLVE step of a consolidation pass.
//!
//! Conflicts are settled one at a time, most severe first, against a working
//! set of operations (initially the sorted queue):
//!
//! - a resolved pair collapses into one consolidated operation carrying the
//!   resolved changes;
//! - an operation discarded by `PriorityWins` or rescheduled by
//!   `DeferOperation` leaves the working set;
//! - a later conflict that names a departed operation, or whose operations
//!   already collapsed together, is recorded as subsumed.
//!
//! The first failed resolution stops the step.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{ConsolidationError, Phase};
use crate::merge::{MergeResult, MergeStrategy, Merger};
use crate::model::{
    Change, Conflict, ConflictKind, Operation, OperationId, ResolutionStrategy, Severity,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How one conflict was settled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    /// The conflict.
    pub conflict: Conflict,
    /// Strategy chosen for it.
    pub strategy: ResolutionStrategy,
    /// Whether the strategy succeeded.
    pub success: bool,
    /// What the strategy did.
    pub notes: Vec<String>,
}

/// Output of the resolve step.
#[derive(Clone, Debug, Default)]
pub struct ResolutionOutcome {
    /// Operations left to merge.
    pub working: Vec<Operation>,
    /// One record per processed conflict.
    pub records: Vec<ResolutionRecord>,
    /// Operations rescheduled for later resubmission.
    pub deferred: Vec<Operation>,
    /// Warnings for the caller.
    pub warnings: Vec<String>,
    /// The conflict whose resolution failed, followed by those not reached.
    pub unresolved: Vec<Conflict>,
    /// A human should look at the outcome.
    pub requires_user_review: bool,
}

impl ResolutionOutcome {
    /// Whether every conflict was settled.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Strategy for a conflict, by kind and severity.
#[must_use]
pub const fn select_strategy(conflict: &Conflict) -> ResolutionStrategy {
    match conflict.kind {
        ConflictKind::OverlappingEdits => match conflict.severity {
            Severity::Low => ResolutionStrategy::MergeCompatible,
            Severity::High => ResolutionStrategy::PriorityWins,
            _ => ResolutionStrategy::SequentialProcessing,
        },
        ConflictKind::SemanticConflict => ResolutionStrategy::SemanticMerge,
        ConflictKind::DependencyViolation => ResolutionStrategy::SequentialProcessing,
        ConflictKind::PriorityConflict => ResolutionStrategy::PriorityWins,
        ConflictKind::ResourceContention => ResolutionStrategy::DeferOperation,
    }
}

// ---------------------------------------------------------------------------
// Working set
// ---------------------------------------------------------------------------

enum Fate {
    Collapsed(OperationId),
    Departed,
}

struct WorkingSet {
    ops: Vec<Operation>,
    fates: HashMap<OperationId, Fate>,
}

impl WorkingSet {
    /// Follow collapses to the operation now standing for `id`, or `None`
    /// if it left the set.
    fn current(&self, id: &OperationId) -> Option<OperationId> {
        let mut id = id.clone();
        loop {
            match self.fates.get(&id) {
                None => return Some(id),
                Some(Fate::Departed) => return None,
                Some(Fate::Collapsed(next)) => id = next.clone(),
            }
        }
    }

    /// Remove and return the members named by `ids`, in processing order.
    fn take(&mut self, ids: &BTreeSet<OperationId>) -> Vec<Operation> {
        let (taken, kept): (Vec<_>, Vec<_>) =
            self.ops.drain(..).partition(|o| ids.contains(&o.id));
        self.ops = kept;
        let mut taken = taken;
        taken.sort_by_key(Operation::queue_key);
        taken
    }

    fn depart(&mut self, op: &Operation) {
        self.fates.insert(op.id.clone(), Fate::Departed);
    }

    /// Put `members` back as one consolidated operation carrying `changes`.
    fn collapse(&mut self, members: &[Operation], changes: Vec<Change>, review: bool) {
        let Some(lead) = members.first() else {
            return;
        };
        let mut merged = lead.clone();
        merged.id = OperationId::generate();
        merged.changes = changes;
        merged.timestamp = members.iter().map(|m| m.timestamp).min().unwrap_or(lead.timestamp);
        merged.priority = members.iter().map(|m| m.priority).min().unwrap_or(lead.priority);
        merged.metadata.user_initiated = members.iter().any(|m| m.metadata.user_initiated);
        merged.metadata.requires_user_review =
            review || members.iter().any(|m| m.metadata.requires_user_review);
        merged.metadata.can_be_deferred = members.iter().all(|m| m.metadata.can_be_deferred);
        merged.metadata.estimated_duration_ms = members
            .iter()
            .map(|m| m.metadata.estimated_duration_ms)
            .fold(0, u64::saturating_add);
        for m in &members[1..] {
            merged.metadata.tags.extend(m.metadata.tags.iter().cloned());
        }
        for m in members {
            self.fates
                .insert(m.id.clone(), Fate::Collapsed(merged.id.clone()));
        }
        let at = self
            .ops
            .partition_point(|o| o.queue_key() <= merged.queue_key());
        self.ops.insert(at, merged);
    }

    fn restore(&mut self, members: Vec<Operation>) {
        for m in members {
            let at = self.ops.partition_point(|o| o.queue_key() <= m.queue_key());
            self.ops.insert(at, m);
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

enum Applied {
    Done { notes: Vec<String>, review: bool },
    Failed { notes: Vec<String>, review: bool },
}

/// Settle `conflicts` against `ops`.
///
/// # Errors
/// Returns [`ConsolidationError::InternalFailure`] if the merger fails
/// outright. A strategy that runs but cannot settle its conflict is reported
/// through [`ResolutionOutcome::unresolved`] instead.
pub fn resolve_conflicts(
    ops: Vec<Operation>,
    conflicts: &[Conflict],
    merger: &dyn Merger,
) -> Result<ResolutionOutcome, ConsolidationError> {
    let mut ordered: Vec<&Conflict> = conflicts.iter().collect();
    ordered.sort_by(|a, b| b.severity.cmp(&a.severity));

    let mut set = WorkingSet {
        ops,
        fates: HashMap::new(),
    };
    let mut outcome = ResolutionOutcome::default();

    for (index, conflict) in ordered.iter().enumerate() {
        let strategy = select_strategy(conflict);
        let current: Option<BTreeSet<OperationId>> =
            conflict.operations.iter().map(|id| set.current(id)).collect();

        let members = match current {
            Some(ids) if ids.len() >= 2 => set.take(&ids),
            _ => {
                tracing::debug!(conflict = %conflict.id, "subsumed by an earlier resolution");
                outcome.records.push(ResolutionRecord {
                    conflict: (*conflict).clone(),
                    strategy,
                    success: true,
                    notes: vec!["subsumed by an earlier resolution".to_owned()],
                });
                continue;
            }
        };

        let applied = apply(strategy, members, &mut set, &mut outcome, merger)?;
        let (success, notes, review) = match applied {
            Applied::Done { notes, review } => (true, notes, review),
            Applied::Failed { notes, review } => (false, notes, review),
        };
        outcome.requires_user_review |= review;
        tracing::debug!(conflict = %conflict.id, %strategy, success, "conflict processed");
        outcome.records.push(ResolutionRecord {
            conflict: (*conflict).clone(),
            strategy,
            success,
            notes,
        });
        if !success {
            outcome
                .unresolved
                .extend(ordered[index..].iter().map(|c| (*c).clone()));
            break;
        }
    }

    outcome.working = set.ops;
    Ok(outcome)
}

fn apply(
    strategy: ResolutionStrategy,
    members: Vec<Operation>,
    set: &mut WorkingSet,
    outcome: &mut ResolutionOutcome,
    merger: &dyn Merger,
) -> Result<Applied, ConsolidationError> {
    match strategy {
        ResolutionStrategy::PriorityWins => {
            let (winner, losers) = split_winner(members);
            let mut notes = Vec::new();
            for loser in &losers {
                let msg = format!(
                    "discarded operation {} from {} ({} priority) in favour of {} ({} priority)",
                    loser.id, loser.agent_id, loser.priority, winner.agent_id, winner.priority
                );
                tracing::warn!(operation = %loser.id, "{msg}");
                outcome.warnings.push(msg.clone());
                notes.push(msg);
                set.depart(loser);
            }
            set.restore(vec![winner]);
            Ok(Applied::Done {
                notes,
                review: false,
            })
        }
        ResolutionStrategy::DeferOperation => {
            let (winner, losers) = split_winner(members);
            let mut notes = Vec::new();
            for loser in losers {
                notes.push(format!(
                    "deferred operation {} from {}",
                    loser.id, loser.agent_id
                ));
                set.depart(&loser);
                outcome.deferred.push(loser);
            }
            set.restore(vec![winner]);
            Ok(Applied::Done {
                notes,
                review: false,
            })
        }
        ResolutionStrategy::SequentialProcessing => {
            let changes: Vec<Change> = members
                .iter()
                .flat_map(|m| m.changes.iter().cloned())
                .collect();
            let notes = duplicate_insert_warnings(&changes);
            outcome.warnings.extend(notes.iter().cloned());
            set.collapse(&members, changes, false);
            Ok(Applied::Done {
                notes,
                review: false,
            })
        }
        ResolutionStrategy::MergeCompatible => {
            let result = merger
                .merge(&members)
                .map_err(|e| ConsolidationError::internal(Phase::Resolution, e.to_string()))?;
            Ok(settle(result, members, set, outcome))
        }
        ResolutionStrategy::SemanticMerge => {
            let result = merger
                .merge_with(MergeStrategy::Semantic, &members)
                .map_err(|e| ConsolidationError::internal(Phase::Resolution, e.to_string()))?;
            Ok(settle(result, members, set, outcome))
        }
    }
}

fn settle(
    result: MergeResult,
    members: Vec<Operation>,
    set: &mut WorkingSet,
    outcome: &mut ResolutionOutcome,
) -> Applied {
    if result.success {
        outcome.warnings.extend(result.warnings.iter().cloned());
        set.collapse(&members, result.final_changes, result.requires_user_review);
        Applied::Done {
            notes: result.warnings,
            review: result.requires_user_review,
        }
    } else {
        set.restore(members);
        Applied::Failed {
            notes: result.errors,
            review: true,
        }
    }
}

/// Most urgent member (ties: earliest) and the rest.
fn split_winner(mut members: Vec<Operation>) -> (Operation, Vec<Operation>) {
    members.sort_by_key(Operation::queue_key);
    let winner = members.remove(0);
    (winner, members)
}

fn duplicate_insert_warnings(changes: &[Change]) -> Vec<String> {
    let mut seen: HashMap<&str, &Change> = HashMap::new();
    let mut warnings = Vec::new();
    for c in changes {
        if c.inserted_text.is_empty() {
            continue;
        }
        if let Some(first) = seen.get(c.inserted_text.as_str()) {
            warnings.push(format!(
                "changes {} and {} insert the same text {:?}",
                first.id, c.id, c.inserted_text
            ));
        } else {
            seen.insert(&c.inserted_text, c);
        }
    }
    warnings
}
