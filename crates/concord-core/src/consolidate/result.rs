//! What `submit` and a consolidation pass report back.

use serde::{Deserialize, Serialize};

use super::resolve::ResolutionRecord;
use crate::error::ConsolidationError;
use crate::model::{Change, Conflict, ConflictId, OperationId};

/// Outcome of a submission or of one consolidation pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationResult {
    /// The operation was taken on (applied, queued or merged).
    pub accepted: bool,
    /// The submitted operation, if this is a submission result.
    pub operation_id: Option<OperationId>,
    /// Coordination was required: apply `final_changes` (from this result or
    /// the later pass) instead of the operation's own changes.
    pub needs_consolidation: bool,
    /// Non-fatal notes.
    pub warnings: Vec<String>,
    /// Failure messages.
    pub errors: Vec<String>,
    /// Expected wait until the queued operation is processed.
    pub estimated_wait_ms: u64,
    /// A human should confirm the result.
    pub requires_user_review: bool,
    /// Changes the caller must apply, in application order.
    pub final_changes: Vec<Change>,
    /// Changes of failed merge groups, verbatim.
    pub unmerged_changes: Vec<Change>,
    /// How each detected conflict was handled.
    pub resolutions: Vec<ResolutionRecord>,
    /// Conflicts still open after the pass.
    pub active_conflicts: Vec<Conflict>,
    /// Operations rescheduled by a deferral.
    pub deferred: Vec<OperationId>,
    /// Typed failure, when the pass or submission did not fully succeed.
    pub failure: Option<ConsolidationError>,
}

impl ConsolidationResult {
    fn empty(accepted: bool, operation_id: Option<OperationId>) -> Self {
        Self {
            accepted,
            operation_id,
            needs_consolidation: false,
            warnings: Vec::new(),
            errors: Vec::new(),
            estimated_wait_ms: 0,
            requires_user_review: false,
            final_changes: Vec::new(),
            unmerged_changes: Vec::new(),
            resolutions: Vec::new(),
            active_conflicts: Vec::new(),
            deferred: Vec::new(),
            failure: None,
        }
    }

    /// Applied without coordination; the caller applies `changes` as is.
    #[must_use]
    pub fn applied(operation_id: OperationId, changes: Vec<Change>) -> Self {
        Self {
            final_changes: changes,
            ..Self::empty(true, Some(operation_id))
        }
    }

    /// Queued for a consolidation pass.
    #[must_use]
    pub fn queued(operation_id: OperationId, estimated_wait_ms: u64) -> Self {
        Self {
            needs_consolidation: true,
            estimated_wait_ms,
            ..Self::empty(true, Some(operation_id))
        }
    }

    /// Nothing was taken on.
    #[must_use]
    pub fn rejected(operation_id: Option<OperationId>, failure: ConsolidationError) -> Self {
        let mut result = Self::empty(false, operation_id);
        result.fail(failure);
        result
    }

    /// A pass over a document's queue; filled in as the pass progresses.
    #[must_use]
    pub fn pass() -> Self {
        Self::empty(true, None)
    }

    /// Record `failure` as the typed cause and as an error message.
    pub fn fail(&mut self, failure: ConsolidationError) {
        self.errors.push(failure.to_string());
        if let ConsolidationError::LockUnavailable {
            estimated_wait_ms, ..
        } = &failure
        {
            self.estimated_wait_ms = *estimated_wait_ms;
        }
        self.failure = Some(failure);
    }

    /// Whether everything succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.accepted && self.failure.is_none()
    }

    /// Ids of the open conflicts.
    #[must_use]
    pub fn active_conflict_ids(&self) -> Vec<ConflictId> {
        self.active_conflicts.iter().map(|c| c.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentId, DocumentPath};

    #[test]
    fn rejection_carries_wait_from_lock_failure() {
        let result = ConsolidationResult::rejected(
            Some(OperationId::new("op-1")),
            ConsolidationError::LockUnavailable {
                document: DocumentPath::new("doc.md").unwrap(),
                holder: AgentId::new("editor").unwrap(),
                estimated_wait_ms: 4_000,
            },
        );
        assert!(!result.accepted);
        assert!(!result.is_success());
        assert_eq!(result.estimated_wait_ms, 4_000);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn queued_result_needs_consolidation() {
        let result = ConsolidationResult::queued(OperationId::new("op-2"), 1_200);
        assert!(result.is_success());
        assert!(result.needs_consolidation);
        assert_eq!(result.estimated_wait_ms, 1_200);
    }
}
