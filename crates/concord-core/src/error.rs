//! Error types for consolidation.
//!
//! [`ConsolidationError`] is returned by the [`Detector`](crate::detect::Detector)
//! and [`Merger`](crate::merge::Merger) seams and carried inside every
//! [`ConsolidationResult`](crate::consolidate::ConsolidationResult) whose pass
//! failed. Variants are rich enough that callers can match on the failure mode
//! without parsing messages.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AgentId, ConflictId, DocumentPath};

/// Stage of a consolidation pass in which an unexpected failure occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Validating a submission.
    Submission,
    /// Running conflict detection.
    Detection,
    /// Applying resolution strategies.
    Resolution,
    /// Running the final merge.
    Merge,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submission => write!(f, "submission"),
            Self::Detection => write!(f, "detection"),
            Self::Resolution => write!(f, "resolution"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// Why a submission or consolidation pass did not fully succeed.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsolidationError {
    /// Another agent holds the document lock and cannot be preempted.
    /// Recoverable: retry after `estimated_wait_ms`. Submissions are queued
    /// instead of failing with this error.
    #[error("document `{document}` is locked by `{holder}` (retry in ~{estimated_wait_ms}ms)")]
    LockUnavailable {
        /// The contested document.
        document: DocumentPath,
        /// Agent currently holding the lock.
        holder: AgentId,
        /// Best estimate of how long until the lock frees up.
        estimated_wait_ms: u64,
    },

    /// At least one resolution strategy failed. The queue is left intact.
    #[error("{} conflict(s) could not be resolved", conflicts.len())]
    ConflictUnresolved {
        /// Conflicts whose resolution failed.
        conflicts: Vec<ConflictId>,
    },

    /// Some merge groups could not be merged; their changes are returned
    /// verbatim as unmerged.
    #[error("{failed_groups} merge group(s) failed")]
    MergeFailed {
        /// Number of groups that failed.
        failed_groups: usize,
    },

    /// An engine failed unexpectedly.
    #[error("internal failure during {phase}: {message}")]
    InternalFailure {
        /// Where it happened.
        phase: Phase,
        /// What went wrong.
        message: String,
    },

    /// The submission was malformed and nothing was queued.
    #[error("invalid operation: {reason}")]
    InvalidOperation {
        /// What was wrong with it.
        reason: String,
    },
}

impl ConsolidationError {
    /// Shorthand for [`ConsolidationError::InternalFailure`].
    pub fn internal(phase: Phase, message: impl Into<String>) -> Self {
        Self::InternalFailure {
            phase,
            message: message.into(),
        }
    }

    /// Whether retrying later may succeed without changing the input.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::LockUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_unavailable_message_names_holder() {
        let err = ConsolidationError::LockUnavailable {
            document: DocumentPath::new("doc.md").unwrap(),
            holder: AgentId::new("editor").unwrap(),
            estimated_wait_ms: 1500,
        };
        let msg = err.to_string();
        assert!(msg.contains("doc.md"), "{msg}");
        assert!(msg.contains("editor"), "{msg}");
        assert!(msg.contains("1500"), "{msg}");
        assert!(err.is_recoverable());
    }

    #[test]
    fn internal_failure_serializes_with_tag() {
        let err = ConsolidationError::internal(Phase::Detection, "boom");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "internal_failure");
        assert_eq!(json["phase"], "detection");
        assert!(!err.is_recoverable());
    }
}
