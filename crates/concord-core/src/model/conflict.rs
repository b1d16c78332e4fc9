//! Detected incompatibilities between operations.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{ChangeId, ConflictId, OperationId};

/// Category of a conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Changes touch the same characters.
    OverlappingEdits,
    /// Nearby changes pursue incompatible intentions.
    SemanticConflict,
    /// One operation depends on changes of the other, or a cycle exists.
    DependencyViolation,
    /// One operation needs the document to itself.
    ResourceContention,
    /// Operations of different urgency touch the same text.
    PriorityConflict,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverlappingEdits => write!(f, "overlapping_edits"),
            Self::SemanticConflict => write!(f, "semantic_conflict"),
            Self::DependencyViolation => write!(f, "dependency_violation"),
            Self::ResourceContention => write!(f, "resource_contention"),
            Self::PriorityConflict => write!(f, "priority_conflict"),
        }
    }
}

/// How serious a conflict is. Ordered so that `Critical` is the greatest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational only.
    Info,
    /// Minor.
    Low,
    /// Moderate.
    Medium,
    /// Serious; surfaced to the user.
    High,
    /// Must be serialized.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A detected incompatibility between two operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Generated identifier.
    pub id: ConflictId,
    /// Category.
    pub kind: ConflictKind,
    /// Seriousness.
    pub severity: Severity,
    /// The offending operations.
    pub operations: Vec<OperationId>,
    /// The offending changes.
    pub changes: Vec<ChangeId>,
    /// Milliseconds since the Unix epoch.
    pub detected_at: u64,
    /// Should be surfaced to the user.
    pub user_visible: bool,
    /// Human-readable summary.
    pub description: String,
}

impl Conflict {
    /// Whether `op` is one of the conflicting operations.
    #[must_use]
    pub fn involves(&self, op: &OperationId) -> bool {
        self.operations.contains(op)
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.id, self.severity, self.kind, self.description
        )
    }
}
