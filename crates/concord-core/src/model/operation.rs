//! Agent submissions: [`Operation`], [`Priority`] and the resolution
//! strategies an operation is willing to accept.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::change::{Change, ChangeKind};
use super::types::{AgentId, DocumentPath, OperationId};

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Ordinal urgency of an operation. Lower numeric value means higher
/// priority, so the derived `Ord` sorts the most urgent operation first.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Priority {
    /// Must not be interrupted (value 1).
    Critical = 1,
    /// Value 2.
    High = 2,
    /// Value 3.
    #[default]
    Medium = 3,
    /// Value 4.
    Low = 4,
    /// Value 5.
    Background = 5,
}

impl Priority {
    /// Numeric value, 1 (Critical) through 5 (Background).
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Absolute difference between two priority values.
    #[must_use]
    pub const fn gap(self, other: Self) -> u8 {
        self.value().abs_diff(other.value())
    }

    /// Whether `self` is strictly more urgent than `other`.
    #[must_use]
    pub const fn outranks(self, other: Self) -> bool {
        self.value() < other.value()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
            Self::Background => write!(f, "background"),
        }
    }
}

// ---------------------------------------------------------------------------
// ResolutionStrategy
// ---------------------------------------------------------------------------

/// How a single conflict is settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Hand the operations to the merging engine.
    MergeCompatible,
    /// Keep the most urgent operation, discard the rest.
    PriorityWins,
    /// Apply every operation's changes one after another.
    SequentialProcessing,
    /// Keep the most urgent operation, resubmit the rest later.
    DeferOperation,
    /// Merge by intention compatibility.
    SemanticMerge,
}

impl ResolutionStrategy {
    /// Every strategy, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::MergeCompatible,
        Self::PriorityWins,
        Self::SequentialProcessing,
        Self::DeferOperation,
        Self::SemanticMerge,
    ];

    /// Strategies that combine text automatically rather than choosing a
    /// winner.
    #[must_use]
    pub const fn is_auto_merge(self) -> bool {
        matches!(self, Self::MergeCompatible | Self::SemanticMerge)
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MergeCompatible => write!(f, "merge_compatible"),
            Self::PriorityWins => write!(f, "priority_wins"),
            Self::SequentialProcessing => write!(f, "sequential_processing"),
            Self::DeferOperation => write!(f, "defer_operation"),
            Self::SemanticMerge => write!(f, "semantic_merge"),
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities / metadata
// ---------------------------------------------------------------------------

/// What an operation's agent is prepared to accept from the consolidator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Agents whose operations may be merged with this one.
    #[serde(default)]
    pub mergeable_with: BTreeSet<AgentId>,
    /// Resolution strategies this agent accepts.
    #[serde(default = "all_strategies")]
    pub supported_resolutions: BTreeSet<ResolutionStrategy>,
    /// Change kinds this agent produces.
    #[serde(default = "all_change_kinds")]
    pub supported_change_kinds: BTreeSet<ChangeKind>,
}

fn all_strategies() -> BTreeSet<ResolutionStrategy> {
    ResolutionStrategy::ALL.into_iter().collect()
}

fn all_change_kinds() -> BTreeSet<ChangeKind> {
    ChangeKind::ALL.into_iter().collect()
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            mergeable_with: BTreeSet::new(),
            supported_resolutions: all_strategies(),
            supported_change_kinds: all_change_kinds(),
        }
    }
}

impl Capabilities {
    /// Whether any auto-merge strategy is accepted.
    #[must_use]
    pub fn supports_auto_merge(&self) -> bool {
        self.supported_resolutions
            .iter()
            .any(|s| s.is_auto_merge())
    }
}

/// Tag marking an operation that needs the document to itself.
pub const EXCLUSIVE_ACCESS_TAG: &str = "exclusive_access";

/// Scheduling hints attached to an operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// A human explicitly triggered the operation.
    #[serde(default)]
    pub user_initiated: bool,
    /// Expected time to apply, in milliseconds.
    #[serde(default)]
    pub estimated_duration_ms: u64,
    /// A human must confirm the outcome.
    #[serde(default)]
    pub requires_user_review: bool,
    /// The operation tolerates being rescheduled.
    #[serde(default)]
    pub can_be_deferred: bool,
    /// Free-form labels.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// One agent's submission of changes against one document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Generated identifier.
    #[serde(default = "OperationId::generate")]
    pub id: OperationId,
    /// Submitting agent.
    pub agent_id: AgentId,
    /// Version string of the submitting agent.
    #[serde(default)]
    pub agent_version: String,
    /// Target document.
    pub document_path: DocumentPath,
    /// Changes in submission order.
    pub changes: Vec<Change>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
    /// Urgency.
    #[serde(default)]
    pub priority: Priority,
    /// What the agent will accept.
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Scheduling hints.
    #[serde(default)]
    pub metadata: OperationMetadata,
}

impl Operation {
    /// Create an operation with default capabilities and metadata.
    #[must_use]
    pub fn new(agent_id: AgentId, document_path: DocumentPath, changes: Vec<Change>) -> Self {
        Self {
            id: OperationId::generate(),
            agent_id,
            agent_version: String::new(),
            document_path,
            changes,
            timestamp: 0,
            priority: Priority::default(),
            capabilities: Capabilities::default(),
            metadata: OperationMetadata::default(),
        }
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the submission timestamp.
    #[must_use]
    pub const fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set an explicit identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<OperationId>) -> Self {
        self.id = id.into();
        self
    }

    /// Declare that this operation may be merged with `agent`'s operations.
    #[must_use]
    pub fn mergeable_with(mut self, agent: AgentId) -> Self {
        self.capabilities.mergeable_with.insert(agent);
        self
    }

    /// Restrict the accepted resolution strategies.
    #[must_use]
    pub fn supporting(mut self, strategies: impl IntoIterator<Item = ResolutionStrategy>) -> Self {
        self.capabilities.supported_resolutions = strategies.into_iter().collect();
        self
    }

    /// Replace the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: OperationMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.insert(tag.into());
        self
    }

    /// Both operations list each other's agent in `mergeable_with`.
    #[must_use]
    pub fn is_mutually_mergeable(&self, other: &Self) -> bool {
        self.capabilities.mergeable_with.contains(&other.agent_id)
            && other.capabilities.mergeable_with.contains(&self.agent_id)
    }

    /// Sum of the extents of all changes.
    #[must_use]
    pub fn total_extent(&self) -> usize {
        self.changes.iter().map(Change::extent).sum()
    }

    /// Total positional overlap between every cross pair of changes.
    #[must_use]
    pub fn overlap_with(&self, other: &Self) -> usize {
        self.changes
            .iter()
            .flat_map(|a| other.changes.iter().map(move |b| a.overlap(b)))
            .sum()
    }

    /// Largest single positional overlap between the two operations' changes.
    #[must_use]
    pub fn max_overlap_with(&self, other: &Self) -> usize {
        self.changes
            .iter()
            .flat_map(|a| other.changes.iter().map(move |b| a.overlap(b)))
            .max()
            .unwrap_or(0)
    }

    /// Processing order within a queue: priority, then timestamp.
    #[must_use]
    pub const fn queue_key(&self) -> (Priority, u64) {
        (self.priority, self.timestamp)
    }

    /// Check that the operation can be consolidated.
    ///
    /// # Errors
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.changes.is_empty() {
            return Err(format!("operation {} has no changes", self.id));
        }
        for change in &self.changes {
            change.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(agent: &str, changes: Vec<Change>) -> Operation {
        Operation::new(
            AgentId::new(agent).unwrap(),
            DocumentPath::new("doc.md").unwrap(),
            changes,
        )
    }

    #[test]
    fn priority_orders_most_urgent_first() {
        let mut ps = vec![Priority::Low, Priority::Critical, Priority::Medium];
        ps.sort();
        assert_eq!(ps, vec![Priority::Critical, Priority::Medium, Priority::Low]);
        assert!(Priority::High.outranks(Priority::Medium));
        assert_eq!(Priority::Critical.gap(Priority::Background), 4);
    }

    #[test]
    fn mutual_mergeability_requires_both_sides() {
        let a = op("a", vec![Change::insert(0, "x")]).mergeable_with(AgentId::new("b").unwrap());
        let b = op("b", vec![Change::insert(5, "y")]);
        assert!(!a.is_mutually_mergeable(&b));
        let b = b.mergeable_with(AgentId::new("a").unwrap());
        assert!(a.is_mutually_mergeable(&b));
        assert!(b.is_mutually_mergeable(&a));
    }

    #[test]
    fn validate_rejects_empty_operation() {
        assert!(op("a", vec![]).validate().is_err());
        assert!(op("a", vec![Change::insert(0, "x")]).validate().is_ok());
    }

    #[test]
    fn deserialize_fills_defaults() {
        let json = r#"{
            "agent_id": "typist",
            "document_path": "doc.md",
            "changes": [{"id": "c1", "kind": "insert", "from": 10, "to": 10, "inserted_text": "hello"}]
        }"#;
        let op: Operation = serde_json::from_str(json).unwrap();
        assert_eq!(op.priority, Priority::Medium);
        assert!(op.id.as_str().starts_with("op-"));
        assert!(op.capabilities.supports_auto_merge());
        assert_eq!(op.changes[0].extent(), 5);
    }

    #[test]
    fn deserialize_rejects_blank_agent() {
        let json = r#"{"agent_id": "", "document_path": "doc.md", "changes": []}"#;
        assert!(serde_json::from_str::<Operation>(json).is_err());
    }

    #[test]
    fn overlap_sums_cross_pairs() {
        let a = op("a", vec![Change::insert(10, "hello")]);
        let b = op("b", vec![Change::replace(8, 12, "abcd", "goodbye")]);
        assert_eq!(a.overlap_with(&b), 5);
        assert_eq!(a.total_extent() + b.total_extent(), 9);
    }
}
