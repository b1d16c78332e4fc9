//! Bounded per-document activity history.
//!
//! Backs the recent-activity check in `submit`. Entries older than the
//! retention period are dropped by the periodic sweep, and the oldest entry
//! is evicted once the capacity is reached.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::model::OperationId;

/// What happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// An operation was queued.
    Queued,
    /// A pass merged the queue.
    Consolidated,
    /// A pass failed and left the queue in place.
    Failed,
}

impl ActivityKind {
    /// Whether this activity makes the next submission coordinate.
    #[must_use]
    pub const fn forces_coordination(self) -> bool {
        matches!(self, Self::Queued | Self::Consolidated)
    }
}

/// One history record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Milliseconds since the Unix epoch.
    pub at: u64,
    /// What happened.
    pub kind: ActivityKind,
    /// Operations involved.
    pub operations: Vec<OperationId>,
}

/// Ring of recent activity on one document.
#[derive(Clone, Debug)]
pub struct DocumentHistory {
    entries: VecDeque<ActivityEntry>,
    capacity: usize,
}

impl DocumentHistory {
    /// Create an empty history holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry, evicting the oldest if full.
    pub fn record(&mut self, entry: ActivityEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Whether coordinating activity happened at or after `since`.
    #[must_use]
    pub fn has_activity_since(&self, since: u64) -> bool {
        self.entries
            .iter()
            .rev()
            .any(|e| e.at >= since && e.kind.forces_coordination())
    }

    /// Whether `id` was part of a successful pass still on record.
    #[must_use]
    pub fn was_consolidated(&self, id: &OperationId) -> bool {
        self.entries
            .iter()
            .any(|e| e.kind == ActivityKind::Consolidated && e.operations.contains(id))
    }

    /// Drop entries older than `cutoff`. Returns how many were dropped.
    pub fn prune_before(&mut self, cutoff: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.at >= cutoff);
        before - self.entries.len()
    }

    /// Entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(at: u64, kind: ActivityKind) -> ActivityEntry {
        ActivityEntry {
            at,
            kind,
            operations: Vec::new(),
        }
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut h = DocumentHistory::new(3);
        for t in 0..5 {
            h.record(entry(t, ActivityKind::Queued));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.iter().next().unwrap().at, 2);
    }

    #[test]
    fn consolidated_ids_are_remembered() {
        let mut h = DocumentHistory::new(8);
        let done = OperationId::new("op-done");
        let failed = OperationId::new("op-failed");
        h.record(ActivityEntry {
            at: 10,
            kind: ActivityKind::Consolidated,
            operations: vec![done.clone()],
        });
        h.record(ActivityEntry {
            at: 20,
            kind: ActivityKind::Failed,
            operations: vec![failed.clone()],
        });
        assert!(h.was_consolidated(&done));
        assert!(!h.was_consolidated(&failed));
    }

    #[test]
    fn recent_activity_ignores_failures() {
        let mut h = DocumentHistory::new(8);
        h.record(entry(1_000, ActivityKind::Consolidated));
        h.record(entry(9_000, ActivityKind::Failed));
        assert!(h.has_activity_since(500));
        assert!(!h.has_activity_since(5_000));
    }

    #[test]
    fn prune_drops_old_entries() {
        let mut h = DocumentHistory::new(8);
        h.record(entry(10, ActivityKind::Queued));
        h.record(entry(20, ActivityKind::Queued));
        assert_eq!(h.prune_before(15), 1);
        assert_eq!(h.len(), 1);
        assert!(!h.is_empty());
    }
}
