//! Per-document advisory locks.
//!
//! At most one lock per document is stored; an expired lock is treated as
//! absent. Acquisition never blocks: it succeeds, refreshes, preempts or is
//! rejected on the spot.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::events::UnlockReason;
use crate::model::{AgentId, DocumentPath, LockId, Operation, OperationId, Priority};

/// An exclusive, TTL-bound claim on a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLock {
    /// Identifier.
    pub lock_id: LockId,
    /// Locked document.
    pub document_path: DocumentPath,
    /// Operation the lock was taken for.
    pub operation_id: OperationId,
    /// Holder.
    pub agent_id: AgentId,
    /// Holder's priority.
    pub priority: Priority,
    /// Milliseconds since the Unix epoch.
    pub acquired_at: u64,
    /// TTL end, milliseconds since the Unix epoch.
    pub expires_at: u64,
    /// False for Critical holders.
    pub can_be_preempted: bool,
}

impl DocumentLock {
    /// Whether the lock is still in force at `now`.
    #[must_use]
    pub const fn is_live(&self, now: u64) -> bool {
        self.expires_at > now
    }

    /// Milliseconds until expiry.
    #[must_use]
    pub const fn remaining_ms(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }
}

/// What happened on an acquisition attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockOutcome {
    /// A new lock was taken. `displaced` is the lock it replaced, if any
    /// (an expired or preempted one).
    Acquired {
        /// The new lock.
        lock: DocumentLock,
        /// The lock it replaced, and why.
        displaced: Option<(DocumentLock, UnlockReason)>,
    },
    /// The requester already held the lock; its TTL was extended.
    Refreshed(DocumentLock),
    /// Another agent holds a lock that cannot be taken over.
    Rejected(DocumentLock),
}

/// All locks, keyed by document.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: HashMap<DocumentPath, DocumentLock>,
}

impl LockTable {
    /// The live lock on `document`, if any.
    #[must_use]
    pub fn live(&self, document: &DocumentPath, now: u64) -> Option<&DocumentLock> {
        self.locks.get(document).filter(|l| l.is_live(now))
    }

    /// Try to lock `op`'s document for `op`.
    ///
    /// A live lock held by another agent is taken over only if it is
    /// preemptible and `op` strictly outranks its holder.
    pub fn try_acquire(&mut self, op: &Operation, now: u64, safety_margin_ms: u64) -> LockOutcome {
        let expires_at = now
            .saturating_add(op.metadata.estimated_duration_ms)
            .saturating_add(safety_margin_ms);
        let document = &op.document_path;

        let displaced = match self.locks.get_mut(document) {
            Some(current) if current.is_live(now) => {
                if current.agent_id == op.agent_id {
                    current.operation_id = op.id.clone();
                    if op.priority.outranks(current.priority) {
                        current.priority = op.priority;
                    }
                    current.can_be_preempted &= op.priority != Priority::Critical;
                    current.expires_at = current.expires_at.max(expires_at);
                    return LockOutcome::Refreshed(current.clone());
                }
                if !(current.can_be_preempted && op.priority.outranks(current.priority)) {
                    return LockOutcome::Rejected(current.clone());
                }
                Some(UnlockReason::Preempted)
            }
            Some(_) => Some(UnlockReason::Expired),
            None => None,
        };

        let lock = DocumentLock {
            lock_id: LockId::generate(),
            document_path: document.clone(),
            operation_id: op.id.clone(),
            agent_id: op.agent_id.clone(),
            priority: op.priority,
            acquired_at: now,
            expires_at,
            can_be_preempted: op.priority != Priority::Critical,
        };
        let previous = self.locks.insert(document.clone(), lock.clone());
        LockOutcome::Acquired {
            lock,
            displaced: previous.zip(displaced),
        }
    }

    /// Release `lock_id` on `document`. A stale id (the lock was since
    /// replaced) releases nothing.
    pub fn release(&mut self, document: &DocumentPath, lock_id: &LockId) -> Option<DocumentLock> {
        if self.locks.get(document).is_some_and(|l| &l.lock_id == lock_id) {
            self.locks.remove(document)
        } else {
            None
        }
    }

    /// Drop every expired lock and return them.
    pub fn sweep_expired(&mut self, now: u64) -> Vec<DocumentLock> {
        let expired: Vec<DocumentPath> = self
            .locks
            .iter()
            .filter(|(_, l)| !l.is_live(now))
            .map(|(d, _)| d.clone())
            .collect();
        let mut swept: Vec<DocumentLock> = expired
            .iter()
            .filter_map(|d| self.locks.remove(d))
            .collect();
        swept.sort_by(|a, b| a.document_path.cmp(&b.document_path));
        swept
    }

    #[cfg(test)]
    fn live_count(&self, now: u64) -> usize {
        self.locks.values().filter(|l| l.is_live(now)).count()
    }
}
