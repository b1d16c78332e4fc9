//! Per-document operation queue, kept in processing order.

use crate::model::{Operation, OperationId};

/// Operations waiting for a consolidation pass, ordered by priority then
/// timestamp. Equal keys keep arrival order.
#[derive(Clone, Debug, Default)]
pub struct DocumentQueue {
    ops: Vec<Operation>,
}

impl DocumentQueue {
    /// Insert `op` after every queued operation with the same or a smaller
    /// key. An operation already queued under the same id is replaced and
    /// returned.
    pub fn push(&mut self, op: Operation) -> Option<Operation> {
        let replaced = self
            .ops
            .iter()
            .position(|o| o.id == op.id)
            .map(|i| self.ops.remove(i));
        let key = op.queue_key();
        let at = self.ops.partition_point(|o| o.queue_key() <= key);
        self.ops.insert(at, op);
        replaced
    }

    /// Whether an operation with `id` is queued.
    #[must_use]
    pub fn contains(&self, id: &OperationId) -> bool {
        self.ops.iter().any(|o| &o.id == id)
    }

    /// The operation that would be processed first.
    #[must_use]
    pub fn head(&self) -> Option<&Operation> {
        self.ops.first()
    }

    /// Queued operations in processing order.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Queued operation ids in processing order.
    #[must_use]
    pub fn ids(&self) -> Vec<OperationId> {
        self.ops.iter().map(|o| o.id.clone()).collect()
    }

    /// Number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Sum of queued operations' estimated durations.
    #[must_use]
    pub fn estimated_total_ms(&self) -> u64 {
        self.ops
            .iter()
            .map(|o| o.metadata.estimated_duration_ms)
            .fold(0, u64::saturating_add)
    }

    /// Remove every operation whose id is in `ids`.
    pub fn remove_all(&mut self, ids: &[OperationId]) {
        self.ops.retain(|o| !ids.contains(&o.id));
    }
}
