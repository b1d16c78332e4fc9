//! Consolidation Manager.
//!
//! Owns per-document state (queue, history, open conflicts), the lock table,
//! the event bus and the two engines. Entry points:
//!
//! - [`ConsolidationManager::submit`] applies an operation directly when the
//!   document is idle, otherwise queues it and runs a pass.
//! - [`ConsolidationManager::process_queue`] runs one pass over a document's
//!   queue: lock, detect, resolve, merge, release.
//! - [`ConsolidationManager::tick`] drives the cooperative timers: lock and
//!   history sweep, deferred resubmission, re-driving idle queues.
//!
//! Nothing here blocks or spawns threads. Callers sharing a manager across
//! threads wrap it in a [`SharedManager`].

pub mod events;
pub mod history;
pub mod lock;
pub mod metrics;
pub mod queue;
pub mod resolve;
pub mod result;

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::clock::{Clock, SystemClock};
use crate::config::{ConcordConfig, CoordinationConfig};
use crate::detect::{ConflictDetector, Detector};
use crate::error::{ConsolidationError, Phase};
use crate::merge::{MergeEngine, Merger};
use crate::model::{Conflict, DocumentPath, LockId, Operation, OperationId};

pub use events::{EventBus, EventCallback, EventKind, LifecycleEvent, SubscriptionId, UnlockReason};
pub use history::{ActivityEntry, ActivityKind, DocumentHistory};
pub use lock::{DocumentLock, LockOutcome, LockTable};
pub use metrics::ManagerMetrics;
pub use queue::DocumentQueue;
pub use resolve::{ResolutionOutcome, ResolutionRecord, resolve_conflicts, select_strategy};
pub use result::ConsolidationResult;

/// A manager shared between threads.
pub type SharedManager = Arc<Mutex<ConsolidationManager>>;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Read-only view of one document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// The document.
    pub document: DocumentPath,
    /// Operation of the live lock holder, if any.
    pub active_operations: Vec<OperationId>,
    /// Queued operations in processing order.
    pub queued_operations: Vec<OperationId>,
    /// Conflicts left open by the last failed pass.
    pub active_conflicts: Vec<Conflict>,
    /// The live lock, if any.
    pub lock: Option<DocumentLock>,
    /// Expected wait for a new submission.
    pub estimated_wait_ms: u64,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct DocumentState {
    queue: DocumentQueue,
    history: DocumentHistory,
    active_conflicts: Vec<Conflict>,
    /// The last pass failed and nothing was queued since.
    stalled: bool,
}

impl DocumentState {
    fn new(capacity: usize) -> Self {
        Self {
            queue: DocumentQueue::default(),
            history: DocumentHistory::new(capacity),
            active_conflicts: Vec::new(),
            stalled: false,
        }
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.history.is_empty() && self.active_conflicts.is_empty()
    }
}

#[derive(Debug)]
struct Deferred {
    due_at: u64,
    op: Operation,
}

/// A lock held for the duration of a pass.
struct PassLock {
    lock: DocumentLock,
    /// Taken by this pass (rather than refreshed from the holder's own lock),
    /// so the pass releases it.
    owned: bool,
}

/// Coordinates concurrent operations per document.
pub struct ConsolidationManager {
    config: CoordinationConfig,
    clock: Arc<dyn Clock>,
    detector: Box<dyn Detector>,
    merger: Box<dyn Merger>,
    locks: LockTable,
    documents: HashMap<DocumentPath, DocumentState>,
    deferred: Vec<Deferred>,
    events: EventBus,
    metrics: ManagerMetrics,
    last_sweep: Option<u64>,
    background: Vec<ConsolidationResult>,
}

impl std::fmt::Debug for ConsolidationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsolidationManager")
            .field("config", &self.config)
            .field("documents", &self.documents.len())
            .field("deferred", &self.deferred.len())
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl Default for ConsolidationManager {
    fn default() -> Self {
        Self::new(ConcordConfig::default())
    }
}

impl ConsolidationManager {
    /// Create a manager with the standard engines on the system clock.
    #[must_use]
    pub fn new(config: ConcordConfig) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            detector: Box::new(ConflictDetector::new(config.detection)),
            merger: Box::new(MergeEngine::new(config.merge)),
            config: config.coordination,
            locks: LockTable::default(),
            documents: HashMap::new(),
            deferred: Vec::new(),
            events: EventBus::default(),
            metrics: ManagerMetrics::default(),
            last_sweep: None,
            background: Vec::new(),
        }
    }

    /// Use `clock` as the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.last_sweep = None;
        self
    }

    /// Replace the conflict detector.
    #[must_use]
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detector = detector;
        self
    }

    /// Replace the merger.
    #[must_use]
    pub fn with_merger(mut self, merger: Box<dyn Merger>) -> Self {
        self.merger = merger;
        self
    }

    /// Wrap in a [`SharedManager`].
    #[must_use]
    pub fn shared(self) -> SharedManager {
        Arc::new(Mutex::new(self))
    }

    /// Coordination settings in use.
    #[must_use]
    pub const fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn metrics(&self) -> ManagerMetrics {
        self.metrics.clone()
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Submit an operation.
    ///
    /// When the document is idle the result carries the operation's own
    /// changes and `needs_consolidation` is false. Otherwise the operation is
    /// queued and `needs_consolidation` is true: the caller applies
    /// `final_changes` of this pass, or of the later pass announced by
    /// [`LifecycleEvent::ConsolidationComplete`], never its own changes. A
    /// queued operation is kept until consolidated, so it must not be
    /// resubmitted; a resubmission replaces the queued copy, and one after
    /// consolidation is rejected.
    ///
    /// Runs [`tick`](Self::tick) first; results of passes it triggers are
    /// kept for [`drain_background_results`](Self::drain_background_results).
    /// An operation with a zero timestamp is stamped with the current time.
    #[instrument(
        skip_all,
        fields(operation = %op.id, agent = %op.agent_id, document = %op.document_path)
    )]
    pub fn submit(&mut self, op: Operation) -> ConsolidationResult {
        let background = self.tick();
        self.background.extend(background);
        self.metrics.submitted += 1;
        self.admit(op)
    }

    fn admit(&mut self, mut op: Operation) -> ConsolidationResult {
        if let Err(reason) = op.validate() {
            self.metrics.rejected_invalid += 1;
            tracing::warn!(operation = %op.id, %reason, "rejected invalid operation");
            return ConsolidationResult::rejected(
                Some(op.id),
                ConsolidationError::InvalidOperation { reason },
            );
        }

        if self
            .documents
            .get(&op.document_path)
            .is_some_and(|s| s.history.was_consolidated(&op.id))
        {
            self.metrics.rejected_invalid += 1;
            tracing::warn!(operation = %op.id, "rejected resubmission of a consolidated operation");
            let reason = format!("operation {} was already consolidated", op.id);
            return ConsolidationResult::rejected(
                Some(op.id),
                ConsolidationError::InvalidOperation { reason },
            );
        }

        let now = self.clock.now_ms();
        if op.timestamp == 0 {
            op.timestamp = now;
        }

        if !self.needs_coordination(&op, now) {
            self.metrics.applied_directly += 1;
            tracing::debug!(operation = %op.id, "no coordination needed, applying directly");
            return ConsolidationResult::applied(op.id, op.changes);
        }

        let id = op.id.clone();
        let document = op.document_path.clone();
        let replaced = self.enqueue(op, now);

        let pass = self.process_queue(&document);
        let mut result = if let Some(ConsolidationError::LockUnavailable {
            document,
            holder,
            estimated_wait_ms,
        }) = &pass.failure
        {
            let mut queued = ConsolidationResult::queued(id.clone(), *estimated_wait_ms);
            queued
                .warnings
                .push(format!("queued behind `{holder}`'s lock on `{document}`"));
            queued
        } else {
            pass
        };
        result.operation_id = Some(id.clone());
        result.needs_consolidation = true;
        if replaced {
            result
                .warnings
                .push(format!("operation {id} was already queued; the queued copy was replaced"));
        }
        if result.estimated_wait_ms == 0
            && self
                .documents
                .get(&document)
                .is_some_and(|s| s.queue.contains(&id))
        {
            result.estimated_wait_ms = self.estimated_wait(&document, self.clock.now_ms());
        }
        result
    }

    fn needs_coordination(&self, op: &Operation, now: u64) -> bool {
        let document = &op.document_path;
        if self
            .locks
            .live(document, now)
            .is_some_and(|l| l.agent_id != op.agent_id)
        {
            return true;
        }
        self.documents.get(document).is_some_and(|state| {
            !state.queue.is_empty()
                || state
                    .history
                    .has_activity_since(now.saturating_sub(self.config.recent_activity_window_ms))
        })
    }

    /// Queue `op`; returns whether it replaced a queued copy of itself.
    fn enqueue(&mut self, op: Operation, now: u64) -> bool {
        let capacity = self.config.history_capacity;
        let document = op.document_path.clone();
        let operation_id = op.id.clone();
        let agent_id = op.agent_id.clone();
        let state = self
            .documents
            .entry(document.clone())
            .or_insert_with(|| DocumentState::new(capacity));
        state.history.record(ActivityEntry {
            at: now,
            kind: ActivityKind::Queued,
            operations: vec![operation_id.clone()],
        });
        state.stalled = false;
        let replaced = state.queue.push(op).is_some();
        let queue_len = state.queue.len();
        if replaced {
            tracing::warn!(
                document = %document,
                operation = %operation_id,
                "resubmitted operation replaced its queued copy"
            );
        } else {
            self.metrics.queued += 1;
        }
        self.events.publish(&LifecycleEvent::OperationQueued {
            document,
            operation_id,
            agent_id,
            queue_len,
            at: now,
        });
        replaced
    }

    // -----------------------------------------------------------------------
    // Passes
    // -----------------------------------------------------------------------

    /// Run one consolidation pass over `document`'s queue.
    ///
    /// An empty queue yields an empty success. If the lock cannot be taken
    /// the result is not accepted and carries the expected wait; otherwise
    /// the lock taken for the pass is released whatever happens.
    #[instrument(skip_all, fields(document = %document))]
    pub fn process_queue(&mut self, document: &DocumentPath) -> ConsolidationResult {
        let now = self.clock.now_ms();
        let Some(head) = self
            .documents
            .get(document)
            .and_then(|s| s.queue.head())
            .cloned()
        else {
            return ConsolidationResult::pass();
        };

        let pass_lock = match self.take_lock(&head, now) {
            Ok(pass_lock) => pass_lock,
            Err(failure) => {
                let mut result = ConsolidationResult::pass();
                result.accepted = false;
                result.needs_consolidation = true;
                result.fail(failure);
                return result;
            }
        };

        self.metrics.passes += 1;
        let started = Instant::now();
        let result = self.run_pass(document, now);
        self.metrics.record_pass(started.elapsed());

        if pass_lock.owned {
            self.release_internal(document, &pass_lock.lock.lock_id, UnlockReason::Released);
        }
        result
    }

    fn run_pass(&mut self, document: &DocumentPath, now: u64) -> ConsolidationResult {
        let ops: Vec<Operation> = self
            .documents
            .get(document)
            .map(|s| s.queue.operations().to_vec())
            .unwrap_or_default();
        let ids: Vec<OperationId> = ops.iter().map(|o| o.id.clone()).collect();
        let mut result = ConsolidationResult::pass();

        let conflicts = match self.detector.detect(&ops, now) {
            Ok(conflicts) => conflicts,
            Err(e) => {
                let failure = internal(Phase::Detection, e);
                return self.fail_pass(document, &ids, result, failure, Vec::new(), now);
            }
        };
        self.metrics.conflicts_detected += conflicts.len() as u64;

        let outcome = match resolve_conflicts(ops, &conflicts, self.merger.as_ref()) {
            Ok(outcome) => outcome,
            Err(e) => {
                let failure = internal(Phase::Resolution, e);
                return self.fail_pass(document, &ids, result, failure, conflicts, now);
            }
        };
        for record in &outcome.records {
            if record.success {
                self.metrics.record_resolution(record.strategy);
            }
            self.events.publish(&LifecycleEvent::ConflictResolved {
                document: document.clone(),
                conflict_id: record.conflict.id.clone(),
                kind: record.conflict.kind,
                strategy: record.strategy,
                success: record.success,
                at: now,
            });
        }
        result.resolutions.clone_from(&outcome.records);
        result.warnings.extend(outcome.warnings.iter().cloned());
        result.requires_user_review |= outcome.requires_user_review;

        if !outcome.is_resolved() {
            let failure = ConsolidationError::ConflictUnresolved {
                conflicts: outcome.unresolved.iter().map(|c| c.id.clone()).collect(),
            };
            return self.fail_pass(document, &ids, result, failure, outcome.unresolved, now);
        }

        let merged = match self.merger.merge(&outcome.working) {
            Ok(merged) => merged,
            Err(e) => {
                let failure = internal(Phase::Merge, e);
                return self.fail_pass(document, &ids, result, failure, Vec::new(), now);
            }
        };

        for op in outcome.deferred {
            tracing::info!(
                operation = %op.id,
                delay_ms = self.config.defer_delay_ms,
                "operation deferred"
            );
            result.deferred.push(op.id.clone());
            self.metrics.deferrals += 1;
            self.deferred.push(Deferred {
                due_at: now.saturating_add(self.config.defer_delay_ms),
                op,
            });
        }

        result.warnings.extend(merged.warnings);
        result.errors.extend(merged.errors);
        result.requires_user_review |= merged.requires_user_review;
        result.final_changes = merged.final_changes;
        result.unmerged_changes = merged.unmerged_changes;
        if merged.success {
            self.metrics.consolidated += 1;
        } else {
            self.metrics.failed_passes += 1;
            let failed_groups = result.errors.len();
            tracing::warn!(document = %document, failed_groups, "pass merged only partially");
            result.failure = Some(ConsolidationError::MergeFailed { failed_groups });
        }

        if let Some(state) = self.documents.get_mut(document) {
            state.queue.remove_all(&ids);
            state.active_conflicts.clear();
            state.stalled = false;
            state.history.record(ActivityEntry {
                at: now,
                kind: ActivityKind::Consolidated,
                operations: ids
                    .iter()
                    .filter(|id| !result.deferred.contains(*id))
                    .cloned()
                    .collect(),
            });
        }
        tracing::info!(
            document = %document,
            operations = ids.len(),
            changes = result.final_changes.len(),
            "queue consolidated"
        );
        self.events.publish(&LifecycleEvent::ConsolidationComplete {
            document: document.clone(),
            operations: ids,
            success: merged.success,
            final_changes: result.final_changes.clone(),
            at: now,
        });
        result
    }

    fn fail_pass(
        &mut self,
        document: &DocumentPath,
        ids: &[OperationId],
        mut result: ConsolidationResult,
        failure: ConsolidationError,
        open: Vec<Conflict>,
        now: u64,
    ) -> ConsolidationResult {
        tracing::warn!(document = %document, error = %failure, "consolidation pass failed");
        self.metrics.failed_passes += 1;
        if let Some(state) = self.documents.get_mut(document) {
            state.active_conflicts.clone_from(&open);
            state.stalled = true;
            state.history.record(ActivityEntry {
                at: now,
                kind: ActivityKind::Failed,
                operations: ids.to_vec(),
            });
        }
        self.events.publish(&LifecycleEvent::ConsolidationComplete {
            document: document.clone(),
            operations: ids.to_vec(),
            success: false,
            final_changes: Vec::new(),
            at: now,
        });
        result.needs_consolidation = true;
        result.requires_user_review |= !open.is_empty();
        result.active_conflicts = open;
        result.fail(failure);
        result
    }

    // -----------------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------------

    fn take_lock(&mut self, op: &Operation, now: u64) -> Result<PassLock, ConsolidationError> {
        match self
            .locks
            .try_acquire(op, now, self.config.lock_safety_margin_ms)
        {
            LockOutcome::Acquired { lock, displaced } => {
                if let Some((old, reason)) = displaced {
                    match reason {
                        UnlockReason::Preempted => self.metrics.lock_preemptions += 1,
                        UnlockReason::Expired => self.metrics.locks_expired += 1,
                        UnlockReason::Released => {}
                    }
                    tracing::info!(
                        document = %old.document_path,
                        holder = %old.agent_id,
                        %reason,
                        "lock displaced"
                    );
                    self.events.publish(&LifecycleEvent::DocumentUnlocked {
                        document: old.document_path,
                        lock_id: old.lock_id,
                        agent_id: old.agent_id,
                        reason,
                        at: now,
                    });
                }
                self.metrics.lock_acquisitions += 1;
                self.publish_locked(&lock, now);
                Ok(PassLock { lock, owned: true })
            }
            LockOutcome::Refreshed(lock) => {
                self.metrics.lock_refreshes += 1;
                self.publish_locked(&lock, now);
                Ok(PassLock { lock, owned: false })
            }
            LockOutcome::Rejected(holder) => {
                self.metrics.lock_rejections += 1;
                let estimated_wait_ms = holder.remaining_ms(now);
                tracing::warn!(
                    document = %holder.document_path,
                    holder = %holder.agent_id,
                    requester = %op.agent_id,
                    estimated_wait_ms,
                    "lock unavailable"
                );
                Err(ConsolidationError::LockUnavailable {
                    document: holder.document_path,
                    holder: holder.agent_id,
                    estimated_wait_ms,
                })
            }
        }
    }

    fn publish_locked(&mut self, lock: &DocumentLock, now: u64) {
        self.events.publish(&LifecycleEvent::DocumentLocked {
            document: lock.document_path.clone(),
            lock_id: lock.lock_id.clone(),
            agent_id: lock.agent_id.clone(),
            operation_id: lock.operation_id.clone(),
            expires_at: lock.expires_at,
            at: now,
        });
    }

    fn release_internal(
        &mut self,
        document: &DocumentPath,
        lock_id: &LockId,
        reason: UnlockReason,
    ) -> bool {
        let Some(lock) = self.locks.release(document, lock_id) else {
            return false;
        };
        self.events.publish(&LifecycleEvent::DocumentUnlocked {
            document: lock.document_path,
            lock_id: lock.lock_id,
            agent_id: lock.agent_id,
            reason,
            at: self.clock.now_ms(),
        });
        true
    }

    /// Take (or refresh) the lock on `op`'s document for a long-running
    /// edit. Submissions from other agents queue until it is released or
    /// expires.
    ///
    /// # Errors
    /// [`ConsolidationError::InvalidOperation`] for a malformed `op`;
    /// [`ConsolidationError::LockUnavailable`] if another agent holds a lock
    /// `op` cannot preempt.
    pub fn acquire_lock(&mut self, op: &Operation) -> Result<DocumentLock, ConsolidationError> {
        op.validate()
            .map_err(|reason| ConsolidationError::InvalidOperation { reason })?;
        let now = self.clock.now_ms();
        self.take_lock(op, now).map(|pass_lock| pass_lock.lock)
    }

    /// Release a lock taken with [`acquire_lock`](Self::acquire_lock).
    /// Returns false if `lock_id` is no longer the document's lock.
    pub fn release_lock(&mut self, document: &DocumentPath, lock_id: &LockId) -> bool {
        self.release_internal(document, lock_id, UnlockReason::Released)
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Run due timers: the periodic sweep, deferred resubmissions, then a
    /// pass on every unlocked document with a queue. A document whose last
    /// pass failed is skipped until something new is queued on it.
    pub fn tick(&mut self) -> Vec<ConsolidationResult> {
        let now = self.clock.now_ms();
        self.sweep_if_due(now);

        let mut results = Vec::new();
        let (due, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.deferred).into_iter().partition(|d| d.due_at <= now);
        self.deferred = pending;
        for Deferred { mut op, .. } in due {
            tracing::info!(operation = %op.id, "resubmitting deferred operation");
            op.timestamp = now;
            self.metrics.resubmissions += 1;
            results.push(self.admit(op));
        }

        let mut ready: Vec<DocumentPath> = self
            .documents
            .iter()
            .filter(|(doc, state)| {
                !state.queue.is_empty() && !state.stalled && self.locks.live(doc, now).is_none()
            })
            .map(|(doc, _)| doc.clone())
            .collect();
        ready.sort();
        for document in ready {
            results.push(self.process_queue(&document));
        }
        results
    }

    fn sweep_if_due(&mut self, now: u64) {
        let Some(last) = self.last_sweep else {
            self.last_sweep = Some(now);
            return;
        };
        if now.saturating_sub(last) < self.config.sweep_interval_ms {
            return;
        }
        self.last_sweep = Some(now);

        for lock in self.locks.sweep_expired(now) {
            self.metrics.locks_expired += 1;
            self.events.publish(&LifecycleEvent::DocumentUnlocked {
                document: lock.document_path,
                lock_id: lock.lock_id,
                agent_id: lock.agent_id,
                reason: UnlockReason::Expired,
                at: now,
            });
        }

        let cutoff = now.saturating_sub(self.config.history_retention_ms);
        let mut pruned = 0;
        for state in self.documents.values_mut() {
            pruned += state.history.prune_before(cutoff);
        }
        self.documents.retain(|_, state| !state.is_idle());
        tracing::debug!(pruned, documents = self.documents.len(), "sweep finished");
    }

    /// Take the results of passes run by the `tick` inside `submit`.
    pub fn drain_background_results(&mut self) -> Vec<ConsolidationResult> {
        std::mem::take(&mut self.background)
    }

    // -----------------------------------------------------------------------
    // Queries and subscriptions
    // -----------------------------------------------------------------------

    /// Current state of `document`.
    #[must_use]
    pub fn query_status(&self, document: &DocumentPath) -> StatusReport {
        let now = self.clock.now_ms();
        let lock = self.locks.live(document, now).cloned();
        let state = self.documents.get(document);
        StatusReport {
            document: document.clone(),
            active_operations: lock.iter().map(|l| l.operation_id.clone()).collect(),
            queued_operations: state.map(|s| s.queue.ids()).unwrap_or_default(),
            active_conflicts: state.map(|s| s.active_conflicts.clone()).unwrap_or_default(),
            lock,
            estimated_wait_ms: self.estimated_wait(document, now),
        }
    }

    /// Remaining TTL of the live lock, else the queued work's estimated
    /// duration.
    fn estimated_wait(&self, document: &DocumentPath, now: u64) -> u64 {
        self.locks.live(document, now).map_or_else(
            || {
                self.documents
                    .get(document)
                    .map_or(0, |s| s.queue.estimated_total_ms())
            },
            |l| l.remaining_ms(now),
        )
    }

    /// Operations waiting for deferred resubmission.
    #[must_use]
    pub fn deferred_operations(&self) -> Vec<OperationId> {
        self.deferred.iter().map(|d| d.op.id.clone()).collect()
    }

    /// Call `f` for matching lifecycle events. An empty `kinds` matches all.
    pub fn subscribe<F>(&mut self, kinds: &[EventKind], f: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kinds, f)
    }

    /// Receive matching lifecycle events on a channel.
    pub fn channel(&mut self, kinds: &[EventKind]) -> mpsc::Receiver<LifecycleEvent> {
        self.events.channel(kinds)
    }

    /// Remove a subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }
}

/// Normalise an engine error into an internal failure for `phase`.
fn internal(phase: Phase, err: ConsolidationError) -> ConsolidationError {
    match err {
        e @ ConsolidationError::InternalFailure { .. } => e,
        other => ConsolidationError::internal(phase, other.to_string()),
    }
}
