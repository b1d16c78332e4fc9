//! Injected engine failures must never leave a document locked.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use concord_core::merge::MergeStrategy;
use concord_core::{
    AgentId, Change, Conflict, ConflictDetector, ConsolidationError, ConsolidationManager,
    DocumentLock, DocumentPath, Detector, EventKind, LifecycleEvent, ManualClock, MergeEngine,
    MergeResult, Merger, Operation, Phase, Priority,
};

const START: u64 = 1_700_000_000_000;

/// Fails the first `failures` calls, then behaves like the standard detector.
struct FlakyDetector {
    failures: AtomicUsize,
    inner: ConflictDetector,
}

impl FlakyDetector {
    fn new(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            inner: ConflictDetector::default(),
        }
    }
}

impl Detector for FlakyDetector {
    fn detect(&self, ops: &[Operation], now_ms: u64) -> Result<Vec<Conflict>, ConsolidationError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ConsolidationError::internal(Phase::Detection, "injected detector fault"));
        }
        self.inner.detect(ops, now_ms)
    }
}

/// Fails the first `failures` calls to `merge`, then behaves like the
/// standard engine.
struct FlakyMerger {
    failures: AtomicUsize,
    inner: MergeEngine,
}

impl FlakyMerger {
    fn new(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            inner: MergeEngine::default(),
        }
    }
}

impl Merger for FlakyMerger {
    fn merge(&self, ops: &[Operation]) -> Result<MergeResult, ConsolidationError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ConsolidationError::MergeFailed { failed_groups: 1 });
        }
        Merger::merge(&self.inner, ops)
    }

    fn merge_with(
        &self,
        strategy: MergeStrategy,
        ops: &[Operation],
    ) -> Result<MergeResult, ConsolidationError> {
        Merger::merge_with(&self.inner, strategy, ops)
    }
}

fn doc() -> DocumentPath {
    DocumentPath::new("shared.md").unwrap()
}

fn op(agent: &str, at: usize) -> Operation {
    Operation::new(
        AgentId::new(agent).unwrap(),
        doc(),
        vec![Change::insert(at, agent.to_owned())],
    )
}

fn hold(mgr: &mut ConsolidationManager) -> DocumentLock {
    let editor = Operation::new(
        AgentId::new("editor").unwrap(),
        doc(),
        vec![Change::insert(0, "#")],
    )
    .with_priority(Priority::Critical);
    mgr.acquire_lock(&editor).unwrap()
}

fn manager(clock: &ManualClock) -> ConsolidationManager {
    ConsolidationManager::default().with_clock(Arc::new(clock.clone()))
}

#[test]
fn detector_failure_releases_lock() {
    let clock = ManualClock::new(START);
    let mut mgr = manager(&clock).with_detector(Box::new(FlakyDetector::new(1)));
    let rx = mgr.channel(&[EventKind::DocumentLocked, EventKind::DocumentUnlocked]);
    let lock = hold(&mut mgr);
    mgr.submit(op("a", 10));
    mgr.release_lock(&lock.document_path, &lock.lock_id);

    let failed = mgr.process_queue(&doc());
    match &failed.failure {
        Some(ConsolidationError::InternalFailure { phase, message }) => {
            assert_eq!(*phase, Phase::Detection);
            assert!(message.contains("injected"));
        }
        other => panic!("expected internal failure, got {other:?}"),
    }
    assert!(mgr.query_status(&doc()).lock.is_none());
    assert_eq!(mgr.query_status(&doc()).queued_operations.len(), 1);

    let retried = mgr.submit(op("b", 200));
    assert!(retried.is_success(), "{:?}", retried.errors);
    assert_eq!(retried.final_changes.len(), 2);
    assert!(mgr.query_status(&doc()).lock.is_none());

    let locks = rx
        .try_iter()
        .filter(|e| matches!(e, LifecycleEvent::DocumentLocked { .. }))
        .count();
    assert_eq!(locks, 3, "editor hold, failed pass, retried pass");
    let m = mgr.metrics();
    assert_eq!(m.failed_passes, 1);
    assert_eq!(m.consolidated, 1);
}

#[test]
fn merger_failure_releases_lock_and_keeps_queue() {
    let clock = ManualClock::new(START);
    let mut mgr = manager(&clock).with_merger(Box::new(FlakyMerger::new(1)));
    let lock = hold(&mut mgr);
    mgr.submit(op("a", 10));
    mgr.submit(op("b", 400));
    mgr.release_lock(&lock.document_path, &lock.lock_id);

    let results = mgr.tick();
    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0].failure,
        Some(ConsolidationError::InternalFailure { phase: Phase::Merge, .. })
    ));
    let status = mgr.query_status(&doc());
    assert!(status.lock.is_none());
    assert_eq!(status.queued_operations.len(), 2);

    clock.advance(10);
    assert!(mgr.tick().is_empty(), "stalled document is not re-driven");

    let retried = mgr.submit(op("c", 800));
    assert!(retried.is_success(), "{:?}", retried.errors);
    assert_eq!(retried.final_changes.len(), 3);
    assert!(mgr.query_status(&doc()).queued_operations.is_empty());
}

#[test]
fn failed_pass_leaves_document_lockable_by_others() {
    let clock = ManualClock::new(START);
    let mut mgr = manager(&clock).with_detector(Box::new(FlakyDetector::new(usize::MAX)));
    let lock = hold(&mut mgr);
    mgr.submit(op("a", 10));
    mgr.release_lock(&lock.document_path, &lock.lock_id);
    mgr.process_queue(&doc());

    let other = Operation::new(
        AgentId::new("reviewer").unwrap(),
        doc(),
        vec![Change::insert(0, "!")],
    )
    .with_priority(Priority::Low);
    assert!(mgr.acquire_lock(&other).is_ok());
}
