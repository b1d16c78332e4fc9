//! Scenario replay.
//!
//! A scenario is a JSON script of timed steps (submissions, explicit lock
//! holds and releases, clock advances, ticks) replayed through a
//! [`ConsolidationManager`] on a [`ManualClock`]. The report records every
//! step's outcome, every lifecycle event and the final metrics, so captured
//! sessions can be re-run and their decisions inspected.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use concord_core::{
    Clock, ConcordConfig, ConsolidationError, ConsolidationManager, ConsolidationResult, DocumentLock,
    DocumentPath, LifecycleEvent, ManagerMetrics, ManualClock, Operation, StatusReport,
};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A replayable session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Free-form title.
    #[serde(default)]
    pub name: String,
    /// Clock value at the first step, in milliseconds since the Unix epoch.
    #[serde(default = "default_start_ms")]
    pub start_ms: u64,
    /// Steps in order.
    pub steps: Vec<Step>,
}

const fn default_start_ms() -> u64 {
    1_700_000_000_000
}

/// One scripted action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Submit an operation. A zero timestamp is stamped with the clock.
    Submit {
        /// The operation.
        operation: Operation,
    },
    /// Hold the operation's document; the lock is remembered as `label`.
    Acquire {
        /// Name for the lock in later `release` steps.
        label: String,
        /// Operation the lock is taken for.
        operation: Operation,
    },
    /// Release the lock remembered as `label`.
    Release {
        /// Name given at `acquire`.
        label: String,
    },
    /// Move the clock forward.
    Advance {
        /// Milliseconds.
        ms: u64,
    },
    /// Run the manager's timers.
    Tick,
    /// Run a pass over one document's queue.
    Process {
        /// The document.
        document: DocumentPath,
    },
    /// Record one document's status.
    Status {
        /// The document.
        document: DocumentPath,
    },
}

impl Scenario {
    /// Read a scenario from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing scenario {}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// What one step produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Results of a submission, tick or pass, including passes run in the
    /// background of a submission.
    Results {
        /// In the order they were produced.
        results: Vec<ConsolidationResult>,
    },
    /// A lock was granted.
    Locked {
        /// The lock.
        lock: DocumentLock,
    },
    /// A lock request failed.
    LockFailed {
        /// Why.
        error: ConsolidationError,
    },
    /// A release was attempted.
    Released {
        /// Whether the lock was still held.
        released: bool,
    },
    /// The clock moved.
    Advanced,
    /// A status snapshot.
    Status {
        /// The snapshot.
        status: StatusReport,
    },
}

/// One replayed step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Position in the scenario, from zero.
    pub index: usize,
    /// Clock value when the step ran.
    pub at: u64,
    /// What happened.
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Everything a replay produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Scenario title.
    pub name: String,
    /// One report per step.
    pub steps: Vec<StepReport>,
    /// Every lifecycle event, in publication order.
    pub events: Vec<LifecycleEvent>,
    /// Counters at the end.
    pub metrics: ManagerMetrics,
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// Replay `scenario` through a fresh manager built from `config`.
///
/// # Errors
/// Returns an error if a `release` step names a label no `acquire` step
/// defined.
pub fn replay(scenario: &Scenario, config: ConcordConfig) -> Result<ReplayReport> {
    let clock = ManualClock::new(scenario.start_ms);
    let mut mgr = ConsolidationManager::new(config).with_clock(Arc::new(clock.clone()));
    let events = mgr.channel(&[]);
    let mut labels: HashMap<String, DocumentLock> = HashMap::new();
    let mut steps = Vec::with_capacity(scenario.steps.len());

    for (index, step) in scenario.steps.iter().enumerate() {
        let at = clock.now_ms();
        tracing::debug!(index, at, ?step, "replaying step");
        let outcome = match step {
            Step::Submit { operation } => {
                let result = mgr.submit(operation.clone());
                let mut results = mgr.drain_background_results();
                results.push(result);
                StepOutcome::Results { results }
            }
            Step::Acquire { label, operation } => match mgr.acquire_lock(operation) {
                Ok(lock) => {
                    labels.insert(label.clone(), lock.clone());
                    StepOutcome::Locked { lock }
                }
                Err(error) => StepOutcome::LockFailed { error },
            },
            Step::Release { label } => {
                let Some(lock) = labels.remove(label) else {
                    bail!("step {index}: no lock labelled `{label}`");
                };
                StepOutcome::Released {
                    released: mgr.release_lock(&lock.document_path, &lock.lock_id),
                }
            }
            Step::Advance { ms } => {
                clock.advance(*ms);
                StepOutcome::Advanced
            }
            Step::Tick => StepOutcome::Results {
                results: mgr.tick(),
            },
            Step::Process { document } => StepOutcome::Results {
                results: vec![mgr.process_queue(document)],
            },
            Step::Status { document } => StepOutcome::Status {
                status: mgr.query_status(document),
            },
        };
        steps.push(StepReport { index, at, outcome });
    }

    Ok(ReplayReport {
        name: scenario.name.clone(),
        steps,
        events: events.try_iter().collect(),
        metrics: mgr.metrics(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_release_label_fails() {
        let scenario: Scenario = serde_json::from_str(
            r#"{ "steps": [ { "step": "release", "label": "nobody" } ] }"#,
        )
        .unwrap();
        let err = replay(&scenario, ConcordConfig::default()).unwrap_err();
        assert!(err.to_string().contains("nobody"));
    }

    #[test]
    fn advance_moves_step_clock() {
        let scenario: Scenario = serde_json::from_str(
            r#"{ "start_ms": 1000, "steps": [ { "step": "advance", "ms": 250 }, { "step": "tick" } ] }"#,
        )
        .unwrap();
        let report = replay(&scenario, ConcordConfig::default()).unwrap();
        assert_eq!(report.steps[0].at, 1000);
        assert_eq!(report.steps[1].at, 1250);
        assert_eq!(report.steps[1].outcome, StepOutcome::Results { results: Vec::new() });
    }
}
