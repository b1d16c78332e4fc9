//! Scenario replay against the fixture sessions.

use std::path::PathBuf;

use concord::scenario::{self, Scenario, StepOutcome};
use concord_core::{ConcordConfig, ConflictKind, EventKind, ResolutionStrategy};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn typist_vs_assistant_replays_to_priority_win() {
    let scenario = Scenario::load(&fixture("typist_vs_assistant.json")).unwrap();
    let report = scenario::replay(&scenario, ConcordConfig::default()).unwrap();
    assert_eq!(report.steps.len(), scenario.steps.len());

    let StepOutcome::Status { status } = &report.steps[4].outcome else {
        panic!("step 4 should be a status snapshot");
    };
    assert_eq!(status.queued_operations.len(), 2);
    assert_eq!(status.lock.as_ref().unwrap().agent_id.as_str(), "editor");

    let StepOutcome::Results { results } = &report.steps[6].outcome else {
        panic!("step 6 should produce results");
    };
    assert_eq!(results.len(), 1);
    let pass = &results[0];
    assert!(pass.is_success(), "{:?}", pass.errors);
    assert_eq!(pass.resolutions.len(), 1);
    assert_eq!(pass.resolutions[0].conflict.kind, ConflictKind::OverlappingEdits);
    assert_eq!(pass.resolutions[0].strategy, ResolutionStrategy::PriorityWins);
    assert_eq!(pass.final_changes.len(), 1);
    assert_eq!(pass.final_changes[0].inserted_text, "goodbye");

    let StepOutcome::Status { status } = &report.steps[7].outcome else {
        panic!("step 7 should be a status snapshot");
    };
    assert!(status.queued_operations.is_empty());
    assert!(status.lock.is_none());

    assert_eq!(report.metrics.submitted, 2);
    assert_eq!(report.metrics.queued, 2);
    assert_eq!(report.metrics.consolidated, 1);
    assert_eq!(report.metrics.lock_rejections, 2);

    let completions = report
        .events
        .iter()
        .filter(|e| e.kind() == EventKind::ConsolidationComplete)
        .count();
    assert_eq!(completions, 1);
}

#[test]
fn replay_report_serializes_tagged_steps() {
    let scenario = Scenario::load(&fixture("typist_vs_assistant.json")).unwrap();
    let report = scenario::replay(&scenario, ConcordConfig::default()).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["steps"][0]["outcome"], "locked");
    assert_eq!(json["steps"][2]["outcome"], "advanced");
    assert_eq!(json["steps"][5]["outcome"], "released");
    assert_eq!(json["steps"][5]["released"], true);
    assert_eq!(json["events"][0]["event"], "document_locked");
}
