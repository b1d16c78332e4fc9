//! The `concord` binary end to end.

use std::path::PathBuf;
use std::process::{Command, Output};

fn concord(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_concord"))
        .args(args)
        .env("CONCORD_LOG", "off")
        .env_remove("CONCORD_CONFIG")
        .output()
        .expect("failed to run concord")
}

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
        .display()
        .to_string()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn detect_reports_overlap_as_json() {
    let out = concord(&["detect", &fixture("overlapping_ops.json"), "--format", "json"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let conflicts: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    let conflicts = conflicts.as_array().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["kind"], "overlapping_edits");
    assert_eq!(conflicts[0]["severity"], "high");
}

#[test]
fn merge_keeps_disjoint_changes() {
    let out = concord(&["merge", &fixture("disjoint_ops.json"), "--format", "json"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let result: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(result["final_changes"].as_array().unwrap().len(), 2);
}

#[test]
fn replay_prints_text_summary() {
    let out = concord(&["replay", &fixture("typist_vs_assistant.json")]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let text = stdout(&out);
    assert!(text.contains("scenario: typist and assistant"), "{text}");
    assert!(text.contains("priority_wins"), "{text}");
}

#[test]
fn config_prints_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("concord.toml");
    std::fs::write(&path, "[coordination]\ndefer_delay_ms = 2500\n").unwrap();
    let out = concord(&["config", "--config", path.to_str().unwrap()]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let text = stdout(&out);
    assert!(text.contains("defer_delay_ms = 2500"), "{text}");
    assert!(text.contains("lock_safety_margin_ms = 30000"), "{text}");
}

#[test]
fn bad_config_fails_with_line_number() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("concord.toml");
    std::fs::write(&path, "[merge]\n\nbogus = = 1\n").unwrap();
    let out = concord(&["config", "--config", path.to_str().unwrap()]);
    assert!(!out.status.success());
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("line 3"), "{err}");
}

#[test]
fn missing_operations_file_fails() {
    let out = concord(&["merge", "/nonexistent/ops.json"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("reading operations"));
}
