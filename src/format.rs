//! Output formats for CLI reports.

use std::fmt::Write as _;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use concord_core::{Conflict, ConsolidationResult, MergeResult};

use crate::scenario::{ReplayReport, StepOutcome};

/// Output format for structured data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text for terminals
    #[default]
    Text,
    /// JSON - machine-parseable
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => bail!("Invalid format '{s}'. Use: text or json"),
        }
    }
}

impl OutputFormat {
    /// Render `data` as JSON, or with `text` for the text format.
    ///
    /// # Errors
    /// Returns an error if JSON serialization fails.
    pub fn render<T: Serialize>(self, data: &T, text: impl FnOnce(&T) -> String) -> Result<String> {
        match self {
            Self::Json => serde_json::to_string_pretty(data).context("JSON serialization failed"),
            Self::Text => Ok(text(data)),
        }
    }
}

// ---------------------------------------------------------------------------
// Text renderers
// ---------------------------------------------------------------------------

/// One line per conflict.
#[must_use]
pub fn conflicts_text(conflicts: &[Conflict]) -> String {
    if conflicts.is_empty() {
        return "no conflicts\n".to_owned();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{} conflict(s):", conflicts.len());
    for c in conflicts {
        let _ = writeln!(out, "  - {c}");
    }
    out
}

/// Summary of a merge.
#[must_use]
pub fn merge_text(result: &MergeResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "merge {} (confidence {:.2}, {} change(s))",
        if result.success { "succeeded" } else { "failed" },
        result.confidence,
        result.final_changes.len()
    );
    for c in &result.final_changes {
        let _ = writeln!(out, "  {} [{}, {}) {:?}", c.kind, c.from, c.to, c.inserted_text);
    }
    write_notes(&mut out, &result.warnings, &result.errors);
    if !result.unmerged_changes.is_empty() {
        let _ = writeln!(out, "  unmerged: {} change(s)", result.unmerged_changes.len());
    }
    if result.requires_user_review {
        let _ = writeln!(out, "  requires user review");
    }
    out
}

/// Step-by-step account of a replay.
#[must_use]
pub fn report_text(report: &ReplayReport) -> String {
    let mut out = String::new();
    if !report.name.is_empty() {
        let _ = writeln!(out, "scenario: {}", report.name);
    }
    for step in &report.steps {
        let _ = write!(out, "[{}] t={} ", step.index, step.at);
        match &step.outcome {
            StepOutcome::Results { results } if results.is_empty() => {
                let _ = writeln!(out, "nothing to do");
            }
            StepOutcome::Results { results } => {
                let _ = writeln!(out, "{} result(s)", results.len());
                for r in results {
                    write_result(&mut out, r);
                }
            }
            StepOutcome::Locked { lock } => {
                let _ = writeln!(
                    out,
                    "locked {} for {} until {}",
                    lock.document_path, lock.agent_id, lock.expires_at
                );
            }
            StepOutcome::LockFailed { error } => {
                let _ = writeln!(out, "lock refused: {error}");
            }
            StepOutcome::Released { released } => {
                let _ = writeln!(out, "release {}", if *released { "ok" } else { "stale" });
            }
            StepOutcome::Advanced => {
                let _ = writeln!(out, "clock advanced");
            }
            StepOutcome::Status { status } => {
                let _ = writeln!(
                    out,
                    "{}: {} queued, {} open conflict(s), lock {}",
                    status.document,
                    status.queued_operations.len(),
                    status.active_conflicts.len(),
                    status
                        .lock
                        .as_ref()
                        .map_or_else(|| "free".to_owned(), |l| format!("held by {}", l.agent_id))
                );
            }
        }
    }
    let _ = writeln!(out, "{} event(s)", report.events.len());
    let m = &report.metrics;
    let _ = writeln!(
        out,
        "metrics: {} submitted, {} direct, {} queued, {} pass(es), {} consolidated, {} failed, {} conflict(s)",
        m.submitted, m.applied_directly, m.queued, m.passes, m.consolidated, m.failed_passes, m.conflicts_detected
    );
    out
}

fn write_result(out: &mut String, r: &ConsolidationResult) {
    let status = match (&r.failure, r.accepted) {
        (None, _) => "ok",
        (Some(_), true) => "failed",
        (Some(_), false) => "refused",
    };
    let _ = write!(out, "    {status}");
    if let Some(id) = &r.operation_id {
        let _ = write!(out, " {id}");
    }
    if r.needs_consolidation {
        let _ = write!(out, " (coordinated");
        if r.estimated_wait_ms > 0 {
            let _ = write!(out, ", ~{}ms wait", r.estimated_wait_ms);
        }
        let _ = write!(out, ")");
    }
    let _ = writeln!(out, ": {} change(s)", r.final_changes.len());
    for rec in &r.resolutions {
        let _ = writeln!(
            out,
            "      {} {} -> {} ({})",
            rec.conflict.severity,
            rec.conflict.kind,
            rec.strategy,
            if rec.success { "resolved" } else { "unresolved" }
        );
    }
    if !r.deferred.is_empty() {
        let _ = writeln!(out, "      deferred: {}", r.deferred.len());
    }
    write_notes(out, &r.warnings, &r.errors);
}

fn write_notes(out: &mut String, warnings: &[String], errors: &[String]) {
    for w in warnings {
        let _ = writeln!(out, "      warning: {w}");
    }
    for e in errors {
        let _ = writeln!(out, "      error: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_formats() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("toon".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn json_render_ignores_text_renderer() {
        let out = OutputFormat::Json
            .render(&vec![1, 2], |_| unreachable!())
            .unwrap();
        assert!(out.contains('1'));
    }

    #[test]
    fn empty_conflicts_say_so() {
        assert_eq!(conflicts_text(&[]), "no conflicts\n");
    }
}
