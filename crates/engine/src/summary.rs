//! Run summary: outcome counts and the pass/fail decision.

use hostspec_profile::{ControlResult, Impact, Outcome, OutcomeCategory, OutcomeKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit code of a run whose failures reach the threshold.
pub const FAILED_EXIT_CODE: i32 = 100;

/// Outcome counts by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
}

impl OutcomeCounts {
    pub fn add(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Pass => self.passed += 1,
            OutcomeKind::Fail => self.failed += 1,
            OutcomeKind::Error => self.errors += 1,
            OutcomeKind::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errors + self.skipped
    }
}

/// Counts for one impact level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactCounts {
    pub impact: Impact,
    pub counts: OutcomeCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Passed => write!(f, "passed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A control with at least one Fail or Error outcome, or one the run was
/// cancelled before completing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailingControl {
    pub id: String,
    pub title: Option<String>,
    pub impact: Impact,
    pub status: OutcomeKind,
    /// One line per failing outcome.
    pub diagnostics: Vec<String>,
    /// Impact reaches the threshold, so this control fails the run.
    pub blocking: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub threshold: Impact,
    pub status: RunStatus,
    /// Outcome counts over every control.
    pub outcomes: OutcomeCounts,
    /// Outcome counts per impact level, lowest first; levels without
    /// controls are omitted.
    pub by_impact: Vec<ImpactCounts>,
    /// Control counts by control status.
    pub controls: OutcomeCounts,
    pub failing: Vec<FailingControl>,
    pub highest_failing_impact: Option<Impact>,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Passed => 0,
            RunStatus::Failed => FAILED_EXIT_CODE,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == RunStatus::Passed
    }

    /// Ids of the controls that fail the run.
    pub fn blocking_ids(&self) -> Vec<&str> {
        self.failing
            .iter()
            .filter(|f| f.blocking)
            .map(|f| f.id.as_str())
            .collect()
    }
}

/// Summarise results. The run fails when a control at or above `threshold`
/// has a Fail or Error outcome or was cancelled before it completed;
/// `Impact::None` makes every failure count.
pub fn summarize(results: &[ControlResult], threshold: Impact) -> RunSummary {
    let mut outcomes = OutcomeCounts::default();
    let mut controls = OutcomeCounts::default();
    let mut by_impact: Vec<ImpactCounts> = Vec::new();
    let mut failing = Vec::new();

    for result in results {
        controls.add(result.status);

        let slot = match by_impact.iter().position(|c| c.impact == result.impact()) {
            Some(i) => i,
            None => {
                by_impact.push(ImpactCounts {
                    impact: result.impact(),
                    counts: OutcomeCounts::default(),
                });
                by_impact.len() - 1
            }
        };
        for outcome in &result.outcomes {
            outcomes.add(outcome.kind);
            by_impact[slot].counts.add(outcome.kind);
        }

        let diagnostics: Vec<String> = result
            .outcomes
            .iter()
            .filter(|o| o.kind.is_failure() || is_cancelled(o))
            .map(diagnostic_line)
            .collect();
        if !diagnostics.is_empty() {
            failing.push(FailingControl {
                id: result.id().to_string(),
                title: result.control.title.clone(),
                impact: result.impact(),
                status: result.status,
                diagnostics,
                blocking: result.impact() >= threshold,
            });
        }
    }

    by_impact.sort_by_key(|c| c.impact);
    let highest_failing_impact = failing.iter().map(|f| f.impact).max();
    let status = if failing.iter().any(|f| f.blocking) {
        RunStatus::Failed
    } else {
        RunStatus::Passed
    };

    RunSummary {
        threshold,
        status,
        outcomes,
        by_impact,
        controls,
        failing,
        highest_failing_impact,
    }
}

fn is_cancelled(outcome: &Outcome) -> bool {
    outcome.category == Some(OutcomeCategory::Cancelled)
}

fn diagnostic_line(outcome: &Outcome) -> String {
    if is_cancelled(outcome) {
        let reason = outcome.message.as_deref().unwrap_or("run cancelled");
        return format!("not evaluated: {}", reason);
    }
    let mut line = outcome.resource.clone();
    if let Some(property) = &outcome.property {
        line.push_str(&format!(" {}", property));
    }
    if let Some(message) = &outcome.message {
        line.push_str(&format!(": {}", message));
    }
    if outcome.kind == OutcomeKind::Error {
        line.push_str(" [error]");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostspec_profile::{Control, Expectation, MatcherKind, ResourceRef, Value};
    use pretty_assertions::assert_eq;

    fn control(id: &str, impact: Impact) -> Control {
        Control::builder(id)
            .title(format!("Control {}", id))
            .impact(impact)
            .describe(ResourceRef::new("package", [id]), Expectation::be("installed"))
            .build()
            .unwrap()
    }

    fn result(id: &str, impact: Impact, passed: bool) -> ControlResult {
        let outcome = Outcome::verdict(
            0,
            passed,
            format!("package(\"{}\")", id),
            "installed",
            MatcherKind::BeTrue,
            false,
            Value::Bool(true),
            Value::Bool(passed),
            (!passed).then(|| "expected installed to be true, got false".to_string()),
        );
        ControlResult::new(&control(id, impact), vec![outcome], 1)
    }

    #[test]
    fn test_one_critical_failure_fails_run() {
        let results = vec![
            result("a", Impact::Critical, true),
            result("b", Impact::Critical, true),
            result("c", Impact::Critical, false),
        ];
        let summary = summarize(&results, Impact::None);
        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.exit_code(), FAILED_EXIT_CODE);
        assert_eq!(summary.blocking_ids(), vec!["c"]);
        assert_eq!(
            summary.failing[0].diagnostics,
            vec!["package(\"c\") installed: expected installed to be true, got false"]
        );
        assert_eq!(summary.outcomes.passed, 2);
        assert_eq!(summary.outcomes.failed, 1);
        assert_eq!(summary.highest_failing_impact, Some(Impact::Critical));
    }

    #[test]
    fn test_threshold_ignores_low_impact_failures() {
        let results = vec![
            result("a", Impact::Low, false),
            result("b", Impact::Critical, true),
        ];
        let summary = summarize(&results, Impact::High);
        assert_eq!(summary.status, RunStatus::Passed);
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.failing.len(), 1);
        assert!(!summary.failing[0].blocking);

        let strict = summarize(&results, Impact::None);
        assert_eq!(strict.status, RunStatus::Failed);
    }

    #[test]
    fn test_counts_grouped_by_impact() {
        let error = Outcome::error(
            0,
            "unknown_resource(\"x\")",
            OutcomeCategory::UnknownResource,
            "unknown resource 'unknown_resource'",
        );
        let results = vec![
            result("a", Impact::Critical, true),
            result("b", Impact::Low, false),
            ControlResult::new(&control("c", Impact::Critical), vec![error], 0),
        ];
        let summary = summarize(&results, Impact::None);
        let impacts: Vec<Impact> = summary.by_impact.iter().map(|c| c.impact).collect();
        assert_eq!(impacts, vec![Impact::Low, Impact::Critical]);
        assert_eq!(summary.by_impact[1].counts.passed, 1);
        assert_eq!(summary.by_impact[1].counts.errors, 1);
        assert_eq!(summary.controls.errors, 1);
        assert!(summary.failing[1].diagnostics[0].ends_with("[error]"));
    }

    fn cancelled(id: &str, impact: Impact) -> ControlResult {
        let outcome = Outcome::skipped(
            None,
            "",
            OutcomeCategory::Cancelled,
            "run cancelled before the control completed",
        );
        ControlResult::new(&control(id, impact), vec![outcome], 0)
    }

    #[test]
    fn test_cancelled_control_fails_run() {
        let results = vec![cancelled("a", Impact::Critical)];
        let summary = summarize(&results, Impact::None);
        assert_eq!(summary.controls.skipped, 1);
        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.exit_code(), FAILED_EXIT_CODE);
        assert_eq!(summary.blocking_ids(), vec!["a"]);
        assert_eq!(
            summary.failing[0].diagnostics,
            vec!["not evaluated: run cancelled before the control completed"]
        );
    }

    #[test]
    fn test_cancelled_below_threshold_does_not_block() {
        let results = vec![
            result("a", Impact::Critical, true),
            cancelled("b", Impact::Low),
        ];
        let summary = summarize(&results, Impact::High);
        assert!(summary.passed());
        assert!(!summary.failing[0].blocking);
    }

    #[test]
    fn test_skipped_without_assertions_passes() {
        let outcome = Outcome::skipped(
            None,
            "",
            OutcomeCategory::NoAssertions,
            "control has no assertions",
        );
        let results = vec![ControlResult::new(&control("a", Impact::High), vec![outcome], 0)];
        let summary = summarize(&results, Impact::None);
        assert!(summary.passed());
        assert!(summary.failing.is_empty());
    }

    #[test]
    fn test_empty_run_passes() {
        let summary = summarize(&[], Impact::None);
        assert!(summary.passed());
        assert_eq!(summary.outcomes.total(), 0);
    }
}
