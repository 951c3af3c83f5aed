//! Report rendering.

use crate::summary::{RunStatus, RunSummary};
use hostspec_common::Timestamp;
use hostspec_profile::{ControlResult, Outcome, OutcomeKind};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::str::FromStr;
use uuid::Uuid;

/// Profile identity recorded in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub name: String,
    pub digest: String,
}

/// Everything about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub profile: ProfileInfo,
    pub target: String,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub duration_ms: u64,
    #[serde(default)]
    pub cancelled: bool,
    pub results: Vec<ControlResult>,
    pub summary: RunSummary,
}

impl RunReport {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profile: ProfileInfo,
        target: impl Into<String>,
        started_at: Timestamp,
        finished_at: Timestamp,
        cancelled: bool,
        results: Vec<ControlResult>,
        summary: RunSummary,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            profile,
            target: target.into(),
            started_at,
            finished_at,
            duration_ms: finished_at.millis_since(started_at),
            cancelled,
            results,
            summary,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            _ => Err(format!("unknown report format: {}", s)),
        }
    }
}

/// Render a report. Output depends only on the report.
pub fn render(report: &RunReport, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Json => serde_json::to_string_pretty(report),
        ReportFormat::Text => Ok(render_text(report)),
    }
}

fn glyph(kind: OutcomeKind) -> &'static str {
    match kind {
        OutcomeKind::Pass => "[PASS]",
        OutcomeKind::Fail => "[FAIL]",
        OutcomeKind::Error => "[ERR ]",
        OutcomeKind::Skipped => "[SKIP]",
    }
}

fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_text(&mut out, report);
    out
}

fn write_text(out: &mut String, report: &RunReport) -> std::fmt::Result {
    writeln!(out, "=== Hostspec Report: {} ===", report.profile.name)?;
    writeln!(out, "Target:   {}", report.target)?;
    writeln!(out, "Run:      {}", report.run_id)?;
    writeln!(out, "Started:  {}", report.started_at.to_iso8601())?;
    writeln!(out, "Duration: {}ms", report.duration_ms)?;
    if report.cancelled {
        writeln!(out, "Run was cancelled; unfinished controls are skipped.")?;
    }
    writeln!(out)?;

    for result in &report.results {
        write_control(out, result)?;
    }

    write_summary(out, &report.summary)
}

fn write_control(out: &mut String, result: &ControlResult) -> std::fmt::Result {
    let title = result.control.title.as_deref().unwrap_or_default();
    writeln!(
        out,
        "{} {} ({}) {}",
        glyph(result.status),
        result.id(),
        result.impact(),
        title
    )?;
    for outcome in &result.outcomes {
        writeln!(out, "    {} {}", glyph(outcome.kind), outcome_line(outcome))?;
        if outcome.kind != OutcomeKind::Pass {
            if let Some(message) = &outcome.message {
                writeln!(out, "           {}", message)?;
            }
        }
    }
    Ok(())
}

fn outcome_line(outcome: &Outcome) -> String {
    let mut line = outcome.resource.clone();
    if let (Some(property), Some(matcher)) = (&outcome.property, outcome.matcher) {
        let should = if outcome.negate { "should_not" } else { "should" };
        write!(line, " {} {} {}", property, should, matcher).ok();
        if matcher.takes_expected() {
            if let Some(expected) = &outcome.expected {
                write!(line, " {}", expected).ok();
            }
        }
    }
    if let Some(category) = outcome.category {
        let category = serde_json::to_value(category)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        write!(line, " ({})", category).ok();
    }
    line.trim().to_string()
}

fn write_summary(out: &mut String, summary: &RunSummary) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(out, "Summary:")?;
    writeln!(out, "{:-<60}", "")?;
    writeln!(
        out,
        "{:<12} {:>10} {:>10} {:>10} {:>10}",
        "Impact", "Passed", "Failed", "Errors", "Skipped"
    )?;
    writeln!(out, "{:-<60}", "")?;
    for row in summary.by_impact.iter().rev() {
        writeln!(
            out,
            "{:<12} {:>10} {:>10} {:>10} {:>10}",
            row.impact.to_string(),
            row.counts.passed,
            row.counts.failed,
            row.counts.errors,
            row.counts.skipped
        )?;
    }
    writeln!(out, "{:-<60}", "")?;
    writeln!(
        out,
        "{:<12} {:>10} {:>10} {:>10} {:>10}",
        "Total",
        summary.outcomes.passed,
        summary.outcomes.failed,
        summary.outcomes.errors,
        summary.outcomes.skipped
    )?;

    let blocking: Vec<_> = summary.failing.iter().filter(|f| f.blocking).collect();
    if !blocking.is_empty() {
        writeln!(out, "\nFailures:")?;
        for failing in blocking {
            writeln!(out, "\n  {} ({}):", failing.id, failing.impact)?;
            for diagnostic in &failing.diagnostics {
                writeln!(out, "    - {}", diagnostic)?;
            }
        }
    }

    let verdict = match summary.status {
        RunStatus::Passed => "PASSED",
        RunStatus::Failed => "FAILED",
    };
    writeln!(
        out,
        "\nResult: {} ({} controls, threshold {})",
        verdict,
        summary.controls.total(),
        summary.threshold
    )
}
