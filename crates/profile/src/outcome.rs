//! Evaluation outcomes.

use crate::control::{Control, MatcherKind};
use crate::impact::Impact;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result kind of one assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Pass,
    Fail,
    Error,
    Skipped,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Pass => "pass",
            OutcomeKind::Fail => "fail",
            OutcomeKind::Error => "error",
            OutcomeKind::Skipped => "skipped",
        }
    }

    /// Fail or Error.
    pub fn is_failure(&self) -> bool {
        matches!(self, OutcomeKind::Fail | OutcomeKind::Error)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an outcome is an error or was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCategory {
    UnknownResource,
    Construction,
    PropertyNotFound,
    Matcher,
    Query,
    Timeout,
    Cancelled,
    NoAssertions,
}

/// Recorded result of evaluating one assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Position of the assertion in its control; `None` for control-level
    /// skips (no assertions, cancelled before start).
    pub assertion_index: Option<usize>,
    pub kind: OutcomeKind,
    /// Display label of the resource, secrets masked.
    pub resource: String,
    pub property: Option<String>,
    pub matcher: Option<MatcherKind>,
    #[serde(default)]
    pub negate: bool,
    pub expected: Option<Value>,
    pub actual: Option<Value>,
    pub message: Option<String>,
    pub category: Option<OutcomeCategory>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl Outcome {
    fn base(index: Option<usize>, kind: OutcomeKind, resource: impl Into<String>) -> Self {
        Self {
            assertion_index: index,
            kind,
            resource: resource.into(),
            property: None,
            matcher: None,
            negate: false,
            expected: None,
            actual: None,
            message: None,
            category: None,
            duration_ms: 0,
        }
    }

    /// Matcher verdict with both values captured.
    #[allow(clippy::too_many_arguments)]
    pub fn verdict(
        index: usize,
        passed: bool,
        resource: impl Into<String>,
        property: impl Into<String>,
        matcher: MatcherKind,
        negate: bool,
        expected: Value,
        actual: Value,
        message: Option<String>,
    ) -> Self {
        let kind = if passed {
            OutcomeKind::Pass
        } else {
            OutcomeKind::Fail
        };
        Self {
            property: Some(property.into()),
            matcher: Some(matcher),
            negate,
            expected: Some(expected),
            actual: Some(actual),
            message,
            ..Self::base(Some(index), kind, resource)
        }
    }

    pub fn error(
        index: usize,
        resource: impl Into<String>,
        category: OutcomeCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: Some(message.into()),
            category: Some(category),
            ..Self::base(Some(index), OutcomeKind::Error, resource)
        }
    }

    pub fn skipped(
        index: Option<usize>,
        resource: impl Into<String>,
        category: OutcomeCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: Some(message.into()),
            category: Some(category),
            ..Self::base(index, OutcomeKind::Skipped, resource)
        }
    }

    /// Attach the expectation being checked (used on error outcomes).
    pub fn with_expectation(
        mut self,
        property: impl Into<String>,
        matcher: MatcherKind,
        expected: Value,
    ) -> Self {
        self.property = Some(property.into());
        self.matcher = Some(matcher);
        self.expected = Some(expected);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Serializable projection of a control for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSummary {
    pub id: String,
    pub title: Option<String>,
    pub impact: Impact,
    #[serde(default)]
    pub tags: Vec<String>,
    pub assertions: usize,
}

impl From<&Control> for ControlSummary {
    fn from(control: &Control) -> Self {
        Self {
            id: control.id.clone(),
            title: control.title.clone(),
            impact: control.impact,
            tags: control.tags.clone(),
            assertions: control.assertions.len(),
        }
    }
}

/// All outcomes of one control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResult {
    pub control: ControlSummary,
    pub status: OutcomeKind,
    pub outcomes: Vec<Outcome>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ControlResult {
    pub fn new(control: &Control, outcomes: Vec<Outcome>, duration_ms: u64) -> Self {
        Self {
            control: ControlSummary::from(control),
            status: Self::status_of(&outcomes),
            outcomes,
            duration_ms,
        }
    }

    /// Error beats Fail beats Pass; all-skipped (or empty) is Skipped.
    pub fn status_of(outcomes: &[Outcome]) -> OutcomeKind {
        let has = |kind: OutcomeKind| outcomes.iter().any(|o| o.kind == kind);
        if has(OutcomeKind::Error) {
            OutcomeKind::Error
        } else if has(OutcomeKind::Fail) {
            OutcomeKind::Fail
        } else if has(OutcomeKind::Pass) {
            OutcomeKind::Pass
        } else {
            OutcomeKind::Skipped
        }
    }

    pub fn id(&self) -> &str {
        &self.control.id
    }

    pub fn impact(&self) -> Impact {
        self.control.impact
    }

    /// Outcomes that are Fail or Error.
    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.kind.is_failure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(i: usize) -> Outcome {
        Outcome::verdict(
            i,
            true,
            "package(\"x\")",
            "installed",
            MatcherKind::BeTrue,
            false,
            Value::Bool(true),
            Value::Bool(true),
            None,
        )
    }

    #[test]
    fn test_status_precedence() {
        let err = Outcome::error(1, "r", OutcomeCategory::Query, "boom");
        let fail = Outcome::verdict(
            2,
            false,
            "r",
            "p",
            MatcherKind::Equal,
            false,
            Value::Int(1),
            Value::Int(2),
            None,
        );
        assert_eq!(ControlResult::status_of(&[pass(0)]), OutcomeKind::Pass);
        assert_eq!(
            ControlResult::status_of(&[pass(0), fail.clone()]),
            OutcomeKind::Fail
        );
        assert_eq!(
            ControlResult::status_of(&[fail, err, pass(0)]),
            OutcomeKind::Error
        );
        assert_eq!(ControlResult::status_of(&[]), OutcomeKind::Skipped);
    }

    #[test]
    fn test_pass_with_skip_is_pass() {
        let skip = Outcome::skipped(Some(1), "r", OutcomeCategory::Cancelled, "cancelled");
        assert_eq!(ControlResult::status_of(&[pass(0), skip]), OutcomeKind::Pass);
    }

    #[test]
    fn test_outcome_serialization_shape() {
        let json = serde_json::to_value(pass(0)).unwrap();
        assert_eq!(json["kind"], "pass");
        assert_eq!(json["matcher"], "be_true");
        assert_eq!(json["actual"], true);
    }
}
