//! Matcher library: compares an observed property value with an expectation.
//!
//! Matchers are plain functions looked up by [`MatcherKind`]. They only see
//! values, never the resource handle that produced them.

use hostspec_profile::{Expectation, MatcherKind, Value};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

/// Failure to apply a matcher (as opposed to a failing comparison).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatcherError {
    #[error("{matcher} cannot compare {actual} with {expected}")]
    TypeMismatch {
        matcher: MatcherKind,
        actual: &'static str,
        expected: &'static str,
    },

    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("no matcher registered for {0}")]
    Unsupported(MatcherKind),
}

/// Result of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    /// Human readable explanation, set for failures.
    pub diagnostic: Option<String>,
}

type MatchFn = fn(&Value, &Value) -> Result<bool, MatcherError>;

static MATCHERS: LazyLock<HashMap<MatcherKind, MatchFn>> = LazyLock::new(|| {
    let mut table: HashMap<MatcherKind, MatchFn> = HashMap::new();
    table.insert(MatcherKind::Equal, equal);
    table.insert(MatcherKind::Include, include);
    table.insert(MatcherKind::BeTrue, be_true);
    table.insert(MatcherKind::BeFalse, be_false);
    table.insert(MatcherKind::Match, match_pattern);
    table
});

/// Apply `expectation` to `actual`, honouring `should_not`.
pub fn evaluate(expectation: &Expectation, actual: &Value) -> Result<Verdict, MatcherError> {
    let matcher = MATCHERS
        .get(&expectation.matcher)
        .ok_or(MatcherError::Unsupported(expectation.matcher))?;

    let matched = matcher(actual, &expectation.expected)?;
    let passed = matched != expectation.negate;
    let diagnostic = (!passed).then(|| describe_failure(expectation, actual));
    Ok(Verdict { passed, diagnostic })
}

fn describe_failure(expectation: &Expectation, actual: &Value) -> String {
    let not = if expectation.negate { "not " } else { "" };
    match expectation.matcher {
        MatcherKind::BeTrue | MatcherKind::BeFalse => format!(
            "expected {} {}to be {}, got {}",
            expectation.property,
            not,
            expectation.matcher == MatcherKind::BeTrue,
            actual
        ),
        MatcherKind::Equal => format!(
            "expected {} {}to eq {}, got {}",
            expectation.property, not, expectation.expected, actual
        ),
        MatcherKind::Include => format!(
            "expected {} {}to include {}, got {}",
            expectation.property, not, expectation.expected, actual
        ),
        MatcherKind::Match => format!(
            "expected {} {}to match /{}/, got {}",
            expectation.property,
            not,
            expectation.expected.to_arg_string(),
            actual
        ),
    }
}

fn mismatch(matcher: MatcherKind, actual: &Value, expected: &Value) -> MatcherError {
    MatcherError::TypeMismatch {
        matcher,
        actual: actual.type_name(),
        expected: expected.type_name(),
    }
}

/// Structural equality where ints and floats compare numerically.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
        (Value::List(xs), Value::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        }
        _ => a == b,
    }
}

fn comparable(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Null, _)
            | (_, Value::Null)
            | (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_))
    ) || std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn equal(actual: &Value, expected: &Value) -> Result<bool, MatcherError> {
    if !comparable(actual, expected) {
        return Err(mismatch(MatcherKind::Equal, actual, expected));
    }
    Ok(same_value(actual, expected))
}

fn include(actual: &Value, expected: &Value) -> Result<bool, MatcherError> {
    match (actual, expected) {
        (Value::List(items), needle) => Ok(items.iter().any(|item| same_value(item, needle))),
        (Value::Text(haystack), Value::Text(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Null, _) => Ok(false),
        _ => Err(mismatch(MatcherKind::Include, actual, expected)),
    }
}

fn be_true(actual: &Value, expected: &Value) -> Result<bool, MatcherError> {
    actual
        .as_bool()
        .ok_or_else(|| mismatch(MatcherKind::BeTrue, actual, expected))
}

fn be_false(actual: &Value, expected: &Value) -> Result<bool, MatcherError> {
    actual
        .as_bool()
        .map(|b| !b)
        .ok_or_else(|| mismatch(MatcherKind::BeFalse, actual, expected))
}

fn match_pattern(actual: &Value, expected: &Value) -> Result<bool, MatcherError> {
    let Some(pattern) = expected.as_str() else {
        return Err(mismatch(MatcherKind::Match, actual, expected));
    };
    let regex = Regex::new(pattern).map_err(|e| MatcherError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    match actual {
        Value::Text(text) => Ok(regex.is_match(text)),
        Value::Null => Ok(false),
        _ => Err(mismatch(MatcherKind::Match, actual, expected)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn list(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn test_every_kind_has_a_matcher() {
        for kind in [
            MatcherKind::Equal,
            MatcherKind::Include,
            MatcherKind::BeTrue,
            MatcherKind::BeFalse,
            MatcherKind::Match,
        ] {
            assert!(MATCHERS.contains_key(&kind), "{}", kind);
        }
    }

    #[test]
    fn test_be_true_failure_diagnostic() {
        let verdict = evaluate(&Expectation::be("installed"), &Value::Bool(false)).unwrap();
        assert!(!verdict.passed);
        assert_eq!(
            verdict.diagnostic.as_deref(),
            Some("expected installed to be true, got false")
        );
    }

    #[test]
    fn test_negation() {
        let verdict =
            evaluate(&Expectation::be("running").negated(), &Value::Bool(false)).unwrap();
        assert!(verdict.passed);
        assert!(verdict.diagnostic.is_none());

        let verdict = evaluate(
            &Expectation::include("output", "root").negated(),
            &list(&["root", "postgres"]),
        )
        .unwrap();
        assert!(!verdict.passed);
        assert!(verdict.diagnostic.unwrap().contains("not to include"));
    }

    #[test]
    fn test_include_list_and_text() {
        let members = list(&["alice", "postgres"]);
        assert!(evaluate(&Expectation::include("output", "postgres"), &members).unwrap().passed);
        assert!(!evaluate(&Expectation::include("output", "bob"), &members).unwrap().passed);

        let text = Value::from("PostgreSQL 14.9 on x86_64");
        assert!(evaluate(&Expectation::include("stdout", "14.9"), &text).unwrap().passed);
        assert!(!evaluate(&Expectation::include("stdout", "x"), &Value::Null).unwrap().passed);
    }

    #[test]
    fn test_equal_numeric_and_null() {
        assert!(evaluate(&Expectation::eq("rows", 2i64), &Value::Float(2.0)).unwrap().passed);
        assert!(!evaluate(&Expectation::eq("version", "14.2"), &Value::Null).unwrap().passed);
        assert!(evaluate(&Expectation::eq("exit_status", 0i64), &Value::Int(0)).unwrap().passed);
    }

    #[test]
    fn test_type_mismatch() {
        let err = evaluate(&Expectation::eq("rows", "two"), &Value::Int(2)).unwrap_err();
        assert_eq!(
            err,
            MatcherError::TypeMismatch {
                matcher: MatcherKind::Equal,
                actual: "int",
                expected: "text",
            }
        );
        assert!(evaluate(&Expectation::be("installed"), &Value::from("yes")).is_err());
        assert!(evaluate(&Expectation::include("count", 1i64), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_match_pattern() {
        let version = Value::from("14.9");
        assert!(evaluate(&Expectation::matches("version", r"^14\."), &version).unwrap().passed);
        assert!(!evaluate(&Expectation::matches("version", r"^15\."), &version).unwrap().passed);

        let err = evaluate(&Expectation::matches("version", "(unclosed"), &version).unwrap_err();
        assert!(matches!(err, MatcherError::InvalidPattern { .. }));
    }

    #[test]
    fn test_be_false() {
        let expectation = Expectation::be_false("enabled");
        assert!(evaluate(&expectation, &Value::Bool(false)).unwrap().passed);
        let verdict = evaluate(&expectation, &Value::Bool(true)).unwrap();
        assert_eq!(
            verdict.diagnostic.as_deref(),
            Some("expected enabled to be false, got true")
        );
    }
}
