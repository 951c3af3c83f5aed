//! Profile validation utilities.

use crate::control::{Expectation, MatcherKind};
use crate::schema;
use crate::value::Value;
use jsonschema::JSONSchema;
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

/// Validation error type.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Schema validation failed: {0}")]
    SchemaError(String),

    #[error("Duplicate control id: {0}")]
    DuplicateControl(String),

    #[error("Control {control}, assertion {index}: {reason}")]
    InvalidAssertion {
        control: String,
        index: usize,
        reason: String,
    },

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result of profile validation.
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Error messages, for callers that only report.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a profile document against the JSON schema and the rules the
/// schema cannot express (unique ids, known matchers, compilable patterns).
pub fn validate_profile(profile: &serde_json::Value) -> Result<ValidationResult, ValidationError> {
    let mut result = ValidationResult::new();

    let schema_value = schema::profile_schema();
    let compiled = JSONSchema::compile(&schema_value)
        .map_err(|e| ValidationError::SchemaError(e.to_string()))?;

    if let Err(errors) = compiled.validate(profile) {
        for error in errors {
            result.add_error(ValidationError::SchemaError(format!(
                "{} at {}",
                error, error.instance_path
            )));
        }
    }

    let Some(controls) = profile.get("controls").and_then(|c| c.as_array()) else {
        return Ok(result);
    };

    if controls.is_empty() {
        result.add_warning("Profile defines no controls".to_string());
    }

    let mut seen = HashSet::new();
    for control in controls {
        let Some(id) = control.get("id").and_then(|i| i.as_str()) else {
            continue;
        };
        if !seen.insert(id.to_string()) {
            result.add_error(ValidationError::DuplicateControl(id.to_string()));
        }

        if control.get("title").and_then(|t| t.as_str()).is_none() {
            result.add_warning(format!("Control {} has no title", id));
        }

        let assertions = control
            .get("describe")
            .and_then(|d| d.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();
        if assertions.is_empty() {
            result.add_warning(format!(
                "Control {} has no assertions and will be reported as skipped",
                id
            ));
        }

        for (index, assertion) in assertions.iter().enumerate() {
            if let Err(reason) = check_assertion(assertion) {
                result.add_error(ValidationError::InvalidAssertion {
                    control: id.to_string(),
                    index,
                    reason,
                });
            }
        }
    }

    Ok(result)
}

fn check_assertion(assertion: &serde_json::Value) -> Result<(), String> {
    let its = assertion.get("its").and_then(|v| v.as_str());
    let (word, negate) = match (
        assertion.get("should").and_then(|v| v.as_str()),
        assertion.get("should_not").and_then(|v| v.as_str()),
    ) {
        (Some(word), None) => (word, false),
        (None, Some(word)) => (word, true),
        // Shape errors are already reported by the schema.
        _ => return Ok(()),
    };
    let expected = match assertion.get("expected") {
        Some(raw) => Some(serde_json::from_value::<Value>(raw.clone()).map_err(|e| e.to_string())?),
        None => None,
    };

    let expectation = Expectation::from_clause(its, word, expected, negate)?;
    if expectation.matcher == MatcherKind::Match {
        let pattern = expectation
            .expected
            .as_str()
            .ok_or_else(|| "match expects a text pattern".to_string())?;
        Regex::new(pattern).map_err(|e| format!("invalid pattern: {}", e))?;
    }
    Ok(())
}
