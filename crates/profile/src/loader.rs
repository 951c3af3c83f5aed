//! Profile loading: YAML/JSON text to an ordered control registry.

use crate::control::{Control, Expectation, ResourceRef};
use crate::impact::Impact;
use crate::registry::{ControlRegistry, RegistryError};
use crate::validation::validate_profile;
use crate::value::Value;
use hostspec_common::hash::sha256_str;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{info, warn};

/// `${NAME}` placeholders in string arguments.
static PLACEHOLDER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Errors raised while loading a profile. All of them are fatal: a profile
/// with a malformed or duplicate control is never evaluated.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to read profile {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse profile: {0}")]
    Parse(String),

    #[error("Profile is invalid:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),

    #[error("Invalid control {id}: {reason}")]
    InvalidControl { id: String, reason: String },

    #[error("Control {control} references undefined variable ${{{name}}}")]
    UnresolvedVariable { control: String, name: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Deserialize)]
struct ProfileDocument {
    name: String,
    title: Option<String>,
    version: Option<String>,
    controls: Vec<ControlDocument>,
}

#[derive(Debug, Deserialize)]
struct ControlDocument {
    id: String,
    title: Option<String>,
    desc: Option<String>,
    #[serde(default)]
    impact: Impact,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    refs: Vec<String>,
    #[serde(default)]
    describe: Vec<AssertionDocument>,
}

#[derive(Debug, Deserialize)]
struct AssertionDocument {
    resource: String,
    #[serde(default)]
    args: Vec<Value>,
    its: Option<String>,
    should: Option<String>,
    should_not: Option<String>,
    expected: Option<Value>,
}

/// A loaded profile.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub title: Option<String>,
    pub version: Option<String>,
    /// SHA256 of the profile text.
    pub digest: String,
    pub registry: ControlRegistry,
    pub warnings: Vec<String>,
}

impl Profile {
    /// Read and load a profile file.
    pub fn load(path: &Path, vars: &HashMap<String, String>) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let profile = Self::parse(&text, vars)?;
        info!(
            "Loaded profile {} from {} ({} controls)",
            profile.name,
            path.display(),
            profile.registry.len()
        );
        Ok(profile)
    }

    /// Load a profile from YAML or JSON text.
    pub fn parse(text: &str, vars: &HashMap<String, String>) -> Result<Self, ProfileError> {
        let raw: serde_json::Value =
            serde_yaml::from_str(text).map_err(|e| ProfileError::Parse(e.to_string()))?;

        let validation =
            validate_profile(&raw).map_err(|e| ProfileError::Parse(e.to_string()))?;
        if !validation.valid {
            return Err(ProfileError::Invalid(validation.error_messages()));
        }
        for warning in &validation.warnings {
            warn!("{}", warning);
        }

        let document: ProfileDocument =
            serde_json::from_value(raw).map_err(|e| ProfileError::Parse(e.to_string()))?;

        let mut registry = ControlRegistry::new();
        for control in document.controls {
            registry.define(build_control(control, vars)?)?;
        }

        Ok(Self {
            name: document.name,
            title: document.title,
            version: document.version,
            digest: sha256_str(text),
            registry,
            warnings: validation.warnings,
        })
    }
}

fn build_control(
    doc: ControlDocument,
    vars: &HashMap<String, String>,
) -> Result<Control, ProfileError> {
    let mut builder = Control::builder(doc.id.clone()).impact(doc.impact);
    if let Some(title) = doc.title {
        builder = builder.title(title);
    }
    if let Some(desc) = doc.desc {
        builder = builder.desc(desc);
    }
    for tag in doc.tags {
        builder = builder.tag(tag);
    }
    for reference in doc.refs {
        builder = builder.reference(reference);
    }

    for assertion in doc.describe {
        let (word, negate) = match (assertion.should, assertion.should_not) {
            (Some(word), None) => (word, false),
            (None, Some(word)) => (word, true),
            _ => {
                return Err(ProfileError::InvalidControl {
                    id: doc.id,
                    reason: "each assertion needs exactly one of should / should_not".to_string(),
                })
            }
        };

        let expected = assertion
            .expected
            .map(|v| substitute(v, vars, &doc.id))
            .transpose()?;
        let expectation =
            Expectation::from_clause(assertion.its.as_deref(), &word, expected, negate).map_err(
                |reason| ProfileError::InvalidControl {
                    id: doc.id.clone(),
                    reason,
                },
            )?;

        let args = assertion
            .args
            .into_iter()
            .map(|v| substitute(v, vars, &doc.id))
            .collect::<Result<Vec<_>, _>>()?;

        builder = builder.describe(
            ResourceRef {
                provider: assertion.resource,
                args,
            },
            expectation,
        );
    }

    builder.build()
}

/// Replace `${NAME}` placeholders inside text values.
fn substitute(
    value: Value,
    vars: &HashMap<String, String>,
    control: &str,
) -> Result<Value, ProfileError> {
    match value {
        Value::Text(text) => {
            if let Some(missing) = PLACEHOLDER_PATTERN
                .captures_iter(&text)
                .map(|caps| caps[1].to_string())
                .find(|name| !vars.contains_key(name))
            {
                return Err(ProfileError::UnresolvedVariable {
                    control: control.to_string(),
                    name: missing,
                });
            }
            let replaced = PLACEHOLDER_PATTERN.replace_all(&text, |caps: &regex::Captures| {
                vars.get(&caps[1]).cloned().unwrap_or_default()
            });
            Ok(Value::Text(replaced.into_owned()))
        }
        Value::List(items) => Ok(Value::List(
            items
                .into_iter()
                .map(|v| substitute(v, vars, control))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        other => Ok(other),
    }
}
