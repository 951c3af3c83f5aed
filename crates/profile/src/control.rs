//! Controls and their assertions.

use crate::impact::Impact;
use crate::loader::ProfileError;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference to a resource: provider name plus constructor arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub provider: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl ResourceRef {
    pub fn new<I, V>(provider: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            provider: provider.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Canonical construction key, e.g. `package("postgresql-14")`.
    ///
    /// Arguments appear verbatim; use a provider-aware label for anything
    /// that ends up in a report.
    pub fn key(&self) -> String {
        let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        format!("{}({})", self.provider, args.join(", "))
    }
}

/// How an observed property is compared with the expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    /// Exact equality.
    Equal,
    /// Element membership for lists, substring for text.
    Include,
    /// Property is boolean `true`.
    BeTrue,
    /// Property is boolean `false`.
    BeFalse,
    /// Text matches a regular expression.
    Match,
}

impl MatcherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatcherKind::Equal => "eq",
            MatcherKind::Include => "include",
            MatcherKind::BeTrue => "be_true",
            MatcherKind::BeFalse => "be_false",
            MatcherKind::Match => "match",
        }
    }

    /// Whether the matcher compares against an explicit expected value.
    pub fn takes_expected(&self) -> bool {
        matches!(
            self,
            MatcherKind::Equal | MatcherKind::Include | MatcherKind::Match
        )
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatcherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" | "equal" | "cmp" => Ok(MatcherKind::Equal),
            "include" => Ok(MatcherKind::Include),
            "be_true" => Ok(MatcherKind::BeTrue),
            "be_false" => Ok(MatcherKind::BeFalse),
            "match" => Ok(MatcherKind::Match),
            _ => Err(format!("unknown matcher: {}", s)),
        }
    }
}

/// Property name, matcher and expected value of one assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    pub property: String,
    pub matcher: MatcherKind,
    pub expected: Value,
    /// `should_not`: invert the verdict.
    #[serde(default)]
    pub negate: bool,
}

impl Expectation {
    pub fn new(property: impl Into<String>, matcher: MatcherKind, expected: Value) -> Self {
        Self {
            property: property.into(),
            matcher,
            expected,
            negate: false,
        }
    }

    /// `its(property) { should eq expected }`
    pub fn eq(property: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self::new(property, MatcherKind::Equal, expected.into())
    }

    /// `its(property) { should include expected }`
    pub fn include(property: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self::new(property, MatcherKind::Include, expected.into())
    }

    /// `its(property) { should match /pattern/ }`
    pub fn matches(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(property, MatcherKind::Match, Value::Text(pattern.into()))
    }

    /// `should be_<property>`
    pub fn be(property: impl Into<String>) -> Self {
        Self::new(property, MatcherKind::BeTrue, Value::Bool(true))
    }

    /// Property must be `false`.
    pub fn be_false(property: impl Into<String>) -> Self {
        Self::new(property, MatcherKind::BeFalse, Value::Bool(false))
    }

    /// Turn `should` into `should_not`.
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Parse the matcher word of a `should`/`should_not` clause.
    ///
    /// `be_<property>` words that are not a known matcher name their own
    /// property: `be_installed` reads `installed` and expects `true`.
    pub fn from_clause(
        its: Option<&str>,
        word: &str,
        expected: Option<Value>,
        negate: bool,
    ) -> Result<Self, String> {
        let (property, matcher) = match (word.parse::<MatcherKind>(), its) {
            (Ok(kind), Some(property)) => (property.to_string(), kind),
            (Ok(kind), None) => {
                return Err(format!("matcher '{}' needs an `its` property", kind));
            }
            (Err(_), None) if word.len() > 3 && word.starts_with("be_") => {
                (word["be_".len()..].to_string(), MatcherKind::BeTrue)
            }
            (Err(_), Some(_)) if word.starts_with("be_") => {
                return Err(format!(
                    "'{}' names its own property and cannot be combined with `its`",
                    word
                ));
            }
            (Err(e), _) => return Err(e),
        };

        let expected = if matcher.takes_expected() {
            expected.ok_or_else(|| format!("matcher '{}' needs an expected value", matcher))?
        } else if expected.is_some() {
            return Err(format!("matcher '{}' takes no expected value", matcher));
        } else {
            Value::Bool(matcher == MatcherKind::BeTrue)
        };

        Ok(Self {
            property,
            matcher,
            expected,
            negate,
        })
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.negate { "should_not" } else { "should" };
        if self.matcher.takes_expected() {
            write!(f, "{} {} {} {}", self.property, verb, self.matcher, self.expected)
        } else {
            write!(f, "{} {} {}", self.property, verb, self.matcher)
        }
    }
}

/// One resource query plus the expectation applied to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub resource: ResourceRef,
    pub expectation: Expectation,
}

/// A named compliance check.
///
/// Controls are built once through [`ControlBuilder`] and shared behind
/// `Arc` by the registry; nothing mutates them afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub impact: Impact,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub refs: Vec<String>,
    pub assertions: Vec<Assertion>,
}

impl Control {
    pub fn builder(id: impl Into<String>) -> ControlBuilder {
        ControlBuilder::new(id)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Distinct provider names referenced by the control, in order.
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for assertion in &self.assertions {
            let name = assertion.resource.provider.as_str();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// Builder for [`Control`].
#[derive(Debug, Clone)]
pub struct ControlBuilder {
    control: Control,
}

impl ControlBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            control: Control {
                id: id.into(),
                title: None,
                description: None,
                impact: Impact::default(),
                tags: Vec::new(),
                refs: Vec::new(),
                assertions: Vec::new(),
            },
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.control.title = Some(title.into());
        self
    }

    pub fn desc(mut self, description: impl Into<String>) -> Self {
        self.control.description = Some(description.into());
        self
    }

    pub fn impact(mut self, impact: Impact) -> Self {
        self.control.impact = impact;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.control.tags.push(tag.into());
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.control.refs.push(reference.into());
        self
    }

    /// `describe resource do it { expectation } end`
    pub fn describe(mut self, resource: ResourceRef, expectation: Expectation) -> Self {
        self.control.assertions.push(Assertion {
            resource,
            expectation,
        });
        self
    }

    pub fn build(self) -> Result<Control, ProfileError> {
        let control = self.control;
        let invalid = |reason: &str| ProfileError::InvalidControl {
            id: control.id.clone(),
            reason: reason.to_string(),
        };

        if control.id.trim().is_empty() {
            return Err(invalid("control id must not be empty"));
        }
        if control.id.chars().any(char::is_whitespace) {
            return Err(invalid("control id must not contain whitespace"));
        }
        if let Some(a) = control
            .assertions
            .iter()
            .find(|a| a.resource.provider.trim().is_empty())
        {
            return Err(invalid(&format!(
                "assertion on '{}' has an empty resource name",
                a.expectation.property
            )));
        }
        if control
            .assertions
            .iter()
            .any(|a| a.expectation.property.trim().is_empty())
        {
            return Err(invalid("assertion property must not be empty"));
        }

        Ok(control)
    }
}
