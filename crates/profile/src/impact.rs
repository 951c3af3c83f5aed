//! Control impact levels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a control. Ordered so that `Critical` is the greatest.
///
/// Profiles may give either a level name or a score in `0.0..=1.0`; scores
/// are bucketed with the usual compliance-tooling boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "ImpactRepr")]
pub enum Impact {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// Every level, lowest first.
pub const ALL_IMPACTS: [Impact; 5] = [
    Impact::None,
    Impact::Low,
    Impact::Medium,
    Impact::High,
    Impact::Critical,
];

impl Impact {
    /// Bucket a numeric score.
    pub fn from_score(score: f64) -> Result<Self, String> {
        if !(0.0..=1.0).contains(&score) {
            return Err(format!("impact score {} is outside 0.0..=1.0", score));
        }
        Ok(if score == 0.0 {
            Impact::None
        } else if score < 0.4 {
            Impact::Low
        } else if score < 0.7 {
            Impact::Medium
        } else if score < 0.9 {
            Impact::High
        } else {
            Impact::Critical
        })
    }

    /// Canonical score of the level.
    pub fn score(&self) -> f64 {
        match self {
            Impact::None => 0.0,
            Impact::Low => 0.1,
            Impact::Medium => 0.4,
            Impact::High => 0.7,
            Impact::Critical => 0.9,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::None => "none",
            Impact::Low => "low",
            Impact::Medium => "medium",
            Impact::High => "high",
            Impact::Critical => "critical",
        }
    }
}

impl Default for Impact {
    fn default() -> Self {
        Impact::Medium
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Impact {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Impact::None),
            "low" => Ok(Impact::Low),
            "medium" => Ok(Impact::Medium),
            "high" => Ok(Impact::High),
            "critical" => Ok(Impact::Critical),
            other => match other.parse::<f64>() {
                Ok(score) => Impact::from_score(score),
                Err(_) => Err(format!("unknown impact level: {}", s)),
            },
        }
    }
}

/// Wire representation accepted in profiles.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImpactRepr {
    Score(f64),
    Name(String),
}

impl TryFrom<ImpactRepr> for Impact {
    type Error = String;

    fn try_from(repr: ImpactRepr) -> Result<Self, Self::Error> {
        match repr {
            ImpactRepr::Score(score) => Impact::from_score(score),
            ImpactRepr::Name(name) => name.parse(),
        }
    }
}
