//! Evaluation engine for hostspec.
//!
//! Runs controls against a target through the provider registry, applies
//! matchers to the observed values, and turns the outcomes into a run
//! summary and a rendered report.

pub mod engine;
pub mod matchers;
pub mod report;
pub mod summary;

pub use engine::{Engine, EngineConfig, RunResults};
pub use matchers::{evaluate, MatcherError, Verdict};
pub use report::{render, ProfileInfo, ReportFormat, RunReport};
pub use summary::{summarize, FailingControl, OutcomeCounts, RunStatus, RunSummary};
