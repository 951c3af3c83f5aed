//! Profile model for hostspec.
//!
//! This crate defines controls, their assertions and impact levels, the
//! outcomes an evaluation produces, and the loader that turns a YAML or
//! JSON profile into an ordered [`ControlRegistry`].

pub mod control;
pub mod impact;
pub mod loader;
pub mod outcome;
pub mod registry;
pub mod schema;
pub mod validation;
pub mod value;

pub use control::{Assertion, Control, ControlBuilder, Expectation, MatcherKind, ResourceRef};
pub use impact::Impact;
pub use loader::{Profile, ProfileError};
pub use outcome::{ControlResult, ControlSummary, Outcome, OutcomeCategory, OutcomeKind};
pub use registry::{ControlFilter, ControlRegistry, RegistryError};
pub use validation::{validate_profile, ValidationResult};
pub use value::Value;
