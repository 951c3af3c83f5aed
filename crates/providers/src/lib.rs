//! Resource providers: how `package`, `processes`, `postgres_session` and
//! friends are observed on a target.

pub mod commands;
pub mod executor;
pub mod parsers;
pub mod registry;
pub mod resource;
pub mod resources;
pub mod target;

pub use executor::{CommandOutput, Executor, LocalExecutor, ScriptedExecutor, SshExecutor};
pub use registry::{PreflightIssue, ProviderRegistry, ResolveError, ResourceFactory};
pub use resource::{Resource, ResourceError, ResourceScope};
pub use target::Target;
