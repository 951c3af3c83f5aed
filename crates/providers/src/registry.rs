//! Provider registry: resource name to factory.

use crate::resource::{Resource, ResourceError, ResourceScope};
use crate::resources;
use async_trait::async_trait;
use hostspec_profile::{Control, ResourceRef, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Builds handles for one resource name.
#[async_trait]
pub trait ResourceFactory: Send + Sync {
    /// Construct a handle. Implementations validate `args` and may acquire
    /// sessions from `scope`; they must not query the target.
    async fn construct(
        &self,
        args: &[Value],
        scope: &mut ResourceScope,
    ) -> Result<Arc<dyn Resource>, ResourceError>;

    /// Positions of arguments that hold credentials.
    fn secret_args(&self) -> &'static [usize] {
        &[]
    }
}

/// Resolution failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("cannot construct {resource}: {source}")]
    Construction {
        resource: String,
        #[source]
        source: ResourceError,
    },
}

/// A control referencing a provider nobody registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightIssue {
    pub control: String,
    pub provider: String,
}

impl fmt::Display for PreflightIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "control {} uses unknown resource '{}'",
            self.control, self.provider
        )
    }
}

/// Maps resource names to factories. Pure bookkeeping; all target access
/// happens inside the handles it builds.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ResourceFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in resource.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("package", resources::package::PackageFactory);
        registry.register("processes", resources::processes::ProcessesFactory);
        registry.register("service", resources::service::ServiceFactory);
        registry.register("command", resources::command::CommandFactory);
        registry.register("postgres_session", resources::postgres::PostgresSessionFactory);
        registry
    }

    /// Register (or replace) the factory for `name`.
    pub fn register(&mut self, name: impl Into<String>, factory: impl ResourceFactory + 'static) {
        let name = name.into();
        debug!("Registered resource provider {}", name);
        self.factories.insert(name, Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Resolve a handle, reusing one already built in `scope` for the same
    /// construction key.
    pub async fn resolve(
        &self,
        resource: &ResourceRef,
        scope: &mut ResourceScope,
    ) -> Result<Arc<dyn Resource>, ResolveError> {
        let factory = self
            .factories
            .get(&resource.provider)
            .ok_or_else(|| ResolveError::UnknownResource(resource.provider.clone()))?;

        let key = resource.key();
        if let Some(handle) = scope.handle(&key) {
            return Ok(handle);
        }

        let handle = factory
            .construct(&resource.args, scope)
            .await
            .map_err(|source| ResolveError::Construction {
                resource: self.label(resource),
                source,
            })?;
        scope.insert_handle(key, Arc::clone(&handle));
        Ok(handle)
    }

    /// Display label with credential arguments masked.
    pub fn label(&self, resource: &ResourceRef) -> String {
        let secret = self
            .factories
            .get(&resource.provider)
            .map(|f| f.secret_args())
            .unwrap_or_default();
        let args: Vec<String> = resource
            .args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                if secret.contains(&i) {
                    hostspec_redaction::mask(&arg.to_arg_string())
                } else {
                    arg.to_string()
                }
            })
            .collect();
        format!("{}({})", resource.provider, args.join(", "))
    }

    /// Credential argument values used by `controls`, for the redactor.
    pub fn secret_values<'a, I>(&self, controls: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a Control>,
    {
        let mut secrets = Vec::new();
        for control in controls {
            for assertion in &control.assertions {
                let Some(factory) = self.factories.get(&assertion.resource.provider) else {
                    continue;
                };
                for &i in factory.secret_args() {
                    if let Some(value) = assertion.resource.args.get(i) {
                        let value = value.to_arg_string();
                        if !value.is_empty() && !secrets.contains(&value) {
                            secrets.push(value);
                        }
                    }
                }
            }
        }
        secrets
    }

    /// Unknown providers referenced by `controls`, in control order.
    pub fn preflight<'a, I>(&self, controls: I) -> Vec<PreflightIssue>
    where
        I: IntoIterator<Item = &'a Control>,
    {
        let mut issues = Vec::new();
        for control in controls {
            for provider in control.providers() {
                if !self.contains(provider) {
                    issues.push(PreflightIssue {
                        control: control.id.clone(),
                        provider: provider.to_string(),
                    });
                }
            }
        }
        issues
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CommandOutput, ScriptedExecutor};
    use hostspec_common::OsType;
    use hostspec_profile::Expectation;

    fn scope() -> ResourceScope {
        ResourceScope::new(Arc::new(
            ScriptedExecutor::new(OsType::Linux)
                .on("dpkg-query", CommandOutput::ok("install ok installed\t14.2\n")),
        ))
    }

    fn pg_ref(password: &str) -> ResourceRef {
        ResourceRef::new(
            "postgres_session",
            vec![
                Value::from("postgres"),
                Value::from(password),
                Value::from("localhost"),
                Value::from(5432u16),
                Value::from("SELECT 1;"),
            ],
        )
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let registry = ProviderRegistry::with_defaults();
        let err = registry
            .resolve(&ResourceRef::new("unknown_resource", ["x"]), &mut scope())
            .await
            .err()
            .unwrap();
        assert_eq!(err, ResolveError::UnknownResource("unknown_resource".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_memoises_by_key() {
        let registry = ProviderRegistry::with_defaults();
        let mut scope = scope();
        let resource = ResourceRef::new("package", ["postgresql-14"]);

        let a = registry.resolve(&resource, &mut scope).await.unwrap();
        let b = registry.resolve(&resource, &mut scope).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(scope.handle_count(), 1);

        registry
            .resolve(&ResourceRef::new("package", ["nginx"]), &mut scope)
            .await
            .unwrap();
        assert_eq!(scope.handle_count(), 2);
    }

    #[tokio::test]
    async fn test_construction_error_masks_secret() {
        let registry = ProviderRegistry::with_defaults();
        let bad = ResourceRef::new(
            "postgres_session",
            vec![Value::from("postgres"), Value::from("hunter2")],
        );
        let err = registry.resolve(&bad, &mut scope()).await.err().unwrap();
        match err {
            ResolveError::Construction { resource, .. } => {
                assert_eq!(resource, r#"postgres_session("postgres", ****)"#);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_label_and_secret_values() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(
            registry.label(&pg_ref("mysecretpassword")),
            r#"postgres_session("postgres", ****, "localhost", 5432, "SELECT 1;")"#
        );

        let control = Control::builder("c")
            .describe(pg_ref("mysecretpassword"), Expectation::include("output", "postgres"))
            .describe(pg_ref("mysecretpassword"), Expectation::eq("rows", 1i64))
            .build()
            .unwrap();
        assert_eq!(registry.secret_values([&control]), vec!["mysecretpassword"]);
    }

    #[test]
    fn test_preflight_lists_unknown_providers() {
        let registry = ProviderRegistry::with_defaults();
        let control = Control::builder("c")
            .describe(ResourceRef::new("package", ["x"]), Expectation::be("installed"))
            .describe(ResourceRef::new("unknown_resource", ["x"]), Expectation::be("ok"))
            .build()
            .unwrap();
        let issues = registry.preflight([&control]);
        assert_eq!(
            issues,
            vec![PreflightIssue {
                control: "c".to_string(),
                provider: "unknown_resource".to_string()
            }]
        );
        assert_eq!(issues[0].to_string(), "control c uses unknown resource 'unknown_resource'");
    }

    #[test]
    fn test_default_names() {
        assert_eq!(
            ProviderRegistry::with_defaults().names(),
            vec!["command", "package", "postgres_session", "processes", "service"]
        );
    }
}
