//! `service(name)`: installed, running and enabled state.

use crate::commands::command_set;
use crate::executor::Executor;
use crate::parsers::{parse_systemctl_show, parse_windows_service, ServiceState};
use crate::registry::ResourceFactory;
use crate::resource::{Resource, ResourceError, ResourceScope};
use crate::resources::{expect_arity, text_arg};
use async_trait::async_trait;
use hostspec_common::OsType;
use hostspec_profile::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

const PROPERTIES: &[&str] = &["installed", "running", "enabled"];

pub struct ServiceFactory;

#[async_trait]
impl ResourceFactory for ServiceFactory {
    async fn construct(
        &self,
        args: &[Value],
        scope: &mut ResourceScope,
    ) -> Result<Arc<dyn Resource>, ResourceError> {
        expect_arity(args, 1, 1, "service(name)")?;
        let name = text_arg(args, 0, "service name")?;
        let executor = scope.executor();
        let command = command_set(executor.os_type())
            .service_cmd(&name)
            .ok_or_else(|| {
                ResourceError::InvalidArguments(format!("unsafe service name '{}'", name))
            })?;

        Ok(Arc::new(ServiceResource {
            command,
            executor,
            cached: OnceCell::new(),
        }))
    }
}

struct ServiceResource {
    command: String,
    executor: Arc<dyn Executor>,
    cached: OnceCell<Result<ServiceState, ResourceError>>,
}

impl ServiceResource {
    async fn state(&self) -> Result<ServiceState, ResourceError> {
        self.cached.get_or_init(|| self.query()).await.clone()
    }

    async fn query(&self) -> Result<ServiceState, ResourceError> {
        let output = self.executor.execute(&self.command).await?;
        if output.not_found() {
            return Err(ResourceError::Query(
                "no service manager on target".to_string(),
            ));
        }
        // systemctl show exits 0 for unknown units (LoadState=not-found).
        Ok(match self.executor.os_type() {
            OsType::Linux => parse_systemctl_show(&output.stdout),
            OsType::Windows => parse_windows_service(&output.stdout),
        })
    }
}

#[async_trait]
impl Resource for ServiceResource {
    fn properties(&self) -> &'static [&'static str] {
        PROPERTIES
    }

    async fn get(&self, property: &str) -> Result<Value, ResourceError> {
        let pick: fn(&ServiceState) -> bool = match property {
            "installed" => |s| s.installed,
            "running" => |s| s.running,
            "enabled" => |s| s.enabled,
            other => return Err(ResourceError::property_not_found(other, PROPERTIES)),
        };
        Ok(Value::Bool(pick(&self.state().await?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CommandOutput, ScriptedExecutor};

    #[tokio::test]
    async fn test_running_service() {
        let executor = ScriptedExecutor::new(OsType::Linux).on(
            "systemctl show postgresql",
            CommandOutput::ok(
                "LoadState=loaded\nActiveState=active\nSubState=running\nUnitFileState=disabled\n",
            ),
        );
        let mut scope = ResourceScope::new(Arc::new(executor));
        let service = ServiceFactory
            .construct(&[Value::from("postgresql")], &mut scope)
            .await
            .unwrap();

        assert_eq!(service.get("installed").await.unwrap(), Value::Bool(true));
        assert_eq!(service.get("running").await.unwrap(), Value::Bool(true));
        assert_eq!(service.get("enabled").await.unwrap(), Value::Bool(false));
        assert!(service.get("pid").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_systemctl() {
        let mut scope = ResourceScope::new(Arc::new(ScriptedExecutor::new(OsType::Linux)));
        let service = ServiceFactory
            .construct(&[Value::from("postgresql")], &mut scope)
            .await
            .unwrap();
        assert!(matches!(service.get("running").await, Err(ResourceError::Query(_))));
    }
}
