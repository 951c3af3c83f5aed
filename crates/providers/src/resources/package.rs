//! `package(name)`: installed state and version.

use crate::commands::{command_set, PackageManager};
use crate::executor::Executor;
use crate::parsers::{parse_dpkg_status, parse_rpm_version, parse_windows_package, PackageInfo};
use crate::registry::ResourceFactory;
use crate::resource::{Resource, ResourceError, ResourceScope};
use crate::resources::{expect_arity, text_arg};
use async_trait::async_trait;
use hostspec_profile::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

const PROPERTIES: &[&str] = &["installed", "version"];

pub struct PackageFactory;

#[async_trait]
impl ResourceFactory for PackageFactory {
    async fn construct(
        &self,
        args: &[Value],
        scope: &mut ResourceScope,
    ) -> Result<Arc<dyn Resource>, ResourceError> {
        expect_arity(args, 1, 1, "package(name)")?;
        let name = text_arg(args, 0, "package name")?;
        let executor = scope.executor();
        let commands = command_set(executor.os_type())
            .package_cmds(&name)
            .ok_or_else(|| {
                ResourceError::InvalidArguments(format!("unsafe package name '{}'", name))
            })?;

        Ok(Arc::new(PackageResource {
            name,
            commands,
            executor,
            cached: OnceCell::new(),
        }))
    }
}

struct PackageResource {
    name: String,
    commands: Vec<(PackageManager, String)>,
    executor: Arc<dyn Executor>,
    cached: OnceCell<Result<PackageInfo, ResourceError>>,
}

impl PackageResource {
    async fn info(&self) -> Result<PackageInfo, ResourceError> {
        self.cached.get_or_init(|| self.query()).await.clone()
    }

    async fn query(&self) -> Result<PackageInfo, ResourceError> {
        let mut answered = false;

        for (manager, command) in &self.commands {
            let output = self.executor.execute(command).await?;
            if output.not_found() {
                continue;
            }
            answered = true;

            let found = match manager {
                PackageManager::Dpkg => parse_dpkg_status(&output.stdout),
                PackageManager::Rpm if output.success() => {
                    parse_rpm_version(&output.stdout).map(|version| PackageInfo {
                        installed: true,
                        version: Some(version),
                    })
                }
                PackageManager::Rpm => None,
                PackageManager::WindowsPackage => Some(parse_windows_package(&output.stdout)),
            };
            if let Some(info) = found.filter(|i| i.installed) {
                debug!("Package {} found via {:?}", self.name, manager);
                return Ok(info);
            }
        }

        if !answered {
            return Err(ResourceError::Query(
                "no supported package manager on target".to_string(),
            ));
        }
        Ok(PackageInfo::default())
    }
}

#[async_trait]
impl Resource for PackageResource {
    fn properties(&self) -> &'static [&'static str] {
        PROPERTIES
    }

    async fn get(&self, property: &str) -> Result<Value, ResourceError> {
        match property {
            "installed" => Ok(Value::Bool(self.info().await?.installed)),
            "version" => Ok(Value::from(self.info().await?.version)),
            other => Err(ResourceError::property_not_found(other, PROPERTIES)),
        }
    }
}
