//! `command(line)`: output and exit status of a profile-supplied command.
//!
//! The command line comes from the profile author and is run as written;
//! it is not built from untrusted values.

use crate::executor::{CommandOutput, Executor};
use crate::registry::ResourceFactory;
use crate::resource::{Resource, ResourceError, ResourceScope};
use crate::resources::{expect_arity, text_arg};
use async_trait::async_trait;
use hostspec_profile::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

const PROPERTIES: &[&str] = &["stdout", "stderr", "exit_status"];

pub struct CommandFactory;

#[async_trait]
impl ResourceFactory for CommandFactory {
    async fn construct(
        &self,
        args: &[Value],
        scope: &mut ResourceScope,
    ) -> Result<Arc<dyn Resource>, ResourceError> {
        expect_arity(args, 1, 1, "command(line)")?;
        let line = text_arg(args, 0, "command line")?;
        if line.contains('\0') {
            return Err(ResourceError::InvalidArguments(
                "command line contains a NUL byte".to_string(),
            ));
        }

        Ok(Arc::new(CommandResource {
            line,
            executor: scope.executor(),
            cached: OnceCell::new(),
        }))
    }
}

struct CommandResource {
    line: String,
    executor: Arc<dyn Executor>,
    cached: OnceCell<Result<CommandOutput, ResourceError>>,
}

impl CommandResource {
    async fn output(&self) -> Result<CommandOutput, ResourceError> {
        self.cached
            .get_or_init(|| async {
                self.executor
                    .execute(&self.line)
                    .await
                    .map_err(ResourceError::from)
            })
            .await
            .clone()
    }
}

#[async_trait]
impl Resource for CommandResource {
    fn properties(&self) -> &'static [&'static str] {
        PROPERTIES
    }

    async fn get(&self, property: &str) -> Result<Value, ResourceError> {
        if !PROPERTIES.contains(&property) {
            return Err(ResourceError::property_not_found(property, PROPERTIES));
        }
        let output = self.output().await?;
        Ok(match property {
            "stdout" => Value::Text(output.stdout),
            "stderr" => Value::Text(output.stderr),
            _ => Value::from(output.exit_code.map(i64::from)),
        })
    }
}
