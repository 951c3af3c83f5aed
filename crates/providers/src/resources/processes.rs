//! `processes(pattern)`: processes whose command line matches a regex.

use crate::commands::command_set;
use crate::executor::Executor;
use crate::parsers::{parse_linux_processes, parse_windows_processes, ProcessEntry};
use crate::registry::ResourceFactory;
use crate::resource::{Resource, ResourceError, ResourceScope};
use crate::resources::{expect_arity, text_arg};
use async_trait::async_trait;
use hostspec_common::OsType;
use hostspec_profile::Value;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::OnceCell;

const PROPERTIES: &[&str] = &["running", "pids", "users", "commands", "count"];

pub struct ProcessesFactory;

#[async_trait]
impl ResourceFactory for ProcessesFactory {
    async fn construct(
        &self,
        args: &[Value],
        scope: &mut ResourceScope,
    ) -> Result<Arc<dyn Resource>, ResourceError> {
        expect_arity(args, 1, 1, "processes(pattern)")?;
        let pattern = text_arg(args, 0, "process pattern")?;
        let pattern = Regex::new(&pattern).map_err(|e| {
            ResourceError::InvalidArguments(format!("invalid process pattern: {}", e))
        })?;

        Ok(Arc::new(ProcessesResource {
            pattern,
            executor: scope.executor(),
            cached: OnceCell::new(),
        }))
    }
}

struct ProcessesResource {
    pattern: Regex,
    executor: Arc<dyn Executor>,
    cached: OnceCell<Result<Vec<ProcessEntry>, ResourceError>>,
}

impl ProcessesResource {
    async fn matching(&self) -> Result<Vec<ProcessEntry>, ResourceError> {
        self.cached.get_or_init(|| self.query()).await.clone()
    }

    async fn query(&self) -> Result<Vec<ProcessEntry>, ResourceError> {
        let os = self.executor.os_type();
        let list_cmd = command_set(os).process_list_cmd();
        let output = self.executor.execute(&list_cmd).await?;
        if !output.success() {
            return Err(ResourceError::Query(format!(
                "process listing failed: {}",
                output.stderr.trim()
            )));
        }

        let entries = match os {
            OsType::Linux => parse_linux_processes(&output.stdout),
            OsType::Windows => parse_windows_processes(&output.stdout),
        };
        Ok(entries
            .into_iter()
            // The listing command itself shows up in the table.
            .filter(|p| !p.command.contains(&list_cmd))
            .filter(|p| self.pattern.is_match(&p.command))
            .collect())
    }
}

#[async_trait]
impl Resource for ProcessesResource {
    fn properties(&self) -> &'static [&'static str] {
        PROPERTIES
    }

    async fn get(&self, property: &str) -> Result<Value, ResourceError> {
        if !PROPERTIES.contains(&property) {
            return Err(ResourceError::property_not_found(property, PROPERTIES));
        }
        let procs = self.matching().await?;

        Ok(match property {
            "running" => Value::Bool(!procs.is_empty()),
            "count" => Value::Int(procs.len() as i64),
            "pids" => Value::List(procs.iter().map(|p| Value::Int(i64::from(p.pid))).collect()),
            "commands" => Value::List(
                procs
                    .iter()
                    .map(|p| Value::from(p.command.as_str()))
                    .collect(),
            ),
            _ => {
                let mut users: Vec<&str> = Vec::new();
                for p in procs.iter().filter(|p| !p.user.is_empty()) {
                    if !users.contains(&p.user.as_str()) {
                        users.push(&p.user);
                    }
                }
                Value::from(users)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CommandOutput, ScriptedExecutor};

    const PS_OUTPUT: &str = "    1 root     /sbin/init
  812 postgres /usr/lib/postgresql/14/bin/postgres -D /var/lib/postgresql/14/main
  830 postgres postgres: 14/main: checkpointer
  999 root     sh -c ps -eo pid=,user=,args=
";

    async fn processes(pattern: &str, output: CommandOutput) -> Arc<dyn Resource> {
        let executor = ScriptedExecutor::new(OsType::Linux).on("ps -eo", output);
        let mut scope = ResourceScope::new(Arc::new(executor));
        ProcessesFactory
            .construct(&[Value::from(pattern)], &mut scope)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_running_postgres() {
        let procs = processes("postgres", CommandOutput::ok(PS_OUTPUT)).await;
        assert_eq!(procs.get("running").await.unwrap(), Value::Bool(true));
        assert_eq!(procs.get("count").await.unwrap(), Value::Int(2));
        assert_eq!(
            procs.get("pids").await.unwrap(),
            Value::List(vec![Value::Int(812), Value::Int(830)])
        );
        assert_eq!(procs.get("users").await.unwrap(), Value::from(vec!["postgres"]));
    }

    #[tokio::test]
    async fn test_not_running() {
        let procs = processes("^nginx", CommandOutput::ok(PS_OUTPUT)).await;
        assert_eq!(procs.get("running").await.unwrap(), Value::Bool(false));
        assert_eq!(procs.get("commands").await.unwrap(), Value::List(vec![]));
    }

    #[tokio::test]
    async fn test_listing_itself_is_ignored() {
        let procs = processes("ps -eo", CommandOutput::ok(PS_OUTPUT)).await;
        assert_eq!(procs.get("running").await.unwrap(), Value::Bool(false));
    }

    #[tokio::test]
    async fn test_listing_failure_is_query_error() {
        let procs = processes("postgres", CommandOutput::failed(1, "ps: permission denied")).await;
        assert!(matches!(procs.get("running").await, Err(ResourceError::Query(_))));
    }

    #[tokio::test]
    async fn test_invalid_pattern() {
        let mut scope = ResourceScope::new(Arc::new(ScriptedExecutor::new(OsType::Linux)));
        let result = ProcessesFactory
            .construct(&[Value::from("([")], &mut scope)
            .await;
        assert!(matches!(result, Err(ResourceError::InvalidArguments(_))));
    }
}
