//! `postgres_session(user, password, host, port, query[, database])`.
//!
//! Queries run through `psql` on the target. Every query over the same
//! connection tuple within a control shares one [`PgSession`], so a refused
//! connection is attempted once and reported for every later query.

use crate::commands::{command_set, PsqlInvocation};
use crate::executor::Executor;
use crate::parsers::{parse_psql_rows, psql_failure, PsqlFailure};
use crate::registry::ResourceFactory;
use crate::resource::{Resource, ResourceError, ResourceScope};
use crate::resources::{expect_arity, port_arg, text_arg};
use async_trait::async_trait;
use hostspec_common::hash::short_digest;
use hostspec_profile::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

const PROPERTIES: &[&str] = &["output", "rows"];

/// Connection state shared by queries over one (user, password, host, port).
#[derive(Debug)]
pub struct PgSession {
    label: String,
    failure: OnceLock<ResourceError>,
    queries: AtomicUsize,
}

impl PgSession {
    fn new(user: &str, host: &str, port: u16) -> Self {
        Self {
            label: format!("{}@{}:{}", user, host, port),
            failure: OnceLock::new(),
            queries: AtomicUsize::new(0),
        }
    }

    /// Number of queries sent to the server.
    pub fn queries_sent(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    /// Run a prepared psql command line and return its rows.
    pub async fn query(
        &self,
        executor: &dyn Executor,
        command: &str,
    ) -> Result<Vec<String>, ResourceError> {
        if let Some(err) = self.failure.get() {
            debug!("Session {} already failed, not retrying", self.label);
            return Err(err.clone());
        }

        self.queries.fetch_add(1, Ordering::Relaxed);
        let output = executor.execute(command).await?;
        match psql_failure(&output) {
            None => Ok(parse_psql_rows(&output.stdout)),
            Some(PsqlFailure::Query(message)) => Err(ResourceError::Query(message)),
            Some(PsqlFailure::Connection(message)) => {
                warn!("Postgres session {} failed: {}", self.label, message);
                let err = ResourceError::Connection(format!("{}: {}", self.label, message));
                let _ = self.failure.set(err.clone());
                Err(err)
            }
        }
    }
}

pub struct PostgresSessionFactory;

#[async_trait]
impl ResourceFactory for PostgresSessionFactory {
    async fn construct(
        &self,
        args: &[Value],
        scope: &mut ResourceScope,
    ) -> Result<Arc<dyn Resource>, ResourceError> {
        expect_arity(
            args,
            5,
            6,
            "postgres_session(user, password, host, port, query[, database])",
        )?;
        let user = text_arg(args, 0, "user")?;
        let password = match args.get(1) {
            Some(Value::Text(p)) => p.clone(),
            _ => {
                return Err(ResourceError::InvalidArguments(
                    "password must be text".to_string(),
                ))
            }
        };
        let host = text_arg(args, 2, "host")?;
        let port = port_arg(args, 3)?;
        let query = text_arg(args, 4, "query")?;
        let database = match args.get(5) {
            Some(_) => Some(text_arg(args, 5, "database")?),
            None => None,
        };

        let executor = scope.executor();
        let command = command_set(executor.os_type())
            .psql_cmd(&PsqlInvocation {
                user: &user,
                password: &password,
                host: &host,
                port,
                database: database.as_deref(),
                query: &query,
            })
            .ok_or_else(|| {
                ResourceError::InvalidArguments(
                    "connection parameters contain unsafe characters".to_string(),
                )
            })?;

        // Keyed by a digest so the password never sits in a map key.
        let key = format!(
            "{}@{}:{}#{}",
            user,
            host,
            port,
            short_digest(&password, 16)
        );
        let session = scope.session(&key, || PgSession::new(&user, &host, port));

        Ok(Arc::new(PostgresQuery {
            session,
            command,
            executor,
            cached: OnceCell::new(),
        }))
    }

    fn secret_args(&self) -> &'static [usize] {
        &[1]
    }
}

struct PostgresQuery {
    session: Arc<PgSession>,
    command: String,
    executor: Arc<dyn Executor>,
    cached: OnceCell<Result<Vec<String>, ResourceError>>,
}

impl PostgresQuery {
    async fn rows(&self) -> Result<Vec<String>, ResourceError> {
        self.cached
            .get_or_init(|| self.session.query(self.executor.as_ref(), &self.command))
            .await
            .clone()
    }
}

#[async_trait]
impl Resource for PostgresQuery {
    fn properties(&self) -> &'static [&'static str] {
        PROPERTIES
    }

    async fn get(&self, property: &str) -> Result<Value, ResourceError> {
        match property {
            "output" => Ok(Value::from(self.rows().await?)),
            "rows" => Ok(Value::Int(self.rows().await?.len() as i64)),
            other => Err(ResourceError::property_not_found(other, PROPERTIES)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CommandOutput, ScriptedExecutor};
    use hostspec_common::OsType;

    fn args(password: &str, query: &str) -> Vec<Value> {
        vec![
            Value::from("postgres"),
            Value::from(password),
            Value::from("localhost"),
            Value::from(5432u16),
            Value::from(query),
        ]
    }

    #[tokio::test]
    async fn test_query_output_rows() {
        let executor = ScriptedExecutor::new(OsType::Linux).on(
            "pg_catalog.pg_user",
            CommandOutput::ok("alice\npostgres\n"),
        );
        let mut scope = ResourceScope::new(Arc::new(executor));
        let handle = PostgresSessionFactory
            .construct(
                &args("mysecretpassword", "SELECT usename FROM pg_catalog.pg_user;"),
                &mut scope,
            )
            .await
            .unwrap();

        assert_eq!(
            handle.get("output").await.unwrap(),
            Value::from(vec!["alice", "postgres"])
        );
        assert_eq!(handle.get("rows").await.unwrap(), Value::Int(2));
    }

    #[tokio::test]
    async fn test_session_shared_and_failure_remembered() {
        let executor = Arc::new(ScriptedExecutor::new(OsType::Linux).on(
            "psql",
            CommandOutput::failed(
                2,
                "psql: error: connection to server at \"localhost\" failed: Connection refused",
            ),
        ));
        let mut scope = ResourceScope::new(executor.clone());

        let users = PostgresSessionFactory
            .construct(&args("pw", "SELECT usename FROM pg_user;"), &mut scope)
            .await
            .unwrap();
        let dbs = PostgresSessionFactory
            .construct(&args("pw", "SELECT datname FROM pg_database;"), &mut scope)
            .await
            .unwrap();
        assert_eq!(scope.session_count(), 1);

        assert!(matches!(users.get("output").await, Err(ResourceError::Connection(_))));
        assert!(matches!(dbs.get("output").await, Err(ResourceError::Connection(_))));
        assert_eq!(executor.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_different_password_is_different_session() {
        let mut scope = ResourceScope::new(Arc::new(ScriptedExecutor::new(OsType::Linux)));
        PostgresSessionFactory
            .construct(&args("a", "SELECT 1;"), &mut scope)
            .await
            .unwrap();
        PostgresSessionFactory
            .construct(&args("b", "SELECT 1;"), &mut scope)
            .await
            .unwrap();
        assert_eq!(scope.session_count(), 2);
    }

    #[tokio::test]
    async fn test_sql_error_does_not_poison_session() {
        let executor = Arc::new(
            ScriptedExecutor::new(OsType::Linux)
                .on("nope", CommandOutput::failed(1, "ERROR:  relation \"nope\" does not exist"))
                .on("pg_database", CommandOutput::ok("db_test\npostgres\n")),
        );
        let mut scope = ResourceScope::new(executor.clone());
        let bad = PostgresSessionFactory
            .construct(&args("pw", "SELECT * FROM nope;"), &mut scope)
            .await
            .unwrap();
        let good = PostgresSessionFactory
            .construct(&args("pw", "SELECT datname FROM pg_database;"), &mut scope)
            .await
            .unwrap();

        assert!(matches!(bad.get("output").await, Err(ResourceError::Query(_))));
        assert_eq!(
            good.get("output").await.unwrap(),
            Value::from(vec!["db_test", "postgres"])
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let mut scope = ResourceScope::new(Arc::new(ScriptedExecutor::new(OsType::Linux)));
        let mut bad_port = args("pw", "SELECT 1;");
        bad_port[3] = Value::Int(99999);
        assert!(PostgresSessionFactory.construct(&bad_port, &mut scope).await.is_err());

        let mut bad_host = args("pw", "SELECT 1;");
        bad_host[2] = Value::from("localhost; reboot");
        assert!(PostgresSessionFactory.construct(&bad_host, &mut scope).await.is_err());

        assert!(PostgresSessionFactory
            .construct(&args("pw", "SELECT 1;")[..4], &mut scope)
            .await
            .is_err());
    }
}
