//! Command executors for the supported connection types.

use async_trait::async_trait;
use hostspec_common::{Error, OsType, Result};
use hostspec_redaction::Redactor;
use ssh2::Session;
use std::io::Read;
use std::net::TcpStream;
use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

/// Commands can carry connection passwords; never log them verbatim.
static LOG_REDACTOR: LazyLock<Redactor> = LazyLock::new(Redactor::new);

fn loggable(command: &str) -> String {
    LOG_REDACTOR.redact_str(command)
}

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Shell exit status for "command not found".
    pub fn not_found(&self) -> bool {
        self.exit_code == Some(127)
    }
}

/// Trait for command execution on a target.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute a command line through the target's shell.
    async fn execute(&self, command: &str) -> Result<CommandOutput>;

    /// Operating system of the target, selects the command set.
    fn os_type(&self) -> OsType;

    /// Human-readable target name for reports.
    fn describe(&self) -> String;

    /// Check if the connection is still alive.
    fn is_connected(&self) -> bool;
}

/// Runs commands on the local host.
pub struct LocalExecutor {
    os: OsType,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self { os: OsType::host() }
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!("Local exec: {}", loggable(command));

        let (shell, flag) = self.os.shell();
        // Dropping the future (timeout, cancellation) kills the child.
        let output = Command::new(shell)
            .args([flag, command])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::CommandExecution {
                cmd: loggable(command),
                reason: e.to_string(),
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn os_type(&self) -> OsType {
        self.os
    }

    fn describe(&self) -> String {
        "local".to_string()
    }

    fn is_connected(&self) -> bool {
        true
    }
}

/// SSH executor for remote hosts.
pub struct SshExecutor {
    session: Arc<Session>,
    label: String,
    os: OsType,
    timeout: Option<Duration>,
}

/// Connection settings for [`SshExecutor::connect`].
#[derive(Debug, Clone)]
pub struct SshOptions<'a> {
    pub host: &'a str,
    pub port: u16,
    pub user: &'a str,
    pub key_path: Option<&'a Path>,
    pub password: Option<&'a str>,
    pub os: OsType,
    /// Applied to every blocking libssh2 call.
    pub timeout: Option<Duration>,
}

impl SshExecutor {
    /// Connect and authenticate: key file, then password, then agent.
    pub fn connect(options: SshOptions<'_>) -> Result<Self> {
        let address = format!("{}:{}", options.host, options.port);
        let tcp = match options.timeout {
            Some(timeout) => {
                let addr = std::net::ToSocketAddrs::to_socket_addrs(&address)?
                    .next()
                    .ok_or_else(|| Error::InvalidTarget(address.clone()))?;
                TcpStream::connect_timeout(&addr, timeout)
            }
            None => TcpStream::connect(&address),
        }
        .map_err(|e| Error::SshConnection(format!("{}: {}", address, e)))?;

        let mut session =
            Session::new().map_err(|e| Error::SshConnection(e.message().to_string()))?;
        if let Some(timeout) = options.timeout {
            session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
        }
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| Error::SshConnection(format!("handshake with {}: {}", address, e)))?;

        let user = options.user;
        if let Some(key) = options.key_path {
            session
                .userauth_pubkey_file(user, None, key, None)
                .map_err(|e| Error::SshAuth(format!("key {}: {}", key.display(), e)))?;
        } else if let Some(password) = options.password {
            session
                .userauth_password(user, password)
                .map_err(|e| Error::SshAuth(e.message().to_string()))?;
        } else {
            authenticate_with_agent(&session, user)?;
        }

        if !session.authenticated() {
            return Err(Error::SshAuth(format!("{}@{}", user, address)));
        }

        debug!("SSH session established with {}@{}", user, address);
        Ok(Self {
            session: Arc::new(session),
            label: format!("ssh://{}@{}", user, address),
            os: options.os,
            timeout: options.timeout,
        })
    }
}

fn authenticate_with_agent(session: &Session, user: &str) -> Result<()> {
    let agent_err = |e: ssh2::Error| Error::SshAuth(format!("agent: {}", e));
    let mut agent = session.agent().map_err(agent_err)?;
    agent.connect().map_err(agent_err)?;
    agent.list_identities().map_err(agent_err)?;

    for identity in agent.identities().map_err(agent_err)? {
        if agent.userauth(user, &identity).is_ok() {
            return Ok(());
        }
    }
    Err(Error::SshAuth(
        "no valid SSH authentication method available".to_string(),
    ))
}

fn run_over_ssh(session: &Session, command: &str) -> std::result::Result<CommandOutput, String> {
    let mut channel = session.channel_session().map_err(|e| e.to_string())?;
    channel.exec(command).map_err(|e| e.to_string())?;

    let mut stdout = String::new();
    channel
        .read_to_string(&mut stdout)
        .map_err(|e| e.to_string())?;
    let mut stderr = String::new();
    channel
        .stderr()
        .read_to_string(&mut stderr)
        .map_err(|e| e.to_string())?;

    channel.wait_close().ok();
    Ok(CommandOutput {
        exit_code: channel.exit_status().ok(),
        stdout,
        stderr,
    })
}

#[async_trait]
impl Executor for SshExecutor {
    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        let shown = loggable(command);
        debug!("SSH exec: {}", shown);

        let session = Arc::clone(&self.session);
        let line = command.to_string();
        let result = tokio::task::spawn_blocking(move || run_over_ssh(&session, &line))
            .await
            .map_err(|e| Error::CommandExecution {
                cmd: shown.clone(),
                reason: e.to_string(),
            })?;

        result.map_err(|reason| {
            if reason.to_lowercase().contains("timed out") {
                Error::CommandTimeout {
                    cmd: shown,
                    seconds: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
                }
            } else {
                Error::CommandExecution { cmd: shown, reason }
            }
        })
    }

    fn os_type(&self) -> OsType {
        self.os
    }

    fn describe(&self) -> String {
        self.label.clone()
    }

    fn is_connected(&self) -> bool {
        self.session.authenticated()
    }
}

/// In-memory executor answering from canned outputs.
///
/// Rules are checked in insertion order; the first rule whose pattern is a
/// substring of the command wins. Unmatched commands behave like a missing
/// binary (exit 127).
pub struct ScriptedExecutor {
    os: OsType,
    rules: Vec<(String, CommandOutput)>,
    delay: Option<Duration>,
    log: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(os: OsType) -> Self {
        Self {
            os,
            rules: Vec::new(),
            delay: None,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, pattern: impl Into<String>, output: CommandOutput) -> Self {
        self.rules.push((pattern.into(), output));
        self
    }

    /// Sleep before answering every command.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Commands executed so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        trace!("Scripted exec: {}", loggable(command));
        if let Ok(mut log) = self.log.lock() {
            log.push(command.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(self
            .rules
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::failed(127, "sh: command not found")))
    }

    fn os_type(&self) -> OsType {
        self.os
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_executor_first_match_wins() {
        let executor = ScriptedExecutor::new(OsType::Linux)
            .on("dpkg-query", CommandOutput::ok("install ok installed\t14.2\n"))
            .on("dpkg", CommandOutput::failed(1, "never reached"));

        let out = executor.execute("dpkg-query -W nginx").await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "install ok installed\t14.2\n");

        let missing = executor.execute("rpm -q nginx").await.unwrap();
        assert!(missing.not_found());
        assert_eq!(executor.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_local_executor_runs_shell() {
        if cfg!(target_os = "windows") {
            return;
        }
        let executor = LocalExecutor::new();
        let out = executor.execute("echo hello; echo oops >&2; exit 3").await.unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
    }

    #[test]
    fn test_loggable_hides_password() {
        let shown = loggable("PGPASSWORD='hunter2' psql -U postgres");
        assert!(!shown.contains("hunter2"));
    }
}
