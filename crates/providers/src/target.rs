//! Target addressing: `local` or `ssh://user@host[:port]`.

use crate::executor::{Executor, LocalExecutor, SshExecutor, SshOptions};
use hostspec_common::{Error, OsType, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_SSH_USER: &str = "root";

/// Host the profile is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    Local,
    Ssh {
        user: String,
        host: String,
        port: u16,
    },
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("local") {
            return Ok(Target::Local);
        }
        let rest = s
            .strip_prefix("ssh://")
            .ok_or_else(|| Error::InvalidTarget(format!("{} (expected local or ssh://...)", s)))?;

        let (user, hostport) = match rest.split_once('@') {
            Some((user, hostport)) if !user.is_empty() => (user.to_string(), hostport),
            Some(_) => return Err(Error::InvalidTarget(format!("{} (empty user)", s))),
            None => (DEFAULT_SSH_USER.to_string(), rest),
        };
        let (host, port) = match hostport.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::InvalidTarget(format!("{} (bad port)", s)))?;
                (host, port)
            }
            None => (hostport, DEFAULT_SSH_PORT),
        };
        if host.is_empty() || host.contains('/') {
            return Err(Error::InvalidTarget(format!("{} (bad host)", s)));
        }

        Ok(Target::Ssh {
            user,
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Local => write!(f, "local"),
            Target::Ssh { user, host, port } => write!(f, "ssh://{}@{}:{}", user, host, port),
        }
    }
}

/// Credentials and settings used when opening a target.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub key_path: Option<PathBuf>,
    pub password: Option<String>,
    /// Overrides the OS (SSH targets default to Linux).
    pub os: Option<OsType>,
    pub timeout: Option<Duration>,
}

impl Target {
    /// Open an executor for this target.
    pub async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn Executor>> {
        match self {
            Target::Local => Ok(Arc::new(LocalExecutor::new())),
            Target::Ssh { user, host, port } => {
                info!("Connecting to {}", self);
                let (user, host, port) = (user.clone(), host.clone(), *port);
                let options = options.clone();
                let executor = tokio::task::spawn_blocking(move || {
                    SshExecutor::connect(SshOptions {
                        host: &host,
                        port,
                        user: &user,
                        key_path: options.key_path.as_deref(),
                        password: options.password.as_deref(),
                        os: options.os.unwrap_or(OsType::Linux),
                        timeout: options.timeout,
                    })
                })
                .await
                .map_err(|e| Error::SshConnection(e.to_string()))??;
                Ok(Arc::new(executor))
            }
        }
    }
}
