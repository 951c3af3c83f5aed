//! Common error types for hostspec.

use thiserror::Error;

/// Error type for target access and other shared plumbing.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SSH connection failed: {0}")]
    SshConnection(String),

    #[error("SSH authentication failed: {0}")]
    SshAuth(String),

    #[error("Command execution failed: {cmd} - {reason}")]
    CommandExecution { cmd: String, reason: String },

    #[error("Command timed out after {seconds}s: {cmd}")]
    CommandTimeout { cmd: String, seconds: u64 },

    #[error("Unsupported OS: {0}")]
    UnsupportedOs(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using common Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(format!("{:#}", e))
    }
}

impl Error {
    /// Whether the error came from a deadline rather than the target itself.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::CommandTimeout { .. })
    }
}
