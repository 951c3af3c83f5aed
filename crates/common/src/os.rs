//! Operating system type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target operating system type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    Linux,
    Windows,
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsType::Linux => write!(f, "linux"),
            OsType::Windows => write!(f, "windows"),
        }
    }
}

impl FromStr for OsType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linux" => Ok(OsType::Linux),
            "windows" => Ok(OsType::Windows),
            _ => Err(crate::Error::UnsupportedOs(s.to_string())),
        }
    }
}

impl OsType {
    /// The OS this binary runs on. Used when the target is the local host.
    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            OsType::Windows
        } else {
            OsType::Linux
        }
    }

    /// Check if the OS is Linux.
    pub fn is_linux(&self) -> bool {
        matches!(self, OsType::Linux)
    }

    /// Check if the OS is Windows.
    pub fn is_windows(&self) -> bool {
        matches!(self, OsType::Windows)
    }

    /// Shell program and flag used to run a single command line.
    pub fn shell(&self) -> (&'static str, &'static str) {
        match self {
            OsType::Linux => ("sh", "-c"),
            OsType::Windows => ("cmd", "/C"),
        }
    }
}
