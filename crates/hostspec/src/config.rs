//! Run configuration: built-in defaults, then the YAML file, then flags.

use anyhow::{Context, Result};
use hostspec_common::OsType;
use hostspec_engine::{EngineConfig, ReportFormat};
use hostspec_profile::Impact;
use hostspec_providers::target::ConnectOptions;
use hostspec_providers::Target;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_JOBS: usize = 4;

/// Contents of a `--config` file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub target: Option<String>,
    pub os: Option<OsType>,
    pub ssh_key: Option<PathBuf>,
    pub ssh_password: Option<String>,
    pub timeout_secs: Option<u64>,
    pub jobs: Option<usize>,
    pub fail_threshold: Option<Impact>,
    pub format: Option<ReportFormat>,
    pub redact: Option<bool>,
    /// Extra regexes scrubbed from diagnostics.
    pub redaction_patterns: Vec<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub target: Option<Target>,
    pub os: Option<OsType>,
    pub ssh_key: Option<PathBuf>,
    pub ssh_password: Option<String>,
    pub timeout_secs: Option<u64>,
    pub jobs: Option<usize>,
    pub fail_threshold: Option<Impact>,
    pub format: Option<ReportFormat>,
}

/// Effective settings for one `exec`.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub target: Target,
    pub connect: ConnectOptions,
    pub engine: EngineConfig,
    pub fail_threshold: Impact,
    pub format: ReportFormat,
    pub redaction_patterns: Vec<String>,
}

impl RunConfig {
    pub fn resolve(file: FileConfig, cli: Overrides) -> Result<Self> {
        let target = match (cli.target, file.target) {
            (Some(target), _) => target,
            (None, Some(text)) => text
                .parse()
                .with_context(|| format!("Invalid target in config: {}", text))?,
            (None, None) => Target::Local,
        };

        let timeout = Duration::from_secs(
            cli.timeout_secs
                .or(file.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        );
        let jobs = cli.jobs.or(file.jobs).unwrap_or(DEFAULT_JOBS);
        if jobs == 0 {
            anyhow::bail!("jobs must be at least 1");
        }

        Ok(Self {
            target,
            connect: ConnectOptions {
                key_path: cli.ssh_key.or(file.ssh_key),
                password: cli.ssh_password.or(file.ssh_password),
                os: cli.os.or(file.os),
                timeout: Some(timeout),
            },
            engine: EngineConfig {
                timeout,
                jobs,
                redact: file.redact.unwrap_or(true),
            },
            fail_threshold: cli
                .fail_threshold
                .or(file.fail_threshold)
                .unwrap_or(Impact::None),
            format: cli.format.or(file.format).unwrap_or_default(),
            redaction_patterns: file.redaction_patterns,
        })
    }

    /// Settings as key/value pairs for logging. Values are not redacted.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = vec![
            ("target", self.target.to_string()),
            ("timeout_secs", self.engine.timeout.as_secs().to_string()),
            ("jobs", self.engine.jobs.to_string()),
            ("fail_threshold", self.fail_threshold.to_string()),
            ("redact", self.engine.redact.to_string()),
        ];
        if let Some(os) = self.connect.os {
            entries.push(("os", os.to_string()));
        }
        if let Some(key) = &self.connect.key_path {
            entries.push(("ssh_key", key.display().to_string()));
        }
        if let Some(password) = &self.connect.password {
            entries.push(("ssh_password", password.clone()));
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = RunConfig::resolve(FileConfig::default(), Overrides::default()).unwrap();
        assert_eq!(config.target, Target::Local);
        assert_eq!(config.engine.timeout, Duration::from_secs(30));
        assert_eq!(config.engine.jobs, 4);
        assert!(config.engine.redact);
        assert_eq!(config.fail_threshold, Impact::None);
        assert_eq!(config.format, ReportFormat::Text);
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostspec.yml");
        std::fs::write(
            &path,
            "target: ssh://deploy@db01:2222\ntimeout_secs: 10\njobs: 8\nfail_threshold: high\nformat: json\n",
        )
        .unwrap();
        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.fail_threshold, Some(Impact::High));

        let cli = Overrides {
            jobs: Some(2),
            ..Default::default()
        };
        let config = RunConfig::resolve(file, cli).unwrap();
        assert_eq!(
            config.target,
            Target::Ssh {
                user: "deploy".to_string(),
                host: "db01".to_string(),
                port: 2222,
            }
        );
        assert_eq!(config.engine.jobs, 2);
        assert_eq!(config.engine.timeout, Duration::from_secs(10));
        assert_eq!(config.connect.timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.fail_threshold, Impact::High);
        assert_eq!(config.format, ReportFormat::Json);
    }

    #[test]
    fn test_entries_include_password_for_redaction() {
        let cli = Overrides {
            ssh_password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let config = RunConfig::resolve(FileConfig::default(), cli).unwrap();
        let redactor = hostspec_redaction::Redactor::new();
        let logged: Vec<String> = config
            .entries()
            .into_iter()
            .map(|(k, v)| redactor.redact_key_value(k, &v).0)
            .collect();
        assert!(logged.contains(&"local".to_string()));
        assert!(!logged.iter().any(|v| v.contains("hunter2")));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yml");
        std::fs::write(&path, "targte: local\n").unwrap();
        assert!(FileConfig::load(&path).is_err());
    }

    #[test]
    fn test_zero_jobs_rejected() {
        let cli = Overrides {
            jobs: Some(0),
            ..Default::default()
        };
        assert!(RunConfig::resolve(FileConfig::default(), cli).is_err());
    }
}
