//! Parsers for command outputs.

use crate::executor::CommandOutput;
use serde::Serialize;

/// Installed state of one package.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PackageInfo {
    pub installed: bool,
    pub version: Option<String>,
}

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessEntry {
    pub pid: u32,
    pub user: String,
    pub command: String,
}

/// Observed state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ServiceState {
    pub installed: bool,
    pub running: bool,
    pub enabled: bool,
}

/// Why a psql invocation did not produce rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PsqlFailure {
    /// Server unreachable or credentials refused; the session is unusable.
    Connection(String),
    /// The statement itself failed.
    Query(String),
}

/// PowerShell's `ConvertTo-Json` emits a bare object for a single result.
fn json_items(output: &str) -> Vec<serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(output.trim()) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(serde_json::Value::Null) | Err(_) => Vec::new(),
        Ok(item) => vec![item],
    }
}

/// Parse `dpkg-query -W -f='${Status}\t${Version}\n'` output.
///
/// Returns `None` when dpkg-query printed nothing (unknown package or no
/// dpkg on the host).
pub fn parse_dpkg_status(output: &str) -> Option<PackageInfo> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    let (status, version) = line.split_once('\t').unwrap_or((line, ""));

    // "install ok installed"; removed packages linger as "deinstall ok config-files".
    let installed = status.split_whitespace().last() == Some("installed");
    let version = version.trim();
    Some(PackageInfo {
        installed,
        version: (installed && !version.is_empty()).then(|| version.to_string()),
    })
}

/// Parse `rpm -q --queryformat '%{VERSION}-%{RELEASE}\n'` output.
pub fn parse_rpm_version(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .filter(|l| !l.contains("is not installed"))
        .map(str::to_string)
}

/// Parse `Get-Package | Select-Object Name,Version | ConvertTo-Json`.
pub fn parse_windows_package(output: &str) -> PackageInfo {
    match json_items(output).first() {
        Some(item) => PackageInfo {
            installed: true,
            version: item["Version"].as_str().map(|s| s.to_string()),
        },
        None => PackageInfo::default(),
    }
}

/// Parse `ps -eo pid=,user=,args=` output.
pub fn parse_linux_processes(output: &str) -> Vec<ProcessEntry> {
    let mut processes = Vec::new();

    for line in output.lines() {
        let mut parts = line.split_whitespace();
        let (Some(pid), Some(user)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(pid) = pid.parse::<u32>() else {
            // Header line, if ps ignored the `=` suffixes.
            continue;
        };
        let command = parts.collect::<Vec<_>>().join(" ");
        if command.is_empty() {
            continue;
        }
        processes.push(ProcessEntry {
            pid,
            user: user.to_string(),
            command,
        });
    }

    processes
}

/// Parse `Get-CimInstance Win32_Process | ConvertTo-Json` output.
pub fn parse_windows_processes(output: &str) -> Vec<ProcessEntry> {
    json_items(output)
        .iter()
        .map(|item| {
            let name = item["Name"].as_str().unwrap_or("");
            ProcessEntry {
                pid: item["ProcessId"].as_u64().unwrap_or(0) as u32,
                user: String::new(),
                command: item["CommandLine"]
                    .as_str()
                    .filter(|c| !c.is_empty())
                    .unwrap_or(name)
                    .to_string(),
            }
        })
        .filter(|p| !p.command.is_empty())
        .collect()
}

/// Parse `systemctl show --property=...` key=value output.
pub fn parse_systemctl_show(output: &str) -> ServiceState {
    let mut state = ServiceState::default();

    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "LoadState" => state.installed = value.trim() == "loaded",
            "SubState" => state.running = value.trim() == "running",
            "UnitFileState" => {
                state.enabled = matches!(value.trim(), "enabled" | "enabled-runtime")
            }
            _ => {}
        }
    }

    state
}

/// Parse the Win32_Service projection (Name, State, StartMode).
pub fn parse_windows_service(output: &str) -> ServiceState {
    match json_items(output).first() {
        Some(item) => ServiceState {
            installed: true,
            running: item["State"].as_str() == Some("Running"),
            enabled: item["StartMode"].as_str() == Some("Auto"),
        },
        None => ServiceState::default(),
    }
}

/// Rows of `psql -A -t` output, one per line, kept verbatim. Only line
/// terminators are stripped; empty and padded values are real rows.
pub fn parse_psql_rows(output: &str) -> Vec<String> {
    output.lines().map(str::to_string).collect()
}

/// Classify a psql run; `None` means the query succeeded.
pub fn psql_failure(output: &CommandOutput) -> Option<PsqlFailure> {
    let stderr = output.stderr.trim();
    if output.not_found() {
        return Some(PsqlFailure::Connection(
            "psql is not available on the target".to_string(),
        ));
    }

    const CONNECTION_MARKERS: [&str; 5] = [
        "could not connect",
        "connection to server",
        "password authentication failed",
        "could not translate host name",
        "FATAL:",
    ];
    if CONNECTION_MARKERS.iter().any(|m| stderr.contains(m)) {
        return Some(PsqlFailure::Connection(first_line(stderr)));
    }
    if stderr.contains("ERROR:") || !output.success() {
        let message = if stderr.is_empty() {
            format!("psql exited with status {:?}", output.exit_code)
        } else {
            first_line(stderr)
        };
        return Some(PsqlFailure::Query(message));
    }
    None
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}
