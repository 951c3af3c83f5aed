//! Allowlisted commands for resource queries.
//!
//! Every command a resource can run on a target is built here. Arguments
//! that end up inside a command line are checked or quoted first; a `None`
//! return means the argument was rejected.

use hostspec_common::OsType;

/// Parameters for one `psql` invocation.
#[derive(Debug, Clone, Copy)]
pub struct PsqlInvocation<'a> {
    pub user: &'a str,
    pub password: &'a str,
    pub host: &'a str,
    pub port: u16,
    pub database: Option<&'a str>,
    pub query: &'a str,
}

/// Which tool answers a package lookup; selects the output parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Dpkg,
    Rpm,
    WindowsPackage,
}

/// Trait for command sets.
pub trait CommandSet: Send + Sync {
    /// Package lookups, tried in order until one package manager answers.
    fn package_cmds(&self, name: &str) -> Option<Vec<(PackageManager, String)>>;

    /// Full process table.
    fn process_list_cmd(&self) -> String;

    /// State of a single service.
    fn service_cmd(&self, name: &str) -> Option<String>;

    /// Run one query through psql, unaligned and tuples-only.
    fn psql_cmd(&self, invocation: &PsqlInvocation<'_>) -> Option<String>;
}

/// Command set for an OS.
pub fn command_set(os: OsType) -> &'static dyn CommandSet {
    static LINUX: LinuxCommands = LinuxCommands;
    static WINDOWS: WindowsCommands = WindowsCommands;
    match os {
        OsType::Linux => &LINUX,
        OsType::Windows => &WINDOWS,
    }
}

/// Linux commands using standard tools.
pub struct LinuxCommands;

impl CommandSet for LinuxCommands {
    fn package_cmds(&self, name: &str) -> Option<Vec<(PackageManager, String)>> {
        if !is_safe_package_name(name) {
            return None;
        }
        let quoted = shell_quote(name);
        Some(vec![
            (
                PackageManager::Dpkg,
                format!(
                    "dpkg-query -W -f='${{Status}}\\t${{Version}}\\n' {} 2>/dev/null",
                    quoted
                ),
            ),
            (
                PackageManager::Rpm,
                format!(
                    "rpm -q --queryformat '%{{VERSION}}-%{{RELEASE}}\\n' {} 2>/dev/null",
                    quoted
                ),
            ),
        ])
    }

    fn process_list_cmd(&self) -> String {
        "ps -eo pid=,user=,args=".to_string()
    }

    fn service_cmd(&self, name: &str) -> Option<String> {
        if !is_safe_service_name(name) {
            return None;
        }
        Some(format!(
            "systemctl show {} --no-pager --property=LoadState,ActiveState,SubState,UnitFileState",
            name
        ))
    }

    fn psql_cmd(&self, invocation: &PsqlInvocation<'_>) -> Option<String> {
        if !is_safe_identifier(invocation.user) || !is_safe_identifier(invocation.host) {
            return None;
        }
        let database = match invocation.database {
            Some(db) if is_safe_identifier(db) => format!(" -d {}", db),
            Some(_) => return None,
            None => String::new(),
        };
        Some(format!(
            "PGPASSWORD={} psql -U {} -h {} -p {}{} -A -t -c {}",
            shell_quote(invocation.password),
            invocation.user,
            invocation.host,
            invocation.port,
            database,
            shell_quote(invocation.query)
        ))
    }
}

/// Windows commands; PowerShell runs under `cmd /C`.
pub struct WindowsCommands;

impl CommandSet for WindowsCommands {
    fn package_cmds(&self, name: &str) -> Option<Vec<(PackageManager, String)>> {
        if !is_safe_package_name(name) {
            return None;
        }
        Some(vec![(PackageManager::WindowsPackage, powershell(&format!(
            "Get-Package -Name '{}' -ErrorAction SilentlyContinue | Select-Object Name,Version | ConvertTo-Json -Depth 3",
            name
        )))])
    }

    fn process_list_cmd(&self) -> String {
        powershell(
            "Get-CimInstance Win32_Process | Select-Object ProcessId,Name,CommandLine | ConvertTo-Json -Depth 3",
        )
    }

    fn service_cmd(&self, name: &str) -> Option<String> {
        if !is_safe_service_name(name) {
            return None;
        }
        Some(powershell(&format!(
            "Get-CimInstance Win32_Service | Where-Object {{ $_.Name -eq '{}' }} | Select-Object Name,State,StartMode | ConvertTo-Json -Depth 3",
            name
        )))
    }

    fn psql_cmd(&self, invocation: &PsqlInvocation<'_>) -> Option<String> {
        let cmd_safe = |s: &str| {
            !s.chars()
                .any(|c| matches!(c, '"' | '%' | '&' | '|' | '<' | '>' | '^' | '\n' | '\r'))
        };
        if !is_safe_identifier(invocation.user)
            || !is_safe_identifier(invocation.host)
            || !cmd_safe(invocation.password)
            || !cmd_safe(invocation.query)
        {
            return None;
        }
        let database = match invocation.database {
            Some(db) if is_safe_identifier(db) => format!(" -d {}", db),
            Some(_) => return None,
            None => String::new(),
        };
        Some(format!(
            "set \"PGPASSWORD={}\" && psql -U {} -h {} -p {}{} -A -t -c \"{}\"",
            invocation.password,
            invocation.user,
            invocation.host,
            invocation.port,
            database,
            invocation.query
        ))
    }
}

fn powershell(script: &str) -> String {
    format!("powershell -NoProfile -NonInteractive -Command \"{}\"", script)
}

/// Single-quote a value for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Validate that a service name is safe (no injection).
pub fn is_safe_service_name(name: &str) -> bool {
    // Allow alphanumeric, dash, underscore, dot, @
    name.chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '@')
        && !name.is_empty()
        && name.len() < 256
}

/// Package names additionally use `+` (`libstdc++6`) and `:` (`pkg:amd64`).
pub fn is_safe_package_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '+' | ':'))
        && !name.is_empty()
        && !name.starts_with('-')
        && name.len() < 256
}

/// Database users, databases and host names.
pub fn is_safe_identifier(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !value.is_empty()
        && !value.starts_with('-')
        && value.len() < 256
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation<'a>(password: &'a str, query: &'a str) -> PsqlInvocation<'a> {
        PsqlInvocation {
            user: "postgres",
            password,
            host: "localhost",
            port: 5432,
            database: None,
            query,
        }
    }

    #[test]
    fn test_safe_service_name() {
        assert!(is_safe_service_name("nginx"));
        assert!(is_safe_service_name("my-service@instance"));
        assert!(is_safe_service_name("postgresql.service"));

        assert!(!is_safe_service_name("service; rm -rf /"));
        assert!(!is_safe_service_name("service | cat /etc/passwd"));
        assert!(!is_safe_service_name(""));
    }

    #[test]
    fn test_safe_package_name() {
        assert!(is_safe_package_name("postgresql-14"));
        assert!(is_safe_package_name("libstdc++6"));
        assert!(is_safe_package_name("openssl:amd64"));

        assert!(!is_safe_package_name("--help"));
        assert!(!is_safe_package_name("x$(reboot)"));
        assert!(!is_safe_package_name("a b"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_linux_package_cmds() {
        let cmds = command_set(OsType::Linux).package_cmds("postgresql-14").unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].0, PackageManager::Dpkg);
        assert!(cmds[0]
            .1
            .starts_with("dpkg-query -W -f='${Status}\\t${Version}\\n' 'postgresql-14'"));
        assert!(cmds[1].1.starts_with("rpm -q"));
        assert!(command_set(OsType::Linux).package_cmds("x;reboot").is_none());
    }

    #[test]
    fn test_linux_psql_cmd_quotes_password_and_query() {
        let cmd = LinuxCommands
            .psql_cmd(&invocation("my'secret", "SELECT datname FROM pg_database;"))
            .unwrap();
        assert_eq!(
            cmd,
            r"PGPASSWORD='my'\''secret' psql -U postgres -h localhost -p 5432 -A -t -c 'SELECT datname FROM pg_database;'"
        );

        let bad_host = PsqlInvocation {
            host: "localhost; reboot",
            ..invocation("pw", "SELECT 1")
        };
        assert!(LinuxCommands.psql_cmd(&bad_host).is_none());
    }

    #[test]
    fn test_windows_rejects_cmd_metacharacters() {
        assert!(WindowsCommands.psql_cmd(&invocation("pw", "SELECT 1")).is_some());
        assert!(WindowsCommands.psql_cmd(&invocation("p&w", "SELECT 1")).is_none());
        assert!(WindowsCommands
            .psql_cmd(&invocation("pw", "SELECT \"x\""))
            .is_none());
    }

    #[test]
    fn test_service_cmd() {
        let linux = command_set(OsType::Linux);
        assert!(linux.service_cmd("postgresql").unwrap().contains("systemctl show postgresql"));
        assert!(linux.service_cmd("nginx; rm -rf /").is_none());
        assert!(command_set(OsType::Windows)
            .service_cmd("postgresql-x64-14")
            .unwrap()
            .starts_with("powershell"));
    }
}
