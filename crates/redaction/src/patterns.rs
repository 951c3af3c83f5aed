//! Regex patterns for detecting secrets in diagnostics.
//!
//! Patterns with a `value` capture group only redact that group, so the
//! surrounding key stays readable (`PGPASSWORD=[REDACTED]`).

use regex::Regex;
use std::sync::LazyLock;

/// Common secret key names in arguments, environment and configs.
pub static SECRET_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(password|passwd|pwd|secret|token|api[_-]?key|apikey|private[_-]?key|credentials?|passphrase)")
        .unwrap()
});

/// Inline `NAME=value` assignments with a sensitive name, anywhere in a
/// line: `PGPASSWORD=hunter2 psql ...`.
pub static INLINE_ASSIGNMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b[A-Z_]*(?:PASSWORD|PASSWD|PWD|SECRET|TOKEN|API_?KEY|PASSPHRASE)[A-Z_]*=(?P<value>'[^']*'|"[^"]*"|\S+)"#)
        .unwrap()
});

/// `password=...` pairs inside libpq connection strings.
pub static CONNINFO_PASSWORD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bpassword\s*=\s*(?P<value>'[^']*'|\S+)").unwrap()
});

/// URLs with embedded credentials: `postgres://user:pw@host/db`.
pub static URL_CREDENTIALS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[a-z][a-z0-9+.-]*://[^:/@\s]+:(?P<value>[^@\s]+)@").unwrap()
});

/// Command-line password flags: `--password hunter2`, `-p=hunter2`.
pub static PASSWORD_FLAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:--password|--passwd|--ssh-password)[=\s]+(?P<value>\S+)").unwrap()
});

/// Authorization headers.
pub static AUTH_HEADER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Authorization|X-Api-Key|X-Auth-Token):\s*(?P<value>.+)").unwrap()
});

/// PEM private key blocks.
pub static PRIVATE_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)-----BEGIN ([A-Z ]+ )?PRIVATE KEY-----.*?-----END ([A-Z ]+ )?PRIVATE KEY-----")
        .unwrap()
});

/// Check if a key name looks like it contains a secret.
pub fn is_sensitive_key(key: &str) -> bool {
    SECRET_KEY_PATTERN.is_match(key)
}

/// All patterns that should trigger redaction.
pub fn all_redaction_patterns() -> Vec<(&'static str, &'static Regex)> {
    vec![
        ("private_key", &PRIVATE_KEY_PATTERN),
        ("url_credentials", &URL_CREDENTIALS_PATTERN),
        ("inline_assignment", &INLINE_ASSIGNMENT_PATTERN),
        ("conninfo_password", &CONNINFO_PASSWORD_PATTERN),
        ("password_flag", &PASSWORD_FLAG_PATTERN),
        ("auth_header", &AUTH_HEADER_PATTERN),
    ]
}
