//! Credential scrubbing for collected environments.
//!
//! Snapshots record the full process environment, which routinely holds
//! passwords, tokens and connection strings. When redaction is enabled the
//! collector passes every `KEY=VALUE` entry through [`redact_environ_entry`]
//! before it reaches the archive.

use lazy_static::lazy_static;
use regex::Regex;

use crate::constants::REDACTED_VALUE;

lazy_static! {
    /// Variable names whose values are secrets regardless of content
    static ref SENSITIVE_KEY_PATTERN: Regex = Regex::new(
        r"(?i)(passw(or)?d|passwd|secret|token|api[_-]?key|apikey|private[_-]?key|credential|auth|session|cookie|signature|access[_-]?key)"
    ).unwrap();

    /// Patterns for credentials embedded inside otherwise harmless values
    static ref CREDENTIAL_PATTERNS: Vec<(Regex, &'static str)> = vec![
        // Database connection strings
        (Regex::new(r"(?i)(mysql|postgres|postgresql|mongodb|mongodb\+srv|redis|rediss|amqp|mssql|oracle)://([^:/@\s]+):([^@\s]+)@").unwrap(),
         "$1://<REDACTED_USER>:<REDACTED_PASS>@"),

        // Basic auth in URLs
        (Regex::new(r"(https?://)([^:/@\s]+):([^@\s]+)@").unwrap(),
         "$1<REDACTED_USER>:<REDACTED_PASS>@"),

        // Inline key=value secrets, e.g. in option strings
        (Regex::new(r"(?i)(password|passwd|pwd)\s*[:=]\s*([^\s;&]+)").unwrap(),
         "$1=<REDACTED_PASSWORD>"),
    ];
}

/// Scrub credentials embedded in a string.
///
/// # Example
///
/// ```
/// use proc_snapshot::security::credential_scrubber::scrub_credentials;
///
/// let scrubbed = scrub_credentials("postgres://app:hunter2@db:5432/app");
/// assert_eq!(scrubbed, "postgres://<REDACTED_USER>:<REDACTED_PASS>@db:5432/app");
/// ```
pub fn scrub_credentials(input: &str) -> String {
    let mut result = input.to_string();

    for (pattern, replacement) in CREDENTIAL_PATTERNS.iter() {
        result = pattern.replace_all(&result, *replacement).to_string();
    }

    result
}

/// Check if an environment variable name suggests a secret value
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEY_PATTERN.is_match(key)
}

/// Redact one `KEY=VALUE` environment entry.
///
/// Values of sensitive keys are replaced entirely; other values only have
/// embedded credentials scrubbed. Entries without `=` are returned as is.
pub fn redact_environ_entry(entry: &str) -> String {
    let Some((key, value)) = entry.split_once('=') else {
        return entry.to_string();
    };

    if is_sensitive_key(key) && !value.is_empty() {
        format!("{}={}", key, REDACTED_VALUE)
    } else {
        format!("{}={}", key, scrub_credentials(value))
    }
}

/// Redact a whole environment, preserving order
pub fn redact_environ(environ: &[String]) -> Vec<String> {
    environ.iter().map(|entry| redact_environ_entry(entry)).collect()
}
