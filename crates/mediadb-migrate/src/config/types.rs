//! Configuration type definitions.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for one migration invocation.
///
/// Every field may come from a YAML file; the CLI layers environment
/// variables and flags on top before calling [`MigrationConfig::validate`].
#[derive(Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Connection string of the legacy mediadb database.
    #[serde(default)]
    pub old_dsn: String,

    /// Connection string of the target movies database.
    #[serde(default)]
    pub new_dsn: String,

    /// Phase or composite phase to run (default: "refs").
    #[serde(default = "default_phase")]
    pub phase: String,

    /// Read and count everything, write nothing.
    #[serde(default)]
    pub dry_run: bool,

    /// Emit a progress line every N rows (default: 50000).
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,

    /// Emit a progress line at least this often, in seconds (default: 10).
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,

    /// Upper bound for the whole invocation in seconds; 0 disables (default: 86400).
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,

    /// How many unmapped ids or data-quality warnings to log per table (default: 20).
    #[serde(default = "default_missing_log_limit")]
    pub missing_log_limit: usize,

    /// Pool size per store (default: 2).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            old_dsn: String::new(),
            new_dsn: String::new(),
            phase: default_phase(),
            dry_run: false,
            progress_every: default_progress_every(),
            progress_interval_secs: default_progress_interval_secs(),
            max_duration_secs: default_max_duration_secs(),
            missing_log_limit: default_missing_log_limit(),
            max_connections: default_max_connections(),
        }
    }
}

impl MigrationConfig {
    /// Progress reporting interval.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    /// Invocation upper bound, if any.
    pub fn max_duration(&self) -> Option<Duration> {
        match self.max_duration_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl fmt::Debug for MigrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationConfig")
            .field("old_dsn", &redact_dsn(&self.old_dsn))
            .field("new_dsn", &redact_dsn(&self.new_dsn))
            .field("phase", &self.phase)
            .field("dry_run", &self.dry_run)
            .field("progress_every", &self.progress_every)
            .field("progress_interval_secs", &self.progress_interval_secs)
            .field("max_duration_secs", &self.max_duration_secs)
            .field("missing_log_limit", &self.missing_log_limit)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Hide the password in a key/value or URL connection string.
pub fn redact_dsn(dsn: &str) -> String {
    if let Some(scheme_end) = dsn.find("://") {
        redact_url(dsn, scheme_end)
    } else {
        redact_key_values(dsn)
    }
}

fn redact_url(dsn: &str, scheme_end: usize) -> String {
    let (base, query) = match dsn.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (dsn, None),
    };

    let rest = &base[scheme_end + 3..];
    let auth_end = rest.find('/').unwrap_or(rest.len());
    let mut out = match rest[..auth_end].rfind('@') {
        Some(at) => match rest[..at].find(':') {
            Some(colon) => format!(
                "{}{}:***{}",
                &base[..scheme_end + 3],
                &rest[..colon],
                &rest[at..]
            ),
            None => base.to_string(),
        },
        None => base.to_string(),
    };

    if let Some(query) = query {
        let params: Vec<_> = query
            .split('&')
            .map(|param| match param.split_once('=') {
                Some((key, _)) if key.eq_ignore_ascii_case("password") => format!("{}=***", key),
                _ => param.to_string(),
            })
            .collect();
        out.push('?');
        out.push_str(&params.join("&"));
    }
    out
}

/// libpq `key = value` syntax: blanks are allowed around `=`, values may be
/// single-quoted and backslash escapes apply in both forms.
fn redact_key_values(dsn: &str) -> String {
    let mut chars = dsn.chars().peekable();
    let mut parts = Vec::new();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != '=') {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next_if_eq(&'=').is_none() {
            // Not a key/value pair; nothing after it can be trusted.
            parts.push("***".to_string());
            break;
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        let quoted = chars.next_if_eq(&'\'').is_some();
        if quoted {
            value.push('\'');
        }
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    value.push(c);
                    if let Some(escaped) = chars.next() {
                        value.push(escaped);
                    }
                }
                '\'' if quoted => {
                    value.push(c);
                    break;
                }
                c if c.is_whitespace() && !quoted => break,
                c => value.push(c),
            }
        }

        if key.eq_ignore_ascii_case("password") {
            parts.push(format!("{}=***", key));
        } else {
            parts.push(format!("{}={}", key, value));
        }
    }

    parts.join(" ")
}

fn default_phase() -> String {
    "refs".to_string()
}

fn default_progress_every() -> u64 {
    50_000
}

fn default_progress_interval_secs() -> u64 {
    10
}

fn default_max_duration_secs() -> u64 {
    24 * 60 * 60
}

fn default_missing_log_limit() -> usize {
    20
}

fn default_max_connections() -> usize {
    2
}
