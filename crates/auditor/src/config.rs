//! Interceptor configuration.
//!
//! [`AuditConfig`] is the raw, deserializable configuration. It uses the
//! field names `remoteServer`, `ignoreHeaders` and `timeout`, so the same
//! document works from JSON, YAML or TOML. [`AuditConfig::validate`] turns it
//! into the immutable [`AuditSettings`] the interceptor runs with.
//!
//! # Example
//!
//! ```ignore
//! use auditor::AuditConfig;
//!
//! let config = AuditConfig::new("https://collector.internal/audit")
//!     .ignore_header("Authorization")
//!     .ignore_header("Cookie")
//!     .timeout("2s");
//!
//! // Or from AUDITOR_REMOTE_SERVER, AUDITOR_IGNORE_HEADERS, AUDITOR_TIMEOUT
//! auditor::config::load_dotenv();
//! let config = AuditConfig::from_env()?;
//! ```

use crate::error::ConfigError;
use crate::filter::RedactionList;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of the environment variables read by [`AuditConfig::from_env`].
pub const ENV_PREFIX: &str = "AUDITOR_";

/// Delivery timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw interceptor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Collector endpoint receiving one POST per record. Required.
    #[serde(rename = "remoteServer", alias = "remote_server")]
    pub remote_server: String,

    /// Header names left out of every snapshot, matched case-insensitively.
    #[serde(rename = "ignoreHeaders", alias = "ignore_headers")]
    pub ignore_headers: Vec<String>,

    /// Delivery timeout as a duration string such as `"5s"` or `"1m30s"`.
    pub timeout: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            remote_server: String::new(),
            ignore_headers: Vec::new(),
            timeout: "5s".to_string(),
        }
    }
}

impl AuditConfig {
    /// Create a configuration for the given collector endpoint.
    pub fn new(remote_server: impl Into<String>) -> Self {
        Self {
            remote_server: remote_server.into(),
            ..Self::default()
        }
    }

    /// Add a header name to redact.
    pub fn ignore_header(mut self, name: impl Into<String>) -> Self {
        self.ignore_headers.push(name.into());
        self
    }

    /// Set the delivery timeout string.
    pub fn timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Load from `AUDITOR_*` environment variables.
    ///
    /// `AUDITOR_IGNORE_HEADERS` is a comma separated list. Unset variables
    /// keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::prefixed(ENV_PREFIX).from_env::<Self>()?)
    }

    /// Check the configuration and produce the settings the interceptor uses.
    pub fn validate(&self) -> Result<AuditSettings, ConfigError> {
        let remote = self.remote_server.trim();
        if remote.is_empty() {
            return Err(ConfigError::MissingRemoteServer);
        }

        let endpoint = Url::parse(remote).map_err(|e| ConfigError::InvalidRemoteServer {
            url: remote.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidRemoteServer {
                url: remote.to_string(),
                reason: format!("unsupported scheme '{}'", endpoint.scheme()),
            });
        }

        let timeout = if self.timeout.trim().is_empty() {
            DEFAULT_TIMEOUT
        } else {
            parse_duration(&self.timeout).map_err(|reason| ConfigError::InvalidTimeout {
                value: self.timeout.clone(),
                reason,
            })?
        };

        Ok(AuditSettings {
            endpoint,
            redaction: RedactionList::new(&self.ignore_headers),
            // A zero timeout disables the limit.
            timeout: (!timeout.is_zero()).then_some(timeout),
        })
    }
}

/// Validated configuration, read-only for the life of the interceptor.
#[derive(Debug, Clone)]
pub struct AuditSettings {
    endpoint: Url,
    redaction: RedactionList,
    timeout: Option<Duration>,
}

impl AuditSettings {
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn redaction(&self) -> &RedactionList {
        &self.redaction
    }

    /// Per-delivery timeout; `None` when the configured value was zero.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Load a `.env` file from the current directory or its parents.
///
/// Returns the path that was loaded, if any. A missing file is not an error.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Load a specific `.env` file.
pub fn load_dotenv_from(path: impl AsRef<Path>) -> Result<(), ConfigError> {
    dotenvy::from_path(path.as_ref())?;
    Ok(())
}

/// Parse a duration string in Go syntax.
///
/// A duration is a sequence of decimal numbers, each with an optional
/// fraction and a required unit: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`.
/// Examples: `"300ms"`, `"1.5s"`, `"2h45m"`. A bare `"0"` is accepted.
/// Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);

    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s.starts_with('-') {
        return Err("negative durations are not allowed".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = s;
    let mut total: u128 = 0;

    while !rest.is_empty() {
        let int_len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (int_part, after) = rest.split_at(int_len);

        let (frac_part, after) = match after.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after_dot.len());
                after_dot.split_at(frac_len)
            }
            None => ("", after),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(format!("expected a number at '{}'", rest));
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, next) = after.split_at(unit_len);

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "" => return Err(format!("missing unit in '{}'", s)),
            other => return Err(format!("unknown unit '{}' in '{}'", other, s)),
        };

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| "duration out of range".to_string())?
        };
        let mut nanos = whole
            .checked_mul(unit_nanos)
            .ok_or_else(|| "duration out of range".to_string())?;

        if !frac_part.is_empty() {
            // Digits past nanosecond precision cannot change the result.
            let digits = &frac_part[..frac_part.len().min(18)];
            let fraction: u128 = digits
                .parse()
                .map_err(|_| "duration out of range".to_string())?;
            nanos += fraction * unit_nanos / 10u128.pow(digits.len() as u32);
        }

        total = total
            .checked_add(nanos)
            .filter(|t| *t <= i64::MAX as u128)
            .ok_or_else(|| "duration out of range".to_string())?;
        rest = next;
    }

    Ok(Duration::new(
        (total / 1_000_000_000) as u64,
        (total % 1_000_000_000) as u32,
    ))
}
