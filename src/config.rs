//! Configuration module.
//!
//! Server settings come from environment variables with sensible defaults.
//! Targets and notification settings come from a YAML file that is read and
//! validated once at startup.

use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::db::Target;
use crate::probe::ProbeMethod;

/// Configuration error types. All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("target #{index}: missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },
    #[error("duplicate target id `{0}`")]
    DuplicateId(String),
    #[error("target `{id}`: invalid {field} `{value}`")]
    InvalidDuration {
        id: String,
        field: &'static str,
        value: String,
    },
    #[error("discord notifications enabled without a webhook_url")]
    MissingWebhook,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the API server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "uptime.db")
    pub db_path: String,
    /// Path to the YAML monitor configuration (default: "config.yaml")
    pub config_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "uptime.db".to_string(),
            config_path: "config.yaml".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `UPTIME_HTTP_PORT`: HTTP port (default: 8080)
    /// - `UPTIME_DB_PATH`: Database file path (default: "uptime.db")
    /// - `UPTIME_CONFIG`: Monitor configuration file (default: "config.yaml")
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("UPTIME_HTTP_PORT") {
            match port_str.parse() {
                Ok(port) => cfg.http_port = port,
                Err(_) => tracing::warn!("Ignoring invalid UPTIME_HTTP_PORT {:?}", port_str),
            }
        }

        if let Ok(db_path) = env::var("UPTIME_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Ok(config_path) = env::var("UPTIME_CONFIG") {
            cfg.config_path = config_path;
        }

        cfg
    }
}

/// Discord webhook settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
}

/// Validated monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub targets: Vec<Target>,
    pub discord: DiscordConfig,
}

/// A duration as written in the file: bare seconds or `<n><unit>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawTarget {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    interval: Option<RawDuration>,
    #[serde(default)]
    timeout: Option<RawDuration>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    targets: Vec<RawTarget>,
    #[serde(default)]
    discord: DiscordConfig,
}

impl MonitorConfig {
    /// Read and validate the YAML file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(contents)?;

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(raw.targets.len());
        for (index, raw_target) in raw.targets.into_iter().enumerate() {
            let target = target_from_raw(index, raw_target)?;
            if !seen.insert(target.id.clone()) {
                return Err(ConfigError::DuplicateId(target.id));
            }
            targets.push(target);
        }

        if raw.discord.enabled && raw.discord.webhook_url.trim().is_empty() {
            return Err(ConfigError::MissingWebhook);
        }

        Ok(Self {
            targets,
            discord: raw.discord,
        })
    }
}

/// Validate one target and apply defaults.
fn target_from_raw(index: usize, raw: RawTarget) -> Result<Target, ConfigError> {
    let id = required(index, "id", raw.id)?;
    let name = required(index, "name", raw.name)?;
    let url = required(index, "url", raw.url)?;

    let method = match raw.method.as_deref().map(str::trim) {
        None | Some("") => ProbeMethod::Http,
        Some(other) => ProbeMethod::parse(other),
    };

    let interval = optional_duration(&id, "interval", raw.interval)?;
    let timeout = optional_duration(&id, "timeout", raw.timeout)?;

    Ok(Target::new(id, name, url, method, interval, timeout))
}

fn required(index: usize, field: &'static str, value: String) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::MissingField { index, field });
    }
    Ok(value.to_string())
}

/// Unset and zero both mean "use the default", which `Target::new` applies.
fn optional_duration(
    id: &str,
    field: &'static str,
    raw: Option<RawDuration>,
) -> Result<Duration, ConfigError> {
    match raw {
        None => Ok(Duration::ZERO),
        Some(RawDuration::Seconds(secs)) => Ok(Duration::from_secs(secs)),
        Some(RawDuration::Text(text)) => parse_duration(&text).ok_or_else(|| ConfigError::InvalidDuration {
            id: id.to_string(),
            field,
            value: text,
        }),
    }
}

/// Parse a bare number of seconds or a sequence of `<n><unit>` segments
/// such as `"250ms"`, `"1m30s"` or `"1.5h"`.
///
/// Units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A non-zero value
/// too small to represent in nanoseconds is rejected rather than read as zero.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return segment_nanos(text, 1_000_000_000).map(Duration::from_nanos);
    }

    let mut rest = text;
    let mut total: u64 = 0;
    while !rest.is_empty() {
        let number_len = rest.find(|c: char| !c.is_ascii_digit() && c != '.')?;
        if number_len == 0 {
            return None;
        }
        let (number, tail) = rest.split_at(number_len);
        let unit_len = tail.find(|c: char| c.is_ascii_digit() || c == '.').unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);

        let unit_nanos = match unit {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            _ => return None,
        };
        total = total.checked_add(segment_nanos(number, unit_nanos)?)?;
        rest = next;
    }

    Some(Duration::from_nanos(total))
}

/// `number` scaled by `unit_nanos`, rounded to whole nanoseconds.
fn segment_nanos(number: &str, unit_nanos: u64) -> Option<u64> {
    let value: f64 = number.parse().ok()?;
    let nanos = (value * unit_nanos as f64).round();
    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        return None;
    }
    if value > 0.0 && nanos < 1.0 {
        return None;
    }
    Some(nanos as u64)
}
