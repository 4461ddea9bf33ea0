//! Database model types.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::probe::ProbeMethod;

/// Default time between two probes of the same target.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
/// Default upper bound for a single probe.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A monitoring target, validated and immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub address: String,
    pub method: ProbeMethod,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Target {
    /// Build a target, substituting defaults for zero durations.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        method: ProbeMethod,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            method,
            interval: if interval.is_zero() { DEFAULT_INTERVAL } else { interval },
            timeout: if timeout.is_zero() { DEFAULT_TIMEOUT } else { timeout },
        }
    }
}

/// Classification of a single completed check.
///
/// The numeric codes are what gets persisted and what the status view
/// exposes as heartbeat values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Healthy,
    Degraded,
    Unreachable,
}

impl Outcome {
    pub fn code(self) -> u8 {
        match self {
            Outcome::Healthy => 0,
            Outcome::Degraded => 1,
            Outcome::Unreachable => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Outcome::Healthy),
            1 => Some(Outcome::Degraded),
            2 => Some(Outcome::Unreachable),
            _ => None,
        }
    }

    /// Coarse status derived from this single check.
    pub fn status(self) -> ServiceStatus {
        match self {
            Outcome::Healthy => ServiceStatus::Operational,
            Outcome::Degraded => ServiceStatus::Degraded,
            Outcome::Unreachable => ServiceStatus::Outage,
        }
    }
}

impl ToSql for Outcome {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.code())))
    }
}

impl FromSql for Outcome {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_i64()?;
        Outcome::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

/// Coarse status shown to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Operational,
    Degraded,
    Outage,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceStatus::Operational => "operational",
            ServiceStatus::Degraded => "degraded",
            ServiceStatus::Outage => "outage",
        };
        f.write_str(s)
    }
}

/// The immutable record of one completed probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckEvent {
    pub target_id: String,
    /// Wall-clock time the probe started.
    pub time: DateTime<Utc>,
    pub latency: Duration,
    pub outcome: Outcome,
    pub error: Option<String>,
}

/// Latest derived status of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub id: String,
    pub name: String,
    pub status: ServiceStatus,
    pub latency: Duration,
}

impl StatusRecord {
    /// Neutral record installed for every target at startup.
    pub fn initial(target: &Target) -> Self {
        Self {
            id: target.id.clone(),
            name: target.name.clone(),
            status: ServiceStatus::Operational,
            latency: Duration::ZERO,
        }
    }
}
