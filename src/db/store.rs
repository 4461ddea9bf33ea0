//! SQLite event log implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Result as SqlResult, Row};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Duration;
use thiserror::Error;

use super::models::*;

mod embedded {
    refinery::embed_migrations!("migrations");
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";
const READER_POOL_SIZE: usize = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] refinery::Error),
    #[error("connection lock poisoned")]
    Poisoned,
}

/// Append-only log of check events.
///
/// Appends go through a single writer connection; queries use a small pool
/// of reader connections so they never wait on the writer. The database runs
/// in WAL mode, so a query sees a committed snapshot and never a partial row.
pub struct Store {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl Store {
    /// Open (or create) the store at the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref();

        let mut writer = open_connection(path)?;
        writer.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        writer.pragma_update(None, "synchronous", "NORMAL")?;
        embedded::migrations::runner().run(&mut writer)?;

        let readers = (0..READER_POOL_SIZE)
            .map(|_| open_connection(path).map(Mutex::new))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Opened event log at {}", path.display());

        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.writer.lock().map_err(|_| DbError::Poisoned)
    }

    /// Pick a reader connection, preferring an idle one.
    fn reader(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        let start = self.next_reader.fetch_add(1, Ordering::Relaxed);
        for i in 0..self.readers.len() {
            match self.readers[(start + i) % self.readers.len()].try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(_)) => return Err(DbError::Poisoned),
            }
        }
        self.readers[start % self.readers.len()]
            .lock()
            .map_err(|_| DbError::Poisoned)
    }

    /// Durably record one check event.
    pub fn append(&self, event: &CheckEvent) -> Result<(), DbError> {
        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO checks (target_id, time, latency_ns, outcome, error) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.target_id,
                format_db_time(event.time),
                duration_to_nanos(event.latency),
                event.outcome,
                event.error,
            ],
        )?;
        Ok(())
    }

    /// Up to `limit` most recent events for a target, oldest first.
    pub fn recent(&self, target_id: &str, limit: usize) -> Result<Vec<CheckEvent>, DbError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.reader()?;
        let mut stmt = conn.prepare_cached(
            "SELECT target_id, time, latency_ns, outcome, error FROM checks
             WHERE target_id = ?1 ORDER BY time DESC, id DESC LIMIT ?2",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut events = stmt
            .query_map(params![target_id, limit], event_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        events.reverse();

        Ok(events)
    }

    /// Percentage of events at or after `since` that were not unreachable.
    ///
    /// An empty window yields 0.
    pub fn uptime_ratio(&self, target_id: &str, since: DateTime<Utc>) -> Result<f64, DbError> {
        let conn = self.reader()?;
        let (up, total): (i64, i64) = conn.query_row(
            "SELECT COUNT(CASE WHEN outcome != ?3 THEN 1 END), COUNT(*) FROM checks
             WHERE target_id = ?1 AND time >= ?2",
            params![target_id, format_db_time(since), Outcome::Unreachable],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if total == 0 {
            return Ok(0.0);
        }
        Ok(up as f64 / total as f64 * 100.0)
    }

    /// Mean latency of non-unreachable events at or after `since`.
    ///
    /// An empty window yields zero.
    pub fn average_latency(&self, target_id: &str, since: DateTime<Utc>) -> Result<Duration, DbError> {
        let conn = self.reader()?;
        let avg: Option<f64> = conn.query_row(
            "SELECT AVG(latency_ns) FROM checks
             WHERE target_id = ?1 AND time >= ?2 AND outcome != ?3",
            params![target_id, format_db_time(since), Outcome::Unreachable],
            |row| row.get(0),
        )?;

        Ok(avg
            .filter(|ns| ns.is_finite() && *ns > 0.0)
            .map(|ns| Duration::from_nanos(ns.round() as u64))
            .unwrap_or(Duration::ZERO))
    }
}

fn open_connection(path: &Path) -> Result<Connection, DbError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn event_from_row(row: &Row<'_>) -> SqlResult<CheckEvent> {
    let time_str: String = row.get(1)?;
    let time = parse_db_time(&time_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("invalid timestamp: {}", time_str).into(),
        )
    })?;
    let latency_ns: i64 = row.get(2)?;

    Ok(CheckEvent {
        target_id: row.get(0)?,
        time,
        latency: Duration::from_nanos(u64::try_from(latency_ns).unwrap_or(0)),
        outcome: row.get(3)?,
        error: row.get(4)?,
    })
}

fn duration_to_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

fn format_db_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
