//! Read path: current statuses with derived fields, and per-target history.

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::StatusCache;
use crate::db::{CheckEvent, DbError, ServiceStatus, Store};

/// Number of recent outcomes included for sparkline display.
pub const HEARTBEAT_COUNT: usize = 20;
/// History length when the caller does not ask for one.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
/// Trailing window for uptime and average latency, in hours.
pub const UPTIME_WINDOW_HOURS: i64 = 24;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("unknown target: {0}")]
    UnknownTarget(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// One target's live status combined with values derived from the log.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceView {
    pub id: String,
    pub name: String,
    /// Uptime over the trailing window, e.g. `"99.98%"`.
    pub uptime: String,
    pub status: ServiceStatus,
    /// Latency of the last check in milliseconds.
    pub latency: f64,
    /// Mean latency of reachable checks over the trailing window, in milliseconds.
    pub average_latency: f64,
    /// Outcome codes of the most recent checks, oldest first.
    pub heartbeats: Vec<u8>,
}

/// Status and history queries over the cache and the event log.
#[derive(Clone)]
pub struct StatusService {
    store: Arc<Store>,
    cache: Arc<StatusCache>,
}

impl StatusService {
    pub fn new(store: Arc<Store>, cache: Arc<StatusCache>) -> Self {
        Self { store, cache }
    }

    /// Every target's current status, in configuration order.
    pub fn current_statuses(&self) -> Result<Vec<ServiceView>, DbError> {
        let since = Utc::now() - ChronoDuration::hours(UPTIME_WINDOW_HOURS);

        self.cache
            .snapshot_all()
            .into_iter()
            .map(|record| -> Result<ServiceView, DbError> {
                let uptime = self.store.uptime_ratio(&record.id, since)?;
                let average = self.store.average_latency(&record.id, since)?;
                let heartbeats = self
                    .store
                    .recent(&record.id, HEARTBEAT_COUNT)?
                    .into_iter()
                    .map(|event| event.outcome.code())
                    .collect();

                Ok(ServiceView {
                    uptime: format!("{:.2}%", uptime),
                    status: record.status,
                    latency: as_millis(record.latency),
                    average_latency: as_millis(average),
                    heartbeats,
                    id: record.id,
                    name: record.name,
                })
            })
            .collect()
    }

    /// The last `limit` events of one target, oldest first.
    pub fn history(&self, target_id: &str, limit: usize) -> Result<Vec<CheckEvent>, QueryError> {
        if !self.cache.contains(target_id) {
            return Err(QueryError::UnknownTarget(target_id.to_string()));
        }
        Ok(self.store.recent(target_id, limit)?)
    }
}

fn as_millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Outcome, Target};
    use crate::probe::ProbeMethod;
    use tempfile::NamedTempFile;

    fn setup() -> (NamedTempFile, Arc<Store>, Arc<StatusCache>, StatusService) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let targets = [
            Target::new("web", "Website", "https://example.com", ProbeMethod::Http, Duration::ZERO, Duration::ZERO),
            Target::new("db", "Database", "db.internal:5432", ProbeMethod::Tcp, Duration::ZERO, Duration::ZERO),
        ];
        let cache = Arc::new(StatusCache::new(&targets));
        let service = StatusService::new(store.clone(), cache.clone());
        (tmp, store, cache, service)
    }

    fn append(store: &Store, id: &str, outcome: Outcome, latency_ms: u64) {
        store
            .append(&CheckEvent {
                target_id: id.to_string(),
                time: Utc::now(),
                latency: Duration::from_millis(latency_ms),
                outcome,
                error: None,
            })
            .unwrap();
    }

    #[test]
    fn test_current_statuses() {
        let (_tmp, store, cache, service) = setup();
        append(&store, "web", Outcome::Healthy, 100);
        append(&store, "web", Outcome::Healthy, 300);
        append(&store, "web", Outcome::Degraded, 200);
        append(&store, "web", Outcome::Unreachable, 5000);
        cache.upsert("web", ServiceStatus::Outage, Duration::from_millis(5000));

        let views = service.current_statuses().unwrap();
        assert_eq!(views.len(), 2);

        let web = &views[0];
        assert_eq!(web.id, "web");
        assert_eq!(web.name, "Website");
        assert_eq!(web.uptime, "75.00%");
        assert_eq!(web.status, ServiceStatus::Outage);
        assert_eq!(web.latency, 5000.0);
        assert_eq!(web.average_latency, 200.0);
        assert_eq!(web.heartbeats, vec![0, 0, 1, 2]);

        let db = &views[1];
        assert_eq!(db.uptime, "0.00%");
        assert_eq!(db.status, ServiceStatus::Operational);
        assert!(db.heartbeats.is_empty());
    }

    #[test]
    fn test_heartbeats_are_capped() {
        let (_tmp, store, _cache, service) = setup();
        for _ in 0..HEARTBEAT_COUNT + 5 {
            append(&store, "db", Outcome::Healthy, 1);
        }
        let views = service.current_statuses().unwrap();
        assert_eq!(views[1].heartbeats.len(), HEARTBEAT_COUNT);
    }

    #[test]
    fn test_history() {
        let (_tmp, store, _cache, service) = setup();
        for ms in [1, 2, 3] {
            append(&store, "db", Outcome::Healthy, ms);
        }

        let history = service.history("db", 2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].latency, Duration::from_millis(3));

        assert!(service.history("web", 10).unwrap().is_empty());
        assert!(matches!(service.history("nope", 10), Err(QueryError::UnknownTarget(_))));
    }
}
