//! Scheduler module for running probes and tracking status.

mod classify;

pub use classify::*;

use crate::cache::StatusCache;
use crate::db::{CheckEvent, DbError, Outcome, Store, Target};
use crate::notify::{NotificationDispatcher, StatusChange};
use crate::probe::{run_probe, ProbeConfig, ProbeReport};

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Persists a completed check, updates the cache and raises transitions.
#[derive(Clone)]
pub struct CheckRecorder {
    store: Arc<Store>,
    cache: Arc<StatusCache>,
    notifications: NotificationDispatcher,
}

impl CheckRecorder {
    pub fn new(store: Arc<Store>, cache: Arc<StatusCache>, notifications: NotificationDispatcher) -> Self {
        Self {
            store,
            cache,
            notifications,
        }
    }

    /// Record one completed probe of `target` that started at `started`.
    ///
    /// The cache is updated and transitions are dispatched even when the
    /// event could not be persisted; the persistence error is still returned.
    pub fn record(
        &self,
        target: &Target,
        started: DateTime<Utc>,
        report: ProbeReport,
    ) -> Result<Outcome, DbError> {
        let outcome = classify(&report, target.timeout);
        let latency = report.elapsed;

        if let Err(e) = &report.result {
            tracing::debug!("Probe failed for {}: {}", target.name, e);
        }

        let event = CheckEvent {
            target_id: target.id.clone(),
            time: started,
            latency,
            outcome,
            error: report.result.err().map(|e| e.to_string()),
        };
        let persisted = self.store.append(&event);

        let new_status = outcome.status();
        match self.cache.upsert(&target.id, new_status, latency) {
            Some(old_status) if old_status != new_status => {
                tracing::info!("{} changed from {} to {}", target.name, old_status, new_status);
                self.notifications.dispatch(StatusChange {
                    target_name: target.name.clone(),
                    address: target.address.clone(),
                    old_status,
                    new_status,
                    latency,
                });
            }
            Some(_) => {}
            None => tracing::warn!("No status record for target {}", target.id),
        }

        persisted.map(|()| outcome)
    }
}

/// The main scheduler: one polling loop per target.
pub struct Scheduler {
    targets: Vec<Target>,
    recorder: CheckRecorder,
    cancel: CancellationToken,
    tasks: TaskTracker,
    started: AtomicBool,
}

impl Scheduler {
    /// Create a scheduler whose loops stop when `cancel` fires.
    pub fn new(targets: Vec<Target>, recorder: CheckRecorder, cancel: CancellationToken) -> Self {
        Self {
            targets,
            recorder,
            cancel,
            tasks: TaskTracker::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the polling loop of every target. Each loop probes immediately,
    /// then once per interval.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Scheduler already started");
            return;
        }

        tracing::info!("Starting scheduler with {} targets", self.targets.len());

        for target in &self.targets {
            tracing::info!("Scheduler: Adding target {} ({})", target.name, target.address);
            self.tasks.spawn(run_probe_loop(
                target.clone(),
                self.recorder.clone(),
                self.cancel.clone(),
            ));
        }
        self.tasks.close();
    }

    /// Cancel every loop and wait until all of them have exited.
    ///
    /// In-flight probes are not aborted, so this returns after at most one
    /// probe timeout.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        tracing::info!("Scheduler stopped");
    }
}

/// Run the probe loop for a single target.
///
/// Probes are awaited inline, so checks of one target never overlap.
async fn run_probe_loop(target: Target, recorder: CheckRecorder, cancel: CancellationToken) {
    let config = ProbeConfig::new(target.method, &target.address, target.timeout);

    let mut interval = tokio::time::interval(target.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let started = Utc::now();
                let report = run_probe(&config).await;

                if cancel.is_cancelled() {
                    tracing::debug!("Discarding probe result for {} after shutdown", target.name);
                    break;
                }

                if let Err(e) = recorder.record(&target, started, report) {
                    tracing::error!("Failed to record check for {}: {}", target.name, e);
                }
            }
        }
    }
}
