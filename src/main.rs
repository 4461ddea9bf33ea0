//! Uptime Engine - endpoint monitoring daemon.
//!
//! Polls every configured target on its own timer, logs each check to
//! SQLite, keeps a live status per target and reports status changes.

mod cache;
mod config;
mod db;
mod notify;
mod probe;
mod scheduler;
mod status;
mod web;

#[cfg(test)]
mod testutil;

use cache::StatusCache;
use config::{MonitorConfig, ServerConfig};
use db::Store;
use notify::{DiscordNotifier, LogNotifier, NotificationDispatcher, DEFAULT_QUEUE_CAPACITY};
use scheduler::{CheckRecorder, Scheduler};
use status::StatusService;
use web::Server;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound on waiting for polling loops and pending notifications.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("uptime_engine=info".parse()?))
        .init();

    // Load configuration; any error here is fatal before polling starts
    let cfg = ServerConfig::load();
    let monitor = MonitorConfig::load(&cfg.config_path)?;
    tracing::info!("Loaded {} targets from {}", monitor.targets.len(), cfg.config_path);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let cache = Arc::new(StatusCache::new(&monitor.targets));

    let (notifications, notifier_worker) = if monitor.discord.enabled {
        tracing::info!("Discord notifications enabled");
        NotificationDispatcher::spawn(
            DiscordNotifier::new(monitor.discord.webhook_url.clone()),
            DEFAULT_QUEUE_CAPACITY,
        )
    } else {
        NotificationDispatcher::spawn(LogNotifier, DEFAULT_QUEUE_CAPACITY)
    };

    // Start scheduler
    let shutdown = CancellationToken::new();
    let recorder = CheckRecorder::new(store.clone(), cache.clone(), notifications);
    let scheduler = Scheduler::new(monitor.targets, recorder, shutdown.child_token());
    scheduler.start();

    tokio::spawn(wait_for_signal(shutdown.clone()));

    // Serve until a signal arrives
    let server = Server::new(cfg, StatusService::new(store, cache));
    let served = server.start(shutdown.clone()).await;
    shutdown.cancel();

    if tokio::time::timeout(SHUTDOWN_GRACE, scheduler.shutdown()).await.is_err() {
        tracing::warn!("Timed out waiting for in-flight probes");
    }

    // Dropping the last dispatcher handle lets the worker drain and exit.
    drop(scheduler);
    if tokio::time::timeout(SHUTDOWN_GRACE, notifier_worker).await.is_err() {
        tracing::warn!("Timed out delivering pending notifications");
    }

    tracing::info!("Server exiting");
    served
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutting down...");
    shutdown.cancel();
}
