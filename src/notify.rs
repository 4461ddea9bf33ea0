//! Status change notifications.
//!
//! The scheduler hands changes to a [`NotificationDispatcher`], which queues
//! them for a single background worker. Delivery outcome never flows back to
//! the caller.

use chrono::Utc;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::db::ServiceStatus;

/// Queue size used by the daemon.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Notification error types.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned status {0}")]
    Status(u16),
}

/// A change in a target's coarse status between two consecutive checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub target_name: String,
    pub address: String,
    pub old_status: ServiceStatus,
    pub new_status: ServiceStatus,
    /// Latency of the check that triggered the change.
    pub latency: Duration,
}

/// Delivers status changes to the outside world.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, change: &StatusChange) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Posts status changes to a Discord webhook.
pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
        }
    }
}

impl Notifier for DiscordNotifier {
    async fn notify(&self, change: &StatusChange) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&discord_payload(change))
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

fn discord_payload(change: &StatusChange) -> serde_json::Value {
    let color = match change.new_status {
        ServiceStatus::Operational => 0x00FF00,
        ServiceStatus::Degraded => 0xFFFF00,
        ServiceStatus::Outage => 0xFF0000,
    };

    json!({
        "username": "Uptime Engine",
        "embeds": [{
            "title": format!("Status Change: {}", change.target_name),
            "description": format!(
                "Service **{}** ({}) is now **{}**.\nPrevious status: {}\nLatency: {:?}",
                change.target_name, change.address, change.new_status, change.old_status, change.latency
            ),
            "color": color,
            "timestamp": Utc::now().to_rfc3339(),
        }],
    })
}

/// Logs status changes; used when no webhook is configured.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, change: &StatusChange) -> Result<(), NotifyError> {
        tracing::info!(
            "{} ({}) changed from {} to {} (latency {:?})",
            change.target_name,
            change.address,
            change.old_status,
            change.new_status,
            change.latency
        );
        Ok(())
    }
}

/// Handle for enqueuing status changes without waiting on delivery.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<StatusChange>,
}

impl NotificationDispatcher {
    /// Start the delivery worker. It exits once every handle is dropped and
    /// the queue is drained.
    pub fn spawn<N: Notifier>(notifier: N, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_notifier(rx, notifier));
        (Self { tx }, worker)
    }

    /// Queue a change for delivery. Never blocks; drops the change if the
    /// queue is full or the worker is gone.
    pub fn dispatch(&self, change: StatusChange) {
        match self.tx.try_send(change) {
            Ok(()) => {}
            Err(TrySendError::Full(change)) => {
                tracing::warn!("Notification queue full, dropping change for {}", change.target_name);
            }
            Err(TrySendError::Closed(change)) => {
                tracing::warn!("Notifier stopped, dropping change for {}", change.target_name);
            }
        }
    }
}

async fn run_notifier<N: Notifier>(mut rx: mpsc::Receiver<StatusChange>, notifier: N) {
    while let Some(change) = rx.recv().await {
        if let Err(e) = notifier.notify(&change).await {
            tracing::warn!("Failed to deliver notification for {}: {}", change.target_name, e);
        }
    }
    tracing::debug!("Notification worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FailingNotifier, RecordingNotifier};
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    fn change(old: ServiceStatus, new: ServiceStatus) -> StatusChange {
        StatusChange {
            target_name: "API".to_string(),
            address: "https://api.example.com".to_string(),
            old_status: old,
            new_status: new,
            latency: Duration::from_millis(42),
        }
    }

    #[test]
    fn test_discord_payload() {
        let payload = discord_payload(&change(ServiceStatus::Operational, ServiceStatus::Outage));
        let embed = &payload["embeds"][0];

        assert_eq!(embed["title"], "Status Change: API");
        assert_eq!(embed["color"], 0xFF0000);
        let description = embed["description"].as_str().unwrap();
        assert!(description.contains("is now **outage**"));
        assert!(description.contains("Previous status: operational"));
        assert!(description.contains("https://api.example.com"));
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_in_order() {
        let notifier = RecordingNotifier::default();
        let (dispatcher, worker) = NotificationDispatcher::spawn(notifier.clone(), 8);

        dispatcher.dispatch(change(ServiceStatus::Operational, ServiceStatus::Outage));
        dispatcher.dispatch(change(ServiceStatus::Outage, ServiceStatus::Operational));
        drop(dispatcher);
        worker.await.unwrap();

        let changes = notifier.changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].new_status, ServiceStatus::Outage);
        assert_eq!(changes[1].new_status, ServiceStatus::Operational);
    }

    #[tokio::test]
    async fn test_dispatcher_drops_when_full() {
        let notifier = RecordingNotifier::default();
        let (dispatcher, worker) = NotificationDispatcher::spawn(notifier.clone(), 1);

        // The worker cannot run until this task yields, so only the first
        // change fits in the queue.
        for _ in 0..3 {
            dispatcher.dispatch(change(ServiceStatus::Operational, ServiceStatus::Outage));
        }
        drop(dispatcher);
        worker.await.unwrap();

        assert_eq!(notifier.changes().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatcher_swallows_failures() {
        let (dispatcher, worker) = NotificationDispatcher::spawn(FailingNotifier, 4);
        dispatcher.dispatch(change(ServiceStatus::Operational, ServiceStatus::Degraded));
        drop(dispatcher);
        tokio_test::assert_ok!(worker.await);
    }

    #[tokio::test]
    async fn test_discord_notifier_posts_payload() {
        let received = Arc::new(Mutex::new(Vec::<serde_json::Value>::new()));
        let router = Router::new()
            .route(
                "/hook",
                post(
                    |State(received): State<Arc<Mutex<Vec<serde_json::Value>>>>,
                     Json(body): Json<serde_json::Value>| async move {
                        received.lock().unwrap().push(body);
                        StatusCode::NO_CONTENT
                    },
                ),
            )
            .route("/broken", post(|| async { StatusCode::BAD_REQUEST }))
            .with_state(received.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let notifier = DiscordNotifier::new(format!("http://{}/hook", addr));
        notifier
            .notify(&change(ServiceStatus::Outage, ServiceStatus::Operational))
            .await
            .unwrap();
        {
            let received = received.lock().unwrap();
            assert_eq!(received.len(), 1);
            assert_eq!(received[0]["embeds"][0]["color"], 0x00FF00);
        }

        let broken = DiscordNotifier::new(format!("http://{}/broken", addr));
        let result = broken
            .notify(&change(ServiceStatus::Outage, ServiceStatus::Operational))
            .await;
        assert!(matches!(result, Err(NotifyError::Status(400))));
    }
}
