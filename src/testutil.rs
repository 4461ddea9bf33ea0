//! Shared helpers for unit tests: local stand-ins for remote endpoints.

use axum::{http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use crate::notify::{Notifier, NotifyError, StatusChange};

/// Start a local HTTP server with `/ok`, `/fail` and `/slow` routes.
pub async fn spawn_http_server() -> SocketAddr {
    let router = Router::new()
        .route("/ok", get(|| async { "ok" }))
        .route("/fail", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A local port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Notifier that remembers every change it receives.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    changes: Arc<Mutex<Vec<StatusChange>>>,
}

impl RecordingNotifier {
    pub fn changes(&self) -> Vec<StatusChange> {
        self.changes.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, change: &StatusChange) -> Result<(), NotifyError> {
        self.changes.lock().unwrap().push(change.clone());
        Ok(())
    }
}

/// Notifier whose deliveries always fail.
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    async fn notify(&self, _change: &StatusChange) -> Result<(), NotifyError> {
        Err(NotifyError::Status(500))
    }
}
