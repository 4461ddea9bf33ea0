//! HTTP request handlers.

use super::AppState;
use crate::db::{CheckEvent, Outcome};
use crate::status::{QueryError, DEFAULT_HISTORY_LIMIT};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest history a single request may ask for.
pub const MAX_HISTORY_LIMIT: usize = 1000;

// ============================================================================
// API: Status
// ============================================================================

pub async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.status.current_statuses() {
        Ok(services) => Json(services).into_response(),
        Err(e) => {
            tracing::error!("Failed to build status view: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

// ============================================================================
// API: History
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub target_id: String,
    pub timestamp: DateTime<Utc>,
    pub latency_ns: u64,
    /// Outcome code, the same value used for heartbeats.
    pub status: u8,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<CheckEvent> for HistoryEntry {
    fn from(event: CheckEvent) -> Self {
        Self {
            target_id: event.target_id,
            timestamp: event.time,
            latency_ns: u64::try_from(event.latency.as_nanos()).unwrap_or(u64::MAX),
            status: event.outcome.code(),
            outcome: event.outcome,
            error: event.error,
        }
    }
}

pub async fn handle_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);

    match state.status.history(&id, limit) {
        Ok(events) => {
            let entries: Vec<HistoryEntry> = events.into_iter().map(HistoryEntry::from).collect();
            Json(entries).into_response()
        }
        Err(QueryError::UnknownTarget(_)) => (StatusCode::NOT_FOUND, "Target not found").into_response(),
        Err(e) => {
            tracing::error!("Failed to load history for {}: {}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
