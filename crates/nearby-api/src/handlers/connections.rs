//! /connections handlers — connection attempts and cancelling them.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use nearby_services::{AttemptId, ConnectionAttempt, ConnectionStatus};

use super::{node_error, ApiState};

#[derive(Serialize)]
pub struct ConnectionInfo {
    pub id: u64,
    pub peer: String,
    pub status: ConnectionStatus,
    pub history: Vec<ConnectionStatus>,
    pub interface: Option<String>,
    pub peer_addr: Option<String>,
    pub age_secs: u64,
    pub cancel_requested: bool,
}

impl From<ConnectionAttempt> for ConnectionInfo {
    fn from(a: ConnectionAttempt) -> Self {
        Self {
            id: a.id.raw(),
            status: a.status,
            interface: a.network.as_ref().map(|n| n.interface.clone()),
            peer_addr: a.network.as_ref().map(|n| n.peer_addr.to_string()),
            age_secs: a.requested_at.elapsed().as_secs(),
            cancel_requested: a.cancel_requested,
            history: a.history,
            peer: a.peer,
        }
    }
}

// ── /connections ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ConnectionsResponse {
    pub connections: Vec<ConnectionInfo>,
}

pub async fn handle_connections(State(state): State<ApiState>) -> Json<ConnectionsResponse> {
    let connections = state
        .node
        .connections()
        .attempts()
        .into_iter()
        .map(ConnectionInfo::from)
        .collect();

    Json(ConnectionsResponse { connections })
}

// ── /connections/{id} ─────────────────────────────────────────────────────────

pub async fn handle_connection_inspect(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> Result<Json<ConnectionInfo>, (StatusCode, String)> {
    let attempt = state
        .node
        .connections()
        .attempt(AttemptId::from_raw(id))
        .ok_or((StatusCode::NOT_FOUND, "connection attempt not found".to_string()))?;

    Ok(Json(attempt.into()))
}

// ── /connections/{id}/cancel (POST) ───────────────────────────────────────────

#[derive(Serialize)]
pub struct CancelResponse {
    pub id: u64,
    /// False when the attempt had already finished.
    pub cancelled: bool,
}

pub async fn handle_cancel(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> Result<Json<CancelResponse>, (StatusCode, String)> {
    let cancelled = state
        .node
        .cancel(AttemptId::from_raw(id))
        .map_err(node_error)?;

    if cancelled {
        tracing::info!(attempt = id, "connection cancelled via API");
    }

    Ok(Json(CancelResponse { id, cancelled }))
}
