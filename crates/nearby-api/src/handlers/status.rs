//! /status and /daemon/shutdown handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use nearby_core::permission::Permission;
use nearby_services::{ConnectionStatus, DiscoveryState, SessionRole};

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub service_name: String,
    pub state: DiscoveryState,
    pub role: Option<SessionRole>,
    /// Why the last session failed, if it did.
    pub failure: Option<String>,
    pub peers_discovered: usize,
    pub decode_failures: u64,
    pub missing_permissions: Vec<Permission>,
    pub connections: ConnectionCounts,
}

#[derive(Serialize, Default)]
pub struct ConnectionCounts {
    pub pending: usize,
    pub available: usize,
    pub lost: usize,
    pub unavailable: usize,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let node = &state.node;
    let current = node.current();

    let mut connections = ConnectionCounts::default();
    for attempt in node.connections().attempts() {
        match attempt.status {
            ConnectionStatus::Pending => connections.pending += 1,
            ConnectionStatus::Available => connections.available += 1,
            ConnectionStatus::Lost => connections.lost += 1,
            ConnectionStatus::Unavailable => connections.unavailable += 1,
        }
    }

    Json(StatusResponse {
        service_name: node.service_name().to_string(),
        state: node.state(),
        role: current.as_ref().and_then(|c| c.role()),
        failure: current
            .as_ref()
            .and_then(|c| c.failure())
            .map(|f| f.to_string()),
        peers_discovered: current.as_ref().map_or(0, |c| c.peers().len()),
        decode_failures: current.as_ref().map_or(0, |c| c.decode_failures()),
        missing_permissions: node.missing_permissions(),
        connections,
    })
}

// ── /daemon/shutdown ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown_tx.send(());

    Json(ShutdownResponse {
        message: "Shutdown initiated".to_string(),
    })
}
