//! /peers handlers — discovered peers and connecting to them.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::{node_error, ApiState};

// ── /peers ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
}

#[derive(Serialize)]
pub struct PeerInfo {
    pub name: String,
    pub details: String,
    pub peer_handle: u32,
    pub session: String,
    /// Most recent connection attempt to this peer, if any.
    pub attempt: Option<u64>,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let connections = state.node.connections();
    let peers = state
        .node
        .peers()
        .into_iter()
        .map(|p| PeerInfo {
            attempt: connections.current_for(&p.name).map(|id| id.raw()),
            peer_handle: p.peer_handle.raw(),
            session: p.session.to_string(),
            name: p.name,
            details: p.details,
        })
        .collect();

    Json(PeersResponse { peers })
}

// ── /peers/{name}/connect (POST) ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct ConnectResponse {
    pub peer: String,
    pub attempt: u64,
    pub status: nearby_services::ConnectionStatus,
}

pub async fn handle_connect(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<ConnectResponse>, (StatusCode, String)> {
    let id = state.node.connect(&name).map_err(node_error)?;
    tracing::info!(peer = %name, attempt = %id, "connect requested via API");

    let status = state
        .node
        .connections()
        .status(id)
        .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "attempt vanished".to_string()))?;

    Ok(Json(ConnectResponse {
        peer: name,
        attempt: id.raw(),
        status,
    }))
}
