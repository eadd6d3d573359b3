//! /publish, /subscribe, /teardown handlers — discovery session control.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use nearby_services::{DiscoveryState, SessionCoordinator, SessionRole};

use super::{node_error, ApiState};

#[derive(Serialize)]
pub struct SessionResponse {
    pub role: Option<SessionRole>,
    pub state: DiscoveryState,
    pub service_name: String,
}

fn describe(state: &ApiState, coordinator: &SessionCoordinator) -> SessionResponse {
    SessionResponse {
        role: coordinator.role(),
        state: coordinator.state(),
        service_name: state.node.service_name().to_string(),
    }
}

// ── /publish (POST) ───────────────────────────────────────────────────────────

pub async fn handle_publish(
    State(state): State<ApiState>,
) -> Result<Json<SessionResponse>, (StatusCode, String)> {
    let coordinator = state.node.publish().await.map_err(node_error)?;
    tracing::info!("publish started via API");
    Ok(Json(describe(&state, &coordinator)))
}

// ── /subscribe (POST) ─────────────────────────────────────────────────────────

pub async fn handle_subscribe(
    State(state): State<ApiState>,
) -> Result<Json<SessionResponse>, (StatusCode, String)> {
    let coordinator = state.node.subscribe().await.map_err(node_error)?;
    tracing::info!("subscribe started via API");
    Ok(Json(describe(&state, &coordinator)))
}

// ── /teardown (POST) ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct TeardownResponse {
    pub state: DiscoveryState,
}

pub async fn handle_teardown(State(state): State<ApiState>) -> Json<TeardownResponse> {
    state.node.teardown();
    tracing::info!("discovery torn down via API");
    Json(TeardownResponse {
        state: state.node.state(),
    })
}
