//! HTTP API handlers — exposes the discovery node as JSON.

pub mod connections;
pub mod peers;
pub mod sessions;
pub mod status;

use std::sync::Arc;

use axum::http::StatusCode;

use nearby_services::{AttachError, DiscoveryNode, NodeError};

#[derive(Clone)]
pub struct ApiState {
    pub node: Arc<DiscoveryNode>,
    /// Shutdown broadcast sender — signals graceful daemon shutdown.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Map a node error onto the status a client should see.
fn node_error(e: NodeError) -> (StatusCode, String) {
    let status = match &e {
        NodeError::PermissionsDenied(_) => StatusCode::FORBIDDEN,
        NodeError::UnknownPeer(_) | NodeError::UnknownAttempt(_) => StatusCode::NOT_FOUND,
        NodeError::NoSession => StatusCode::CONFLICT,
        NodeError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
        NodeError::Attach(AttachError::Unavailable) | NodeError::Connection(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}

// Re-export handler functions for use in router setup.
pub use connections::{handle_cancel, handle_connection_inspect, handle_connections};
pub use peers::{handle_connect, handle_peers};
pub use sessions::{handle_publish, handle_subscribe, handle_teardown};
pub use status::{handle_shutdown, handle_status};
