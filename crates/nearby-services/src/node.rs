//! Discovery node — one device's discovery front end.
//!
//! Ties the collaborators together the way a user-facing app would: checks
//! permissions, runs one discovery session at a time, connects to peers picked
//! by name, and tears everything down on shutdown.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;

use nearby_core::device::{self, DeviceInfoProvider};
use nearby_core::permission::{self, Permission, PermissionGate};

use crate::connection::{AttemptId, ConnectionError, ConnectionManager};
use crate::notice::{notice_channel, Notice, Notices};
use crate::peer::{PeerRecord, Renderer};
use crate::service::{
    AttachError, DiscoveryService, NetworkNegotiator, PublishError, SubscribeError,
};
use crate::session::{DiscoveryState, SessionCoordinator, SessionFailure, SessionRole};

/// How long a start waits for each service confirmation.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("permissions denied: {0:?}")]
    PermissionsDenied(Vec<Permission>),

    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    #[error(transparent)]
    SessionFailed(SessionFailure),

    #[error("timed out waiting for the service while {0}")]
    TimedOut(DiscoveryState),

    #[error("no discovery session")]
    NoSession,

    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    #[error("unknown connection attempt: {0}")]
    UnknownAttempt(AttemptId),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Everything a node needs from the outside world.
pub struct NodeCollaborators {
    pub service: Arc<dyn DiscoveryService>,
    pub negotiator: Arc<dyn NetworkNegotiator>,
    pub permissions: Arc<dyn PermissionGate>,
    pub device: Arc<dyn DeviceInfoProvider>,
    pub renderer: Arc<dyn Renderer>,
}

pub struct DiscoveryNode {
    service: Arc<dyn DiscoveryService>,
    permissions: Arc<dyn PermissionGate>,
    device: Arc<dyn DeviceInfoProvider>,
    renderer: Arc<dyn Renderer>,
    service_name: String,
    start_timeout: Duration,
    notices: Notices,
    connections: Arc<ConnectionManager>,
    session: Mutex<Option<Arc<SessionCoordinator>>>,
    /// Serializes publish/subscribe so two starts never race for the slot.
    starting: tokio::sync::Mutex<()>,
    shutdown: broadcast::Sender<()>,
}

impl DiscoveryNode {
    /// Build a node and spawn its connection event pump. Must be called from
    /// within a tokio runtime.
    pub fn new(parts: NodeCollaborators, service_name: impl Into<String>) -> Arc<Self> {
        Self::with_start_timeout(parts, service_name, DEFAULT_START_TIMEOUT)
    }

    /// Same as [`DiscoveryNode::new`] with a custom wait per service confirmation.
    pub fn with_start_timeout(
        parts: NodeCollaborators,
        service_name: impl Into<String>,
        start_timeout: Duration,
    ) -> Arc<Self> {
        let (notices, _) = notice_channel();
        let (shutdown, _) = broadcast::channel(1);
        let (connections, pump) = ConnectionManager::new(parts.negotiator, notices.clone());
        tokio::spawn(pump.run(shutdown.subscribe()));

        Arc::new(Self {
            service: parts.service,
            permissions: parts.permissions,
            device: parts.device,
            renderer: parts.renderer,
            service_name: service_name.into(),
            start_timeout,
            notices,
            connections,
            session: Mutex::new(None),
            starting: tokio::sync::Mutex::new(()),
            shutdown,
        })
    }

    // ── Discovery ─────────────────────────────────────────────────────────────

    /// Advertise this device. Resolves once the publish session is Active.
    pub async fn publish(&self) -> Result<Arc<SessionCoordinator>, NodeError> {
        self.start(SessionRole::Publish).await
    }

    /// Search for peers. Resolves once the subscribe session is Active;
    /// discoveries then arrive through the renderer and notices.
    pub async fn subscribe(&self) -> Result<Arc<SessionCoordinator>, NodeError> {
        self.start(SessionRole::Subscribe).await
    }

    async fn start(&self, role: SessionRole) -> Result<Arc<SessionCoordinator>, NodeError> {
        let _starting = self.starting.lock().await;

        let denied = permission::ensure_required(self.permissions.as_ref());
        if !denied.is_empty() {
            tracing::warn!(?denied, "discovery needs permissions");
            return Err(NodeError::PermissionsDenied(denied));
        }

        // One session at a time. The same role already running is kept; any
        // other live session is closed first.
        if let Some(current) = self.current() {
            if !current.state().is_terminal() {
                if current.role() == Some(role) {
                    return Ok(current);
                }
                tracing::info!(from = ?current.role(), to = %role, "switching discovery role");
                current.teardown();
            }
        }

        let (coordinator, pump) = SessionCoordinator::new(
            Arc::clone(&self.service),
            Arc::clone(&self.renderer),
            self.notices.clone(),
        );
        tokio::spawn(pump.run(self.shutdown.subscribe()));
        *self.slot() = Some(Arc::clone(&coordinator));

        coordinator.attach()?;
        self.settle(&coordinator, DiscoveryState::Attaching).await?;

        match role {
            SessionRole::Publish => {
                let payload = device::advertisement(self.device.as_ref());
                coordinator.start_publish(&self.service_name, payload)?;
                self.settle(&coordinator, DiscoveryState::Publishing).await?;
            }
            SessionRole::Subscribe => {
                coordinator.start_subscribe(&self.service_name)?;
                self.settle(&coordinator, DiscoveryState::Subscribing).await?;
            }
        }

        tracing::info!(%role, service = %self.service_name, "discovery started");
        Ok(coordinator)
    }

    /// Wait for the coordinator to leave `pending`, then surface a failure.
    async fn settle(
        &self,
        coordinator: &SessionCoordinator,
        pending: DiscoveryState,
    ) -> Result<(), NodeError> {
        let mut states = coordinator.watch_state();
        let waited =
            tokio::time::timeout(self.start_timeout, states.wait_for(|s| *s != pending)).await;
        let state = match waited {
            Ok(Ok(state)) => *state,
            _ => {
                coordinator.teardown();
                return Err(NodeError::TimedOut(pending));
            }
        };

        if state == DiscoveryState::Failed {
            let failure = coordinator.failure().unwrap_or(SessionFailure::Terminated);
            return Err(NodeError::SessionFailed(failure));
        }
        Ok(())
    }

    /// Close the current session, if any.
    pub fn teardown(&self) {
        if let Some(current) = self.current() {
            current.teardown();
        }
    }

    // ── Snapshots ─────────────────────────────────────────────────────────────

    /// The most recent session, including a finished one.
    pub fn current(&self) -> Option<Arc<SessionCoordinator>> {
        self.slot().clone()
    }

    pub fn state(&self) -> DiscoveryState {
        self.current()
            .map(|c| c.state())
            .unwrap_or(DiscoveryState::Detached)
    }

    pub fn peers(&self) -> Vec<PeerRecord> {
        self.current().map(|c| c.peers()).unwrap_or_default()
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Required permissions not currently granted.
    pub fn missing_permissions(&self) -> Vec<Permission> {
        permission::missing(self.permissions.as_ref())
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    // ── Connections ───────────────────────────────────────────────────────────

    /// Request a network to a discovered peer, by advertised name.
    pub fn connect(&self, name: &str) -> Result<AttemptId, NodeError> {
        let current = self.current().ok_or(NodeError::NoSession)?;
        let peer = current
            .peer(name)
            .ok_or_else(|| NodeError::UnknownPeer(name.to_string()))?;
        Ok(self.connections.connect(&peer)?)
    }

    /// Cancel an attempt. `Ok(false)` if it had already finished.
    pub fn cancel(&self, attempt: AttemptId) -> Result<bool, NodeError> {
        if self.connections.attempt(attempt).is_none() {
            return Err(NodeError::UnknownAttempt(attempt));
        }
        Ok(self.connections.cancel(attempt))
    }

    /// Close the session, cancel every connection, and stop the pumps.
    pub fn shutdown(&self) {
        self.teardown();
        self.connections.close();
        let _ = self.shutdown.send(());
        tracing::info!("discovery node shut down");
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<SessionCoordinator>>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
