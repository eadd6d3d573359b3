//! Discovery session coordinator — one attach/publish/subscribe cycle.
//!
//! ```text
//! Detached → Attaching → Attached → Publishing  ┐
//!                                 → Subscribing ┴→ Active → Closed
//! Attaching | Publishing | Subscribing | Active → Failed
//! ```
//!
//! A coordinator is single-use. Failed and Closed are terminal; a retry means
//! constructing a new coordinator, mirroring the one-shot sessions of the
//! underlying service.
//!
//! All state lives behind one mutex. Service callbacks arrive through an
//! [`EventPump`] and are applied one at a time. Events that no longer match
//! the state (wrong session handle, or anything after teardown) are ignored,
//! and handles that arrive late for a torn-down session are released.
//!
//! Renders happen outside the state lock. Every registry change bumps a
//! generation under the lock, and a render is dropped if a newer generation
//! has already been rendered, so the last frame always matches the registry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use nearby_core::wire;

use crate::notice::{Notice, Notices};
use crate::peer::{PeerRecord, PeerRegistry, Renderer};
use crate::pump::{EventPump, EventSink};
use crate::service::{
    AttachError, AttachHandle, DiscoveryEvent, DiscoveryEvents, DiscoveryService,
    DiscoverySessionRef, PeerHandle, PublishConfig, PublishError, SubscribeConfig, SubscribeError,
};

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryState {
    Detached,
    Attaching,
    Attached,
    Publishing,
    Subscribing,
    Active,
    Closed,
    Failed,
}

impl DiscoveryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DiscoveryState::Closed | DiscoveryState::Failed)
    }
}

impl std::fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DiscoveryState::Detached => "detached",
            DiscoveryState::Attaching => "attaching",
            DiscoveryState::Attached => "attached",
            DiscoveryState::Publishing => "publishing",
            DiscoveryState::Subscribing => "subscribing",
            DiscoveryState::Active => "active",
            DiscoveryState::Closed => "closed",
            DiscoveryState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    Publish,
    Subscribe,
}

impl std::fmt::Display for SessionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionRole::Publish => f.write_str("publish"),
            SessionRole::Subscribe => f.write_str("subscribe"),
        }
    }
}

/// Why a coordinator ended up Failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionFailure {
    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    #[error("discovery session terminated by the service")]
    Terminated,
}

struct CoordinatorState {
    state: DiscoveryState,
    role: Option<SessionRole>,
    attach: Option<AttachHandle>,
    session: Option<DiscoverySessionRef>,
    registry: PeerRegistry,
    failure: Option<SessionFailure>,
    decode_failures: u64,
    /// Bumped on every registry change.
    generation: u64,
}

// ── Coordinator ───────────────────────────────────────────────────────────────

pub struct SessionCoordinator {
    service: Arc<dyn DiscoveryService>,
    renderer: Arc<dyn Renderer>,
    notices: Notices,
    events: DiscoveryEvents,
    inner: Mutex<CoordinatorState>,
    /// Generation of the last frame handed to the renderer.
    rendered: Mutex<u64>,
    state_tx: watch::Sender<DiscoveryState>,
}

impl SessionCoordinator {
    /// Create a Detached coordinator and the pump that feeds it service events.
    /// The pump must be run (or drained) for any callback to take effect.
    pub fn new(
        service: Arc<dyn DiscoveryService>,
        renderer: Arc<dyn Renderer>,
        notices: Notices,
    ) -> (Arc<Self>, EventPump<DiscoveryEvent, Self>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(DiscoveryState::Detached);
        let coordinator = Arc::new(Self {
            service,
            renderer,
            notices,
            events,
            inner: Mutex::new(CoordinatorState {
                state: DiscoveryState::Detached,
                role: None,
                attach: None,
                session: None,
                registry: PeerRegistry::new(),
                failure: None,
                decode_failures: 0,
                generation: 0,
            }),
            rendered: Mutex::new(0),
            state_tx,
        });
        let pump = EventPump::new(Arc::downgrade(&coordinator), rx);
        (coordinator, pump)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn state(&self) -> DiscoveryState {
        self.lock().state
    }

    /// Observe state transitions without polling.
    pub fn watch_state(&self) -> watch::Receiver<DiscoveryState> {
        self.state_tx.subscribe()
    }

    pub fn role(&self) -> Option<SessionRole> {
        self.lock().role
    }

    pub fn failure(&self) -> Option<SessionFailure> {
        self.lock().failure.clone()
    }

    /// Discovered peers in first-seen order.
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.lock().registry.list().to_vec()
    }

    pub fn peer(&self, name: &str) -> Option<PeerRecord> {
        self.lock().registry.get(name).cloned()
    }

    /// Advertisements dropped because they could not be decoded.
    pub fn decode_failures(&self) -> u64 {
        self.lock().decode_failures
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Ask the service to attach. A no-op once attaching or beyond.
    pub fn attach(&self) -> Result<(), AttachError> {
        let mut st = self.lock();
        match st.state {
            DiscoveryState::Detached => {}
            DiscoveryState::Closed | DiscoveryState::Failed => {
                return Err(AttachError::Terminated(st.state));
            }
            _ => return Ok(()),
        }

        self.set_state(&mut st, DiscoveryState::Attaching);

        if !self.service.is_available() {
            self.fail(&mut st, AttachError::Unavailable.into());
            return Err(AttachError::Unavailable);
        }

        if let Err(e) = self.service.attach(self.events.clone()) {
            self.fail(&mut st, e.clone().into());
            return Err(e);
        }
        Ok(())
    }

    /// Open a publish session advertising `payload`. Requires Attached.
    pub fn start_publish(&self, service_name: &str, payload: Bytes) -> Result<(), PublishError> {
        let mut st = self.lock();
        let attach = match (st.state, st.attach) {
            (DiscoveryState::Attached, Some(attach)) => attach,
            (state, _) => return Err(PublishError::NotAttached(state)),
        };

        st.role = Some(SessionRole::Publish);
        self.set_state(&mut st, DiscoveryState::Publishing);

        let config = PublishConfig {
            service_name: service_name.to_string(),
            service_info: payload,
        };
        if let Err(e) = self.service.publish(attach, config, self.events.clone()) {
            self.fail(&mut st, e.clone().into());
            return Err(e);
        }
        tracing::debug!(service = service_name, "publish requested");
        Ok(())
    }

    /// Open a subscribe session for `service_name`. Requires Attached.
    pub fn start_subscribe(&self, service_name: &str) -> Result<(), SubscribeError> {
        let mut st = self.lock();
        let attach = match (st.state, st.attach) {
            (DiscoveryState::Attached, Some(attach)) => attach,
            (state, _) => return Err(SubscribeError::NotAttached(state)),
        };

        st.role = Some(SessionRole::Subscribe);
        self.set_state(&mut st, DiscoveryState::Subscribing);

        let config = SubscribeConfig {
            service_name: service_name.to_string(),
        };
        if let Err(e) = self.service.subscribe(attach, config, self.events.clone()) {
            self.fail(&mut st, e.clone().into());
            return Err(e);
        }
        tracing::debug!(service = service_name, "subscribe requested");
        Ok(())
    }

    /// Close the session from any non-terminal state, release its handles and
    /// clear the registry. Safe to race with in-flight callbacks.
    pub fn teardown(&self) {
        let mut st = self.lock();
        if st.state.is_terminal() {
            return;
        }

        self.release_handles(&mut st);
        let cleared = Self::clear_registry(&mut st);
        self.set_state(&mut st, DiscoveryState::Closed);
        let _ = self.notices.send(Notice::SessionClosed);
        drop(st);

        if let Some(generation) = cleared {
            self.render(generation, &[]);
        }
    }

    // ── Callbacks ─────────────────────────────────────────────────────────────

    /// A subscribe session matched a publisher. Decodes the advertisement and
    /// records the peer if its name is new. Undecodable advertisements are
    /// dropped without affecting anything else.
    pub fn on_peer_discovered(&self, session: DiscoverySessionRef, peer: PeerHandle, info: &[u8]) {
        let mut st = self.lock();
        if st.state != DiscoveryState::Active || st.session != Some(session) {
            tracing::debug!(%session, %peer, state = %st.state, "ignoring discovery for stale session");
            return;
        }

        let decoded = match wire::decode(info) {
            Ok(decoded) => decoded,
            Err(e) => {
                st.decode_failures += 1;
                tracing::warn!(
                    %session,
                    %peer,
                    error = %e,
                    len = info.len(),
                    "dropping undecodable advertisement"
                );
                return;
            }
        };

        let name = decoded.name.clone();
        let inserted = st.registry.upsert(PeerRecord {
            name: decoded.name,
            details: decoded.details,
            peer_handle: peer,
            session,
        });
        if !inserted {
            tracing::trace!(%peer, name = %name, "duplicate advertisement");
            return;
        }

        tracing::info!(%peer, name = %name, peers = st.registry.len(), "peer discovered");
        st.generation += 1;
        let generation = st.generation;
        let snapshot = st.registry.list().to_vec();
        let _ = self.notices.send(Notice::PeerDiscovered { name });
        drop(st);

        self.render(generation, &snapshot);
    }

    fn on_attached(&self, attach: AttachHandle) {
        let mut st = self.lock();
        match st.state {
            DiscoveryState::Attaching => {
                st.attach = Some(attach);
                self.set_state(&mut st, DiscoveryState::Attached);
                let _ = self.notices.send(Notice::Attached);
            }
            state if state.is_terminal() => {
                tracing::debug!(%attach, %state, "releasing late attach");
                self.service.detach(attach);
            }
            state => tracing::debug!(%attach, %state, "ignoring unexpected attach"),
        }
    }

    fn on_session_started(&self, role: SessionRole, session: DiscoverySessionRef) {
        let mut st = self.lock();
        let expected = match role {
            SessionRole::Publish => DiscoveryState::Publishing,
            SessionRole::Subscribe => DiscoveryState::Subscribing,
        };
        match st.state {
            state if state == expected => {
                st.session = Some(session);
                self.set_state(&mut st, DiscoveryState::Active);
                tracing::info!(%session, %role, "discovery session active");
                let _ = self.notices.send(Notice::SessionActive { role });
            }
            state if state.is_terminal() => {
                tracing::debug!(%session, %state, "closing late session");
                self.service.close(session);
            }
            state => tracing::debug!(%session, %state, "ignoring unexpected session start"),
        }
    }

    fn on_session_config_failed(&self, reason: String) {
        let mut st = self.lock();
        let failure: SessionFailure = match st.state {
            DiscoveryState::Publishing => PublishError::SessionConfigFailed(reason).into(),
            DiscoveryState::Subscribing => SubscribeError::SessionConfigFailed(reason).into(),
            state => {
                tracing::debug!(%state, %reason, "ignoring session config failure");
                return;
            }
        };
        self.fail(&mut st, failure);
    }

    fn on_session_terminated(&self, session: DiscoverySessionRef) {
        let mut st = self.lock();
        if st.state != DiscoveryState::Active || st.session != Some(session) {
            tracing::debug!(%session, state = %st.state, "ignoring termination of stale session");
            return;
        }
        // The service already dropped the session; only the attach remains ours.
        st.session = None;
        let cleared = Self::clear_registry(&mut st);
        self.fail(&mut st, SessionFailure::Terminated);
        drop(st);

        if let Some(generation) = cleared {
            self.render(generation, &[]);
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Empty the registry. Returns the new generation if there was anything
    /// to clear.
    fn clear_registry(st: &mut CoordinatorState) -> Option<u64> {
        if st.registry.is_empty() {
            return None;
        }
        st.registry.clear();
        st.generation += 1;
        Some(st.generation)
    }

    /// Hand a snapshot to the renderer unless a newer one got there first.
    fn render(&self, generation: u64, peers: &[PeerRecord]) {
        let mut rendered = self.rendered.lock().unwrap_or_else(PoisonError::into_inner);
        if generation <= *rendered {
            tracing::trace!(generation, rendered = *rendered, "skipping stale peer list");
            return;
        }
        *rendered = generation;
        self.renderer.render(peers);
    }

    fn set_state(&self, st: &mut CoordinatorState, next: DiscoveryState) {
        tracing::debug!(from = %st.state, to = %next, "discovery state");
        st.state = next;
        self.state_tx.send_replace(next);
    }

    fn release_handles(&self, st: &mut CoordinatorState) {
        if let Some(session) = st.session.take() {
            self.service.close(session);
        }
        if let Some(attach) = st.attach.take() {
            self.service.detach(attach);
        }
    }

    fn fail(&self, st: &mut CoordinatorState, failure: SessionFailure) {
        tracing::warn!(from = %st.state, error = %failure, "discovery session failed");
        self.release_handles(st);
        Self::clear_registry(st);
        st.failure = Some(failure.clone());
        self.set_state(st, DiscoveryState::Failed);
        let _ = self.notices.send(Notice::SessionFailed { failure });
    }
}

impl EventSink<DiscoveryEvent> for SessionCoordinator {
    fn handle_event(&self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Attached(attach) => self.on_attached(attach),
            DiscoveryEvent::AttachFailed(reason) => {
                let mut st = self.lock();
                if st.state == DiscoveryState::Attaching {
                    self.fail(&mut st, AttachError::Denied(reason).into());
                } else {
                    tracing::debug!(state = %st.state, %reason, "ignoring attach failure");
                }
            }
            DiscoveryEvent::PublishStarted(session) => {
                self.on_session_started(SessionRole::Publish, session)
            }
            DiscoveryEvent::SubscribeStarted(session) => {
                self.on_session_started(SessionRole::Subscribe, session)
            }
            DiscoveryEvent::SessionConfigFailed(reason) => self.on_session_config_failed(reason),
            DiscoveryEvent::ServiceDiscovered {
                session,
                peer,
                info,
            } => self.on_peer_discovered(session, peer, &info),
            DiscoveryEvent::SessionTerminated(session) => self.on_session_terminated(session),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
