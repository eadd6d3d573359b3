//! Connection manager — one network negotiation per peer selection.
//!
//! Every attempt gets its own id, and every event the negotiator reports is
//! tagged with that id. Attempts never share mutable state: a second
//! selection of the same peer supersedes the first as the peer's "current"
//! attempt but does not cancel it, and the first attempt's events are still
//! applied (and surfaced) against the first attempt.
//!
//! Per attempt, the only accepted sequences are
//!
//! ```text
//! Pending → Unavailable
//! Pending → Available → Lost
//! ```
//!
//! Anything else (a duplicate Available, a Lost before Available, events after
//! a terminal state) is ignored.
//!
//! Finished attempts are kept for inspection, up to a fixed number; older ones
//! are pruned as new attempts finish.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::notice::{Notice, Notices};
use crate::peer::PeerRecord;
use crate::pump::{EventPump, EventSink};
use crate::service::{
    NetworkEvent, NetworkEvents, NetworkInfo, NetworkNegotiator, NetworkRequest, NetworkSpecifier,
};

/// How many finished attempts are kept around by default.
pub const DEFAULT_FINISHED_RETENTION: usize = 64;

/// Identifies one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AttemptId(u64);

impl AttemptId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Available,
    Lost,
    Unavailable,
}

impl ConnectionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionStatus::Lost | ConnectionStatus::Unavailable)
    }
}

/// One negotiation for one selected peer.
#[derive(Debug, Clone)]
pub struct ConnectionAttempt {
    pub id: AttemptId,
    /// Name of the selected peer.
    pub peer: String,
    pub target: NetworkSpecifier,
    pub requested_at: Instant,
    pub status: ConnectionStatus,
    /// Every status this attempt has held, starting with Pending.
    pub history: Vec<ConnectionStatus>,
    /// Set while Available (and kept after Lost for inspection).
    pub network: Option<NetworkInfo>,
    /// Whether `cancel` has been called on it.
    pub cancel_requested: bool,
    request: Option<NetworkRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("network unavailable: {0}")]
    Unavailable(String),

    #[error("connection manager is closed")]
    Closed,
}

pub struct ConnectionManager {
    negotiator: Arc<dyn NetworkNegotiator>,
    notices: Notices,
    events: NetworkEvents,
    attempts: DashMap<AttemptId, ConnectionAttempt>,
    /// peer name → its most recent attempt.
    current: DashMap<String, AttemptId>,
    next_id: AtomicU64,
    closed: AtomicBool,
    retain_finished: usize,
}

impl ConnectionManager {
    /// Create a manager and the pump that feeds it negotiator events.
    pub fn new(
        negotiator: Arc<dyn NetworkNegotiator>,
        notices: Notices,
    ) -> (Arc<Self>, EventPump<(AttemptId, NetworkEvent), Self>) {
        Self::with_retention(negotiator, notices, DEFAULT_FINISHED_RETENTION)
    }

    /// Like [`ConnectionManager::new`], keeping at most `retain_finished`
    /// terminal attempts.
    pub fn with_retention(
        negotiator: Arc<dyn NetworkNegotiator>,
        notices: Notices,
        retain_finished: usize,
    ) -> (Arc<Self>, EventPump<(AttemptId, NetworkEvent), Self>) {
        let (events, rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            negotiator,
            notices,
            events,
            attempts: DashMap::new(),
            current: DashMap::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            retain_finished,
        });
        let pump = EventPump::new(Arc::downgrade(&manager), rx);
        (manager, pump)
    }

    /// Request a network to `peer`. Returns at once with a Pending attempt.
    ///
    /// If the negotiator refuses the request outright the attempt is moved
    /// straight to Unavailable (and reported) before this returns. Fails only
    /// once the manager is closed.
    pub fn connect(&self, peer: &PeerRecord) -> Result<AttemptId, ConnectionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConnectionError::Closed);
        }
        let id = AttemptId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let target = NetworkSpecifier {
            session: peer.session,
            peer: peer.peer_handle,
        };

        self.attempts.insert(
            id,
            ConnectionAttempt {
                id,
                peer: peer.name.clone(),
                target,
                requested_at: Instant::now(),
                status: ConnectionStatus::Pending,
                history: vec![ConnectionStatus::Pending],
                network: None,
                cancel_requested: false,
                request: None,
            },
        );
        if let Some(previous) = self.current.insert(peer.name.clone(), id) {
            tracing::debug!(%previous, attempt = %id, peer = %peer.name, "superseding attempt");
        }

        tracing::info!(
            attempt = %id,
            peer = %peer.name,
            session = %target.session,
            handle = %target.peer,
            "requesting network"
        );

        match self.negotiator.request_network(target, id, self.events.clone()) {
            Ok(request) => {
                // The pump (or a cancel) may have finished this attempt before
                // the request id came back; nothing would release it later.
                let stale = match self.attempts.get_mut(&id) {
                    Some(mut attempt)
                        if !attempt.status.is_terminal() && !attempt.cancel_requested =>
                    {
                        attempt.request = Some(request);
                        None
                    }
                    _ => Some(request),
                };
                if let Some(request) = stale {
                    tracing::debug!(attempt = %id, %request, "releasing request of finished attempt");
                    self.negotiator.release(request);
                }
            }
            Err(e) => {
                tracing::warn!(attempt = %id, error = %e, "network request refused");
                self.handle_event((id, NetworkEvent::Unavailable));
            }
        }
        Ok(id)
    }

    /// Best-effort cancel. Returns false if the attempt is unknown or already
    /// terminal. An Available network is asked to tear down; its Lost arrives
    /// later through the normal event path.
    pub fn cancel(&self, id: AttemptId) -> bool {
        let request = {
            let Some(mut attempt) = self.attempts.get_mut(&id) else {
                return false;
            };
            if attempt.status.is_terminal() {
                return false;
            }
            attempt.cancel_requested = true;
            attempt.request.take()
        };

        tracing::info!(attempt = %id, "cancelling network request");
        if let Some(request) = request {
            self.negotiator.release(request);
        }
        true
    }

    pub fn status(&self, id: AttemptId) -> Option<ConnectionStatus> {
        self.attempts.get(&id).map(|a| a.status)
    }

    pub fn attempt(&self, id: AttemptId) -> Option<ConnectionAttempt> {
        self.attempts.get(&id).map(|a| a.clone())
    }

    /// All attempts, oldest first.
    pub fn attempts(&self) -> Vec<ConnectionAttempt> {
        let mut all: Vec<_> = self.attempts.iter().map(|a| a.value().clone()).collect();
        all.sort_by_key(|a| a.id);
        all
    }

    /// The most recent attempt for a peer.
    pub fn current_for(&self, peer: &str) -> Option<AttemptId> {
        self.current.get(peer).map(|id| *id)
    }

    /// Cancel every attempt that is not yet terminal. Returns how many.
    pub fn cancel_all(&self) -> usize {
        let live: Vec<AttemptId> = self
            .attempts
            .iter()
            .filter(|a| !a.status.is_terminal())
            .map(|a| a.id)
            .collect();
        live.into_iter().filter(|id| self.cancel(*id)).count()
    }

    /// Refuse further connects and cancel everything still live.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let cancelled = self.cancel_all();
        tracing::debug!(cancelled, "connection manager closed");
        cancelled
    }

    /// Drop the oldest finished attempts beyond the retention limit.
    fn prune_finished(&self) {
        let mut finished: Vec<AttemptId> = self
            .attempts
            .iter()
            .filter(|a| a.status.is_terminal())
            .map(|a| a.id)
            .collect();
        if finished.len() <= self.retain_finished {
            return;
        }
        finished.sort();
        let excess = finished.len() - self.retain_finished;
        for id in &finished[..excess] {
            if let Some((_, attempt)) = self.attempts.remove(id) {
                self.current.remove_if(&attempt.peer, |_, current| current == id);
            }
        }
        tracing::debug!(pruned = excess, "pruned finished attempts");
    }
}

impl EventSink<(AttemptId, NetworkEvent)> for ConnectionManager {
    fn handle_event(&self, (id, event): (AttemptId, NetworkEvent)) {
        let (peer, next, finished) = {
            let Some(mut attempt) = self.attempts.get_mut(&id) else {
                tracing::debug!(attempt = %id, "event for unknown attempt");
                return;
            };

            let next = match (attempt.status, event) {
                (ConnectionStatus::Pending, NetworkEvent::Available(info)) => {
                    tracing::info!(
                        attempt = %id,
                        interface = %info.interface,
                        addr = %info.peer_addr,
                        "network available"
                    );
                    attempt.network = Some(info);
                    ConnectionStatus::Available
                }
                (ConnectionStatus::Available, NetworkEvent::Lost) => ConnectionStatus::Lost,
                (ConnectionStatus::Pending, NetworkEvent::Unavailable) => {
                    ConnectionStatus::Unavailable
                }
                (status, event) => {
                    tracing::debug!(attempt = %id, ?status, ?event, "ignoring network event");
                    return;
                }
            };

            attempt.status = next;
            attempt.history.push(next);
            let finished = if next.is_terminal() {
                attempt.request.take()
            } else {
                None
            };
            (attempt.peer.clone(), next, finished)
        };

        // The negotiator is done with a terminal request; hand it back.
        if let Some(request) = finished {
            self.negotiator.release(request);
        }
        if next.is_terminal() {
            self.prune_finished();
        }

        let notice = match next {
            ConnectionStatus::Available => Notice::ConnectionAvailable { attempt: id, peer },
            ConnectionStatus::Lost => {
                tracing::info!(attempt = %id, peer = %peer, "network lost");
                Notice::ConnectionLost { attempt: id, peer }
            }
            ConnectionStatus::Unavailable => {
                tracing::warn!(attempt = %id, peer = %peer, "network unavailable");
                Notice::ConnectionUnavailable { attempt: id, peer }
            }
            ConnectionStatus::Pending => return,
        };
        let _ = self.notices.send(notice);
    }
}
