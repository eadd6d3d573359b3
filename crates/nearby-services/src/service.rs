//! Capability interfaces for the external wireless-discovery stack.
//!
//! The platform owns the real resources. Everything handed back to us
//! (attach handles, discovery sessions, peer handles, network requests) is an
//! opaque token: stored and passed back verbatim, never inspected.
//!
//! The platform is callback-driven. Every call here returns as soon as the
//! request is issued; confirmation arrives later as an event on the channel
//! the caller supplied.

use std::net::Ipv6Addr;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::connection::{AttemptId, ConnectionError};
use crate::session::DiscoveryState;

// ── Tokens ────────────────────────────────────────────────────────────────────

macro_rules! opaque_token {
    ($(#[$meta:meta])* $name:ident($inner:ty), $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name($inner);

        impl $name {
            /// Wrap a raw value issued by the service.
            pub fn from_raw(raw: $inner) -> Self {
                Self(raw)
            }

            /// The raw value, for display and round-tripping through the API.
            pub fn raw(self) -> $inner {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

opaque_token!(
    /// An attached connection to the discovery service.
    AttachHandle(u64),
    "attach"
);

opaque_token!(
    /// A publish or subscribe session opened on an attach handle.
    DiscoverySessionRef(u64),
    "session"
);

opaque_token!(
    /// A peer as seen from one discovery session. Meaningless outside it.
    PeerHandle(u32),
    "peer"
);

opaque_token!(
    /// An outstanding network request.
    NetworkRequest(u64),
    "request"
);

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Everything the discovery service reports back, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Attached(AttachHandle),
    AttachFailed(String),
    PublishStarted(DiscoverySessionRef),
    SubscribeStarted(DiscoverySessionRef),
    /// The publish/subscribe config was rejected after the call returned.
    SessionConfigFailed(String),
    /// A subscribe session matched a publisher.
    ServiceDiscovered {
        session: DiscoverySessionRef,
        peer: PeerHandle,
        info: Bytes,
    },
    /// The service ended the session on its own.
    SessionTerminated(DiscoverySessionRef),
}

/// Where a discovery service delivers its events.
pub type DiscoveryEvents = mpsc::UnboundedSender<DiscoveryEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfig {
    pub service_name: String,
    /// Service-specific info advertised to matching subscribers.
    pub service_info: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeConfig {
    pub service_name: String,
}

pub trait DiscoveryService: Send + Sync {
    /// Whether the radio can currently be attached at all.
    fn is_available(&self) -> bool;

    /// Request an attach. Completes with `Attached` or `AttachFailed`.
    fn attach(&self, events: DiscoveryEvents) -> Result<(), AttachError>;

    /// Open a publish session. Completes with `PublishStarted` or `SessionConfigFailed`.
    fn publish(
        &self,
        attach: AttachHandle,
        config: PublishConfig,
        events: DiscoveryEvents,
    ) -> Result<(), PublishError>;

    /// Open a subscribe session. Completes with `SubscribeStarted` or
    /// `SessionConfigFailed`, then reports matches as `ServiceDiscovered`.
    fn subscribe(
        &self,
        attach: AttachHandle,
        config: SubscribeConfig,
        events: DiscoveryEvents,
    ) -> Result<(), SubscribeError>;

    /// Close a publish or subscribe session.
    fn close(&self, session: DiscoverySessionRef);

    /// Release an attach handle and everything opened on it.
    fn detach(&self, attach: AttachHandle);
}

// ── Network negotiation ───────────────────────────────────────────────────────

/// The peer a network is requested for: the discovering session plus the
/// peer handle it issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkSpecifier {
    pub session: DiscoverySessionRef,
    pub peer: PeerHandle,
}

/// A negotiated data path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub interface: String,
    pub peer_addr: Ipv6Addr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Available(NetworkInfo),
    Lost,
    Unavailable,
}

/// Where a negotiator delivers its events. Every event carries the attempt it
/// belongs to.
pub type NetworkEvents = mpsc::UnboundedSender<(AttemptId, NetworkEvent)>;

pub trait NetworkNegotiator: Send + Sync {
    /// Start negotiating. Events for this request are tagged with `attempt`.
    fn request_network(
        &self,
        target: NetworkSpecifier,
        attempt: AttemptId,
        events: NetworkEvents,
    ) -> Result<NetworkRequest, ConnectionError>;

    /// Give up a request. A live network is torn down and reported `Lost`
    /// asynchronously; anything else is released silently.
    fn release(&self, request: NetworkRequest);
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachError {
    #[error("discovery service unavailable")]
    Unavailable,

    #[error("attach denied: {0}")]
    Denied(String),

    #[error("session is {0}; construct a new coordinator to retry")]
    Terminated(DiscoveryState),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("cannot publish while {0}")]
    NotAttached(DiscoveryState),

    #[error("publish config rejected: {0}")]
    ConfigRejected(String),

    #[error("publish session config failed: {0}")]
    SessionConfigFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    #[error("cannot subscribe while {0}")]
    NotAttached(DiscoveryState),

    #[error("subscribe config rejected: {0}")]
    ConfigRejected(String),

    #[error("subscribe session config failed: {0}")]
    SessionConfigFailed(String),
}
