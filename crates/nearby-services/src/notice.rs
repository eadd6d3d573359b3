//! User-facing notices.
//!
//! Every terminal outcome (a failed or closed session, a connection that
//! became available, was lost, or never came up) is published here so a
//! front end can tell the user. Nothing fails silently.

use tokio::sync::broadcast;

use crate::connection::AttemptId;
use crate::session::{SessionFailure, SessionRole};

const NOTICE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Attached,
    SessionActive { role: SessionRole },
    SessionFailed { failure: SessionFailure },
    SessionClosed,
    PeerDiscovered { name: String },
    ConnectionAvailable { attempt: AttemptId, peer: String },
    ConnectionLost { attempt: AttemptId, peer: String },
    ConnectionUnavailable { attempt: AttemptId, peer: String },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::Attached => write!(f, "Attached to discovery service"),
            Notice::SessionActive { role } => write!(f, "{role} session started"),
            Notice::SessionFailed { failure } => write!(f, "Discovery failed: {failure}"),
            Notice::SessionClosed => write!(f, "Discovery stopped"),
            Notice::PeerDiscovered { name } => write!(f, "Found {name}"),
            Notice::ConnectionAvailable { peer, .. } => write!(f, "Connected to {peer}"),
            Notice::ConnectionLost { peer, .. } => write!(f, "Connection lost with {peer}"),
            Notice::ConnectionUnavailable { peer, .. } => write!(f, "Unable to connect to {peer}"),
        }
    }
}

/// Sender side of the notice channel. Cloned into every component that
/// reports outcomes; sending with no subscribers is not an error.
pub type Notices = broadcast::Sender<Notice>;

pub fn notice_channel() -> (Notices, broadcast::Receiver<Notice>) {
    broadcast::channel(NOTICE_CAPACITY)
}
