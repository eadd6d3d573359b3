//! Peer registry — the peers a discovery session has found, in the order it
//! found them.
//!
//! Keyed on advertised name. The first advertisement for a name wins; later
//! ones (including the same peer re-advertising under a new handle) are
//! dropped. The registry never notifies anyone itself — its owning
//! coordinator renders after a successful insert.

use std::collections::HashMap;

use crate::service::{DiscoverySessionRef, PeerHandle};

/// One discovered peer. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Advertised identity. Unique within a registry.
    pub name: String,
    /// Free-form advertised metadata.
    pub details: String,
    /// Handle issued by the service for this peer, scoped to `session`.
    pub peer_handle: PeerHandle,
    /// The discovery session that found this peer.
    pub session: DiscoverySessionRef,
}

#[derive(Debug, Default)]
pub struct PeerRegistry {
    records: Vec<PeerRecord>,
    by_name: HashMap<String, usize>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the name is already present. Returns whether it was inserted.
    pub fn upsert(&mut self, record: PeerRecord) -> bool {
        if self.by_name.contains_key(&record.name) {
            return false;
        }
        self.by_name.insert(record.name.clone(), self.records.len());
        self.records.push(record);
        true
    }

    /// All records, in first-seen order.
    pub fn list(&self) -> &[PeerRecord] {
        &self.records
    }

    pub fn get(&self, name: &str) -> Option<&PeerRecord> {
        self.by_name.get(name).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.by_name.clear();
    }
}

// ── Renderer ──────────────────────────────────────────────────────────────────

/// Shows the current peer list to the user.
///
/// Called with the full ordered list every time it changes, including the
/// empty list after a teardown. Called outside the coordinator's lock.
pub trait Renderer: Send + Sync {
    fn render(&self, peers: &[PeerRecord]);
}

/// Renders nothing.
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&self, _peers: &[PeerRecord]) {}
}
