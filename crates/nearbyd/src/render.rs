//! Log-backed renderer — the daemon's "list view".

use std::sync::atomic::{AtomicUsize, Ordering};

use nearby_services::{PeerRecord, Renderer};

/// Logs the peer list whenever it changes.
#[derive(Default)]
pub struct LogRenderer {
    shown: AtomicUsize,
}

impl Renderer for LogRenderer {
    fn render(&self, peers: &[PeerRecord]) {
        let previous = self.shown.swap(peers.len(), Ordering::Relaxed);
        if peers.is_empty() {
            if previous > 0 {
                tracing::info!("peer list cleared");
            }
            return;
        }

        tracing::info!(count = peers.len(), "peer list updated");
        for (i, peer) in peers.iter().enumerate() {
            tracing::info!("  {:>2}. {:<24} {}", i + 1, peer.name, peer.details);
        }
    }
}
