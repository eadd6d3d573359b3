//! Nearby integration test harness.
//!
//! Every test builds its own loopback medium and runs several discovery
//! nodes on it in-process. Nothing is shared between tests, so they can run
//! in parallel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::broadcast;

use nearby_core::device::StaticDeviceInfo;
use nearby_core::permission::StaticPermissionGate;
use nearby_services::{
    DiscoveryNode, LoopbackDevice, LoopbackMedium, NodeCollaborators, Notice, PeerRecord,
    Renderer,
};

mod api;
mod connections;
mod discovery;
mod failures;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const SERVICE: &str = "nearby.device_info";

/// How long any single wait in a test may take.
pub const WAIT: Duration = Duration::from_secs(5);

/// Keeps every list the renderer was handed.
#[derive(Default)]
pub struct CapturingRenderer {
    frames: Mutex<Vec<Vec<String>>>,
}

impl CapturingRenderer {
    pub fn frames(&self) -> Vec<Vec<String>> {
        self.frames.lock().unwrap().clone()
    }

    pub fn last(&self) -> Vec<String> {
        self.frames().pop().unwrap_or_default()
    }
}

impl Renderer for CapturingRenderer {
    fn render(&self, peers: &[PeerRecord]) {
        let names = peers.iter().map(|p| p.name.clone()).collect();
        self.frames.lock().unwrap().push(names);
    }
}

/// One simulated device: its radio, its node, and what it rendered.
pub struct TestNode {
    pub radio: Arc<LoopbackDevice>,
    pub node: Arc<DiscoveryNode>,
    pub renderer: Arc<CapturingRenderer>,
}

/// Put a device advertising `model` on the medium.
pub fn spawn_node(medium: &Arc<LoopbackMedium>, model: &str, battery: u8) -> TestNode {
    let radio = medium.device(model);
    let renderer = Arc::new(CapturingRenderer::default());
    let node = DiscoveryNode::with_start_timeout(
        NodeCollaborators {
            service: radio.clone(),
            negotiator: radio.clone(),
            permissions: Arc::new(StaticPermissionGate::all_granted()),
            device: Arc::new(StaticDeviceInfo::new(model, "14", battery)),
            renderer: renderer.clone(),
        },
        SERVICE,
        WAIT,
    );
    TestNode {
        radio,
        node,
        renderer,
    }
}

/// Poll until `cond` holds or `WAIT` passes.
pub async fn wait_for_condition(mut cond: impl FnMut() -> bool) -> Result<()> {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met within {:?}", WAIT);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

/// Wait for the first notice matching `pred`.
pub async fn wait_for_notice(
    notices: &mut broadcast::Receiver<Notice>,
    mut pred: impl FnMut(&Notice) -> bool,
) -> Result<Notice> {
    let found = tokio::time::timeout(WAIT, async {
        loop {
            match notices.recv().await {
                Ok(notice) if pred(&notice) => return Ok(notice),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => bail!("notice channel closed"),
            }
        }
    })
    .await;
    match found {
        Ok(result) => result,
        Err(_) => bail!("no matching notice within {:?}", WAIT),
    }
}

/// Names of the peers a node currently lists.
pub fn peer_names(node: &DiscoveryNode) -> Vec<String> {
    node.peers().into_iter().map(|p| p.name).collect()
}
