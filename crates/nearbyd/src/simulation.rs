//! Simulated neighbours — other devices on the loopback medium.
//!
//! Each configured neighbour gets its own radio and publishes the daemon's
//! service with its own advertisement, so a subscribing daemon has something
//! to find without real hardware.

use std::sync::Arc;

use nearby_core::config::NeighbourConfig;
use nearby_core::device::StaticDeviceInfo;
use nearby_core::permission::StaticPermissionGate;
use nearby_services::{DiscoveryNode, LoopbackMedium, NodeCollaborators, NullRenderer};

/// Start every neighbour publishing. Neighbours that fail to start are
/// logged and skipped.
pub async fn spawn_neighbours(
    medium: &Arc<LoopbackMedium>,
    neighbours: &[NeighbourConfig],
    service_name: &str,
) -> Vec<Arc<DiscoveryNode>> {
    let mut started = Vec::with_capacity(neighbours.len());

    for neighbour in neighbours {
        let device = medium.device(&neighbour.model);
        let node = DiscoveryNode::new(
            NodeCollaborators {
                service: device.clone(),
                negotiator: device,
                permissions: Arc::new(StaticPermissionGate::all_granted()),
                device: Arc::new(StaticDeviceInfo::new(
                    neighbour.model.clone(),
                    neighbour.os_version.clone(),
                    neighbour.battery_percent,
                )),
                renderer: Arc::new(NullRenderer),
            },
            service_name,
        );

        match node.publish().await {
            Ok(_) => {
                tracing::info!(model = %neighbour.model, "simulated neighbour publishing");
                started.push(node);
            }
            Err(e) => {
                tracing::warn!(model = %neighbour.model, error = %e, "simulated neighbour failed to start");
            }
        }
    }

    started
}
