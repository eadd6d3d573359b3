//! nearbyd — peer discovery daemon.
//!
//! Runs one discovery node on an in-process loopback medium shared with the
//! simulated neighbours from config, and exposes it over the HTTP API.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;

use nearby_core::config::{DiscoveryMode, NearbyConfig};
use nearby_core::device::HostDeviceInfo;
use nearby_core::permission::StaticPermissionGate;
use nearby_core::wire::service_hash;
use nearby_services::{DiscoveryNode, LoopbackMedium, NodeCollaborators};

mod render;
mod simulation;

use render::LogRenderer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = NearbyConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = NearbyConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        NearbyConfig::default()
    });

    let service_name = config.discovery.service_name.clone();
    tracing::info!(
        service = %service_name,
        hash = %hex::encode(&service_hash(&service_name)[..8]),
        "nearbyd starting"
    );

    // ── Medium and neighbours ────────────────────────────────────────────────

    let medium = LoopbackMedium::new();
    let neighbours =
        simulation::spawn_neighbours(&medium, &config.simulation.neighbours, &service_name).await;
    tracing::info!(count = neighbours.len(), "simulated neighbours ready");

    // ── Local node ───────────────────────────────────────────────────────────

    let radio = medium.device("local");
    let node = DiscoveryNode::new(
        NodeCollaborators {
            service: radio.clone(),
            negotiator: radio,
            permissions: Arc::new(StaticPermissionGate::new(
                config.permissions.granted.iter().copied(),
            )),
            device: Arc::new(HostDeviceInfo::new(config.device.clone())),
            renderer: Arc::new(LogRenderer::default()),
        },
        service_name,
    );

    let missing = node.missing_permissions();
    if !missing.is_empty() {
        tracing::warn!(?missing, "permissions not granted; discovery will be refused");
    }

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let notice_logger = {
        let mut notices = node.notices();
        tokio::spawn(async move {
            loop {
                match notices.recv().await {
                    Ok(notice) => tracing::info!(%notice, "notice"),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "notice logger fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    if config.discovery.auto_start {
        let node = node.clone();
        let mode = config.discovery.mode;
        tokio::spawn(async move {
            let started = match mode {
                DiscoveryMode::Publish => node.publish().await,
                DiscoveryMode::Subscribe => node.subscribe().await,
            };
            if let Err(e) = started {
                tracing::warn!(?mode, error = %e, "auto-start failed");
            }
        });
    }

    let api_task = {
        let state = nearby_api::ApiState {
            node: node.clone(),
            shutdown_tx: shutdown_tx.clone(),
        };
        let port = config.network.api_port;
        tokio::spawn(async move {
            if let Err(e) = nearby_api::serve(state, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()       => tracing::info!("shutting down"),
        r = api_task                 => tracing::error!("API task exited: {:?}", r),
        r = notice_logger            => tracing::error!("notice logger exited: {:?}", r),
    }

    node.shutdown();
    for neighbour in &neighbours {
        neighbour.shutdown();
    }

    Ok(())
}
