//! Daemon status and shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    service_name: String,
    state: String,
    role: Option<String>,
    failure: Option<String>,
    peers_discovered: usize,
    decode_failures: u64,
    missing_permissions: Vec<String>,
    connections: ConnectionCounts,
}

#[derive(Deserialize)]
struct ConnectionCounts {
    pending: usize,
    available: usize,
    lost: usize,
    unavailable: usize,
}

#[derive(Deserialize)]
struct ShutdownResponse {
    message: String,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Nearby Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Service          : {}", resp.service_name);
    println!("  Discovery        : {}", resp.state);
    if let Some(role) = &resp.role {
        println!("  Role             : {}", role);
    }
    if let Some(failure) = &resp.failure {
        println!("  Last failure     : {}", failure);
    }
    println!("  Peers discovered : {}", resp.peers_discovered);
    println!("  Bad adverts      : {}", resp.decode_failures);

    let c = &resp.connections;
    println!(
        "  Connections      : {} pending, {} available, {} lost, {} unavailable",
        c.pending, c.available, c.lost, c.unavailable
    );

    if !resp.missing_permissions.is_empty() {
        println!("\n  Missing permissions:");
        for p in &resp.missing_permissions {
            println!("    - {}", p);
        }
    }

    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    let resp: ShutdownResponse =
        post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}
