//! Connection attempt commands.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

#[derive(Deserialize)]
struct ConnectionsResponse {
    connections: Vec<ConnectionInfo>,
}

#[derive(Deserialize)]
struct ConnectionInfo {
    id: u64,
    peer: String,
    status: String,
    history: Vec<String>,
    interface: Option<String>,
    peer_addr: Option<String>,
    age_secs: u64,
    cancel_requested: bool,
}

pub async fn cmd_connections(port: u16) -> Result<()> {
    let resp: ConnectionsResponse = get_json(&format!("{}/connections", base_url(port))).await?;

    if resp.connections.is_empty() {
        println!("No connection attempts.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Connection Attempts ({})", resp.connections.len());
    println!("═══════════════════════════════════════");

    for c in &resp.connections {
        println!("  ┌─ #{} → {}", c.id, c.peer);
        println!("  │  status  : {}", c.status);
        println!("  │  history : {}", c.history.join(" → "));
        if let (Some(interface), Some(addr)) = (&c.interface, &c.peer_addr) {
            println!("  │  network : {}%{}", addr, interface);
        }
        if c.cancel_requested {
            println!("  │  cancel requested");
        }
        println!("  └─ age     : {}s", c.age_secs);
    }

    Ok(())
}

pub async fn cmd_cancel(port: u16, id: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct CancelResponse {
        id: u64,
        cancelled: bool,
    }

    let id: u64 = id
        .trim_start_matches('#')
        .parse()
        .context("connection id must be a number")?;
    let resp: CancelResponse =
        post_json(&format!("{}/connections/{}/cancel", base_url(port), id)).await?;

    if resp.cancelled {
        println!("✓ Cancel requested for connection #{}", resp.id);
    } else {
        println!("Connection #{} had already finished.", resp.id);
    }
    Ok(())
}
