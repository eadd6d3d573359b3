//! Peer listing and connect commands.

use anyhow::{anyhow, Result};
use reqwest::Url;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct PeerInfo {
    name: String,
    details: String,
    peer_handle: u32,
    session: String,
    attempt: Option<u64>,
}

pub async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No peers discovered yet.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Discovered Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        println!("  ┌─ {}", p.name);
        println!("  │  {}", p.details);
        match p.attempt {
            Some(id) => println!("  └─ connection : #{}", id),
            None => println!("  └─ handle     : {} via {}", p.peer_handle, p.session),
        }
    }

    Ok(())
}

pub async fn cmd_connect(port: u16, name: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct ConnectResponse {
        peer: String,
        attempt: u64,
        status: String,
    }

    let url = connect_url(port, name)?;
    let resp: ConnectResponse = post_json(url.as_str()).await?;

    println!("✓ Connection #{} to {} ({})", resp.attempt, resp.peer, resp.status);
    println!("  Follow it with: nearby-ctl connections");
    Ok(())
}

/// `/peers/{name}/connect`, with the name escaped as a single path segment.
fn connect_url(port: u16, name: &str) -> Result<Url> {
    let mut url = Url::parse(&base_url(port))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("daemon URL cannot carry a path"))?
        .extend(["peers", name, "connect"]);
    Ok(url)
}
