//! Discovery session commands: publish, search, teardown.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, post_json};

#[derive(Deserialize)]
struct SessionResponse {
    role: Option<String>,
    state: String,
    service_name: String,
}

pub async fn cmd_publish(port: u16) -> Result<()> {
    let resp: SessionResponse = post_json(&format!("{}/publish", base_url(port))).await?;
    print_session(&resp);
    Ok(())
}

pub async fn cmd_search(port: u16) -> Result<()> {
    let resp: SessionResponse = post_json(&format!("{}/subscribe", base_url(port))).await?;
    print_session(&resp);
    println!("  List results with: nearby-ctl peers");
    Ok(())
}

pub async fn cmd_teardown(port: u16) -> Result<()> {
    #[derive(Deserialize)]
    struct TeardownResponse {
        state: String,
    }

    let resp: TeardownResponse = post_json(&format!("{}/teardown", base_url(port))).await?;
    println!("Discovery {}.", resp.state);
    Ok(())
}

fn print_session(resp: &SessionResponse) {
    let role = resp.role.as_deref().unwrap_or("none");
    println!("✓ {} session {} ({})", role, resp.state, resp.service_name);
}
