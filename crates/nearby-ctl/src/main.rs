//! nearby-ctl — command-line interface for the Nearby daemon.

mod cmd;

use anyhow::{Context, Result};

const DEFAULT_PORT: u16 = 9101;

fn print_usage() {
    println!("Usage: nearby-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status              Show discovery state, peers, and connection counts");
    println!("  publish             Advertise this device");
    println!("  search              Search for advertising peers");
    println!("  peers               List discovered peers");
    println!("  connect <name>      Request a network to a discovered peer");
    println!("  connections         List connection attempts");
    println!("  cancel <id>         Cancel a connection attempt");
    println!("  teardown            Stop the current discovery session");
    println!("  shutdown            Stop the daemon");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["publish"] => cmd::sessions::cmd_publish(port).await,
        ["search"] | ["subscribe"] => cmd::sessions::cmd_search(port).await,
        ["peers"] => cmd::peers::cmd_peers(port).await,
        ["connect", name @ ..] if !name.is_empty() => {
            cmd::peers::cmd_connect(port, &name.join(" ")).await
        }
        ["connections"] => cmd::connections::cmd_connections(port).await,
        ["cancel", id] => cmd::connections::cmd_cancel(port, id).await,
        ["teardown"] => cmd::sessions::cmd_teardown(port).await,
        ["shutdown"] => cmd::status::cmd_shutdown(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
