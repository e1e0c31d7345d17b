//! Drives a running simulator from the command line
//!
//! Connects, prints the simulator version and network edges, optionally slows
//! one vehicle down for a while, advances simulated time and ends the
//! simulation.
//!
//! Run with: `cargo run --example step_demo -- --port 3456 --seconds 20`

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use traclink::client::{Session, SessionConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON session configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Simulated seconds to advance
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Wall-clock milliseconds handed to each advance call
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,

    /// Vehicle to slow down at the start
    #[arg(long)]
    vehicle: Option<String>,

    /// Target speed for `--vehicle`, in m/s
    #[arg(long, default_value_t = 5.0)]
    speed: f64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => SessionConfig::default(),
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let mut session = Session::new(config);
    session.connect().await?;

    let version = session.get_version().await?;
    info!(version = %serde_json::to_string(&version)?, "Simulator version");

    let edges = session.edge_list().await?;
    info!(count = edges.len(), "Network edges");

    if let Some(vehicle) = &args.vehicle {
        session.change_speed(vehicle, args.speed, 3000).await?;
        info!(vehicle = %vehicle, speed = args.speed, "Speed change scheduled");
    }

    let target_ms = args.seconds * 1000;
    let tick_ms = args.tick_ms.max(1);
    let mut elapsed_ms = 0;
    while elapsed_ms < target_ms {
        let tick = tick_ms.min(target_ms - elapsed_ms);
        session.advance(tick).await?;
        elapsed_ms += tick;
        tokio::time::sleep(Duration::from_millis(tick)).await;
    }

    info!(
        step = ?session.current_step(),
        accumulated_ms = ?session.accumulated_ms(),
        "Advanced simulation"
    );

    session.end_simulation().await?;
    Ok(())
}
