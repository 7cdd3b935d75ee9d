//! replistore Controller Binary
//!
//! Starts the controller that owns the file index.

use clap::Parser;
use replistore::{ControllerConfig, ControllerServer};
use tracing_subscriber::{fmt, EnvFilter};

/// replistore Controller
#[derive(Parser, Debug)]
#[command(name = "replistore-controller")]
#[command(about = "Controller of a replicated file store")]
#[command(version)]
struct Args {
    /// Port to listen on for clients and storage nodes
    cport: u16,

    /// Replication factor: number of nodes each file is stored on
    replication_factor: usize,

    /// How long to wait for a node acknowledgement, in milliseconds
    timeout_ms: u64,

    /// Seconds between rebalance passes
    rebalance_period_s: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,replistore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("replistore controller v{}", replistore::VERSION);

    let config = ControllerConfig::builder()
        .listen_addr(format!("0.0.0.0:{}", args.cport))
        .replication_factor(args.replication_factor)
        .timeout_ms(args.timeout_ms)
        .rebalance_period_s(args.rebalance_period_s)
        .build();

    let server = match ControllerServer::bind(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start controller on port {}: {}", args.cport, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Controller error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Controller stopped");
}
