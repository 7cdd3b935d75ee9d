//! replistore Storage Node Binary
//!
//! Starts a storage node and joins it to the controller.

use clap::Parser;
use replistore::{DstoreConfig, DstoreServer};
use tracing_subscriber::{fmt, EnvFilter};

/// replistore Storage Node
#[derive(Parser, Debug)]
#[command(name = "replistore-dstore")]
#[command(about = "Storage node of a replicated file store")]
#[command(version)]
struct Args {
    /// Port to listen on for client data connections
    port: u16,

    /// Port of the controller (on localhost)
    cport: u16,

    /// Timeout for data connections, in milliseconds
    timeout_ms: u64,

    /// Directory holding this node's files (emptied on start)
    file_folder: String,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,replistore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("replistore dstore v{}", replistore::VERSION);

    let config = DstoreConfig::builder()
        .listen_addr(format!("0.0.0.0:{}", args.port))
        .controller_addr(format!("127.0.0.1:{}", args.cport))
        .timeout_ms(args.timeout_ms)
        .storage_dir(&args.file_folder)
        .build();

    let server = match DstoreServer::bind(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start storage node on port {}: {}", args.port, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Storage node error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Storage node stopped");
}
