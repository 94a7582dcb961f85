//! CLI binary entry point for the swarmdb server.
//!
//! Usage:
//!   swarmdb-server [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>     Path to configuration TOML file
//!   -r, --rpc <ADDR>        RPC bind address (overrides config)
//!       --root <UUID>       Root node for queries
//!   -w, --writer <ID>       Writer tag for local stamps
//!   -s, --snapshot <FILE>   Snapshot file loaded at startup, saved on exit
//!   -v, --verbose           Increase logging verbosity

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use swarmdb_protocol::NodeId;
use swarmdb_server::config::ServerConfig;
use swarmdb_server::database::Database;
use swarmdb_server::rpc_server::RpcServer;
use swarmdb_state::{persistence, NodeStore};

/// swarmdb - CRDT graph store with a directive-driven query resolver.
#[derive(Parser, Debug)]
#[command(name = "swarmdb-server")]
#[command(about = "CRDT graph store served over JSON-RPC")]
#[command(version)]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// JSON-RPC server bind address (e.g., 127.0.0.1:9470).
    #[arg(short, long, value_name = "ADDR")]
    rpc: Option<String>,

    /// Node that top-level query fields are read from.
    #[arg(long, value_name = "UUID")]
    root: Option<NodeId>,

    /// Writer tag stamped on local mutations.
    #[arg(short, long, value_name = "ID")]
    writer: Option<String>,

    /// Snapshot file loaded at startup and written on shutdown.
    #[arg(short, long, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Increase logging verbosity (can be repeated: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration.
    let mut config = ServerConfig::load(cli.config.as_deref())?;

    // Apply CLI overrides.
    if let Some(rpc) = cli.rpc {
        config.rpc.bind_addr = rpc;
    }
    if let Some(root) = cli.root {
        config.query.root_id = Some(root);
    }
    if let Some(writer) = cli.writer {
        config.clock.writer_id = writer;
    }
    if let Some(snapshot) = cli.snapshot {
        config.store.snapshot_path = Some(snapshot);
    }

    // Adjust log level based on verbosity.
    let log_level = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    // Initialize logging.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if config.logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    tracing::info!(
        writer = %config.clock.writer_id,
        rpc = %config.rpc.bind_addr,
        root = ?config.query.root_id,
        "Starting swarmdb server"
    );

    let store = Arc::new(NodeStore::new(config.store_config()));

    let mut resume_at = 0;
    if let Some(path) = &config.store.snapshot_path {
        if let Some(snapshot) = persistence::load_store(&store, path).await? {
            resume_at = snapshot.max_time().unwrap_or(0);
        }
    }

    let db = Arc::new(Database::from_config(&config, Arc::clone(&store), resume_at));

    let rpc_server = RpcServer::new(
        config.rpc_socket_addr()?.to_string(),
        Arc::clone(&db),
        config.rpc.max_connections,
        config.request_timeout(),
    );

    let rpc_handle = tokio::spawn(async move {
        if let Err(e) = rpc_server.run().await {
            tracing::error!(error = %e, "RPC server error");
        }
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutdown requested");
        }
        _ = rpc_handle => {
            tracing::warn!("RPC server stopped");
        }
    }

    if let Some(path) = &config.store.snapshot_path {
        persistence::save_store(&store, path).await?;
    }

    Ok(())
}
