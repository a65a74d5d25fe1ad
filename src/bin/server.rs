//! mapkv Server Binary
//!
//! Serves a store over the memcached-style text protocol.

use std::path::PathBuf;

use clap::Parser;
use mapkv::network::Server;
use mapkv::{Engine, Options, ServerConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// mapkv Server
#[derive(Parser, Debug)]
#[command(name = "mapkv-server")]
#[command(about = "Memory-mapped key-value store server")]
#[command(version)]
struct Args {
    /// Data file (holds the index too unless --index is given)
    #[arg(short, long, default_value = "./mapkv.db")]
    data: PathBuf,

    /// Separate index file
    #[arg(short, long)]
    index: Option<PathBuf>,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "0.0.0.0:11211")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Hash tables for a new store
    #[arg(long, default_value = "256")]
    tables: u64,

    /// Initial buckets per table for a new store
    #[arg(long, default_value = "256")]
    buckets: u64,

    /// Largest accepted value in MB
    #[arg(long, default_value = "64")]
    max_value_mb: usize,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mapkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("mapkv Server v{}", mapkv::VERSION);
    tracing::info!("Data file: {}", args.data.display());
    if let Some(index) = &args.index {
        tracing::info!("Index file: {}", index.display());
    }

    let options = Options::builder()
        .tables(args.tables)
        .buckets(args.buckets)
        .build();

    let config = ServerConfig::builder()
        .data_path(args.data.clone())
        .index_path(args.index.clone())
        .options(options)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .max_value_size(args.max_value_mb * 1024 * 1024)
        .build();

    let engine = match Engine::open(&config.data_path, config.index_path.as_deref(), &config.options) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let server = match Server::bind(config, engine) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to bind: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = server.engine().lock().sync() {
        tracing::error!("Failed to sync store: {}", e);
    }
    tracing::info!("Server stopped");
}
