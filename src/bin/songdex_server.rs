//! Songdex server - HTTP front for the derived-index pipeline.
//!
//! Usage:
//!   songdex-server --config songdex.yaml [--bind 0.0.0.0:8080] [--metrics]
//!
//! The row-store credential comes from the SONGDEX_API_TOKEN
//! environment variable; it is never part of the config file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use songdex::cache::{CacheCoordinator, MemoryResponseCache, PendingWrites};
use songdex::config::{self, AppConfig};
use songdex::kv::FileKvStore;
use songdex::metrics::Metrics;
use songdex::server::{build_router, derived_cache_keys, AppState};
use songdex::store::http::HttpRowStore;

#[derive(Debug, Parser)]
#[command(
    name = "songdex-server",
    version,
    about = "Derived-index service for the song archive"
)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "songdex.yaml")]
    config: PathBuf,

    /// Override the bind address from the config file.
    #[arg(long)]
    bind: Option<String>,

    /// Enable runtime metrics collection behind /api/stats.
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = AppConfig::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    let api_token = config::api_token_from_env()
        .with_context(|| format!("{} must be set", config::API_TOKEN_ENV))?;

    let store = HttpRowStore::new(&config.store, api_token)?;
    let kv = FileKvStore::open(&config.cache.data_dir)
        .with_context(|| format!("opening cache directory {}", config.cache.data_dir))?;
    let coordinator = CacheCoordinator::new(
        Box::new(kv),
        Box::new(MemoryResponseCache::default()),
        derived_cache_keys(&config),
    )?;

    let metrics = args.metrics.then(|| {
        info!("metrics collection enabled");
        Arc::new(Metrics::new())
    });

    let bind = args
        .bind
        .clone()
        .unwrap_or_else(|| config.server.bind.clone());

    let state = Arc::new(AppState {
        config,
        store: Arc::new(store),
        coordinator: Arc::new(coordinator),
        pending_writes: Arc::new(PendingWrites::default()),
        metrics,
    });

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    info!(
        addr = %bind,
        generation = state.coordinator.generation(),
        version = env!("CARGO_PKG_VERSION"),
        "songdex server listening"
    );

    let router = build_router(Arc::clone(&state));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight cache writes land before the process exits.
    state.pending_writes.drain().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to install shutdown handler: {}", err);
    }
}
