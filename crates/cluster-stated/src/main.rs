//! Cluster state server.
//!
//! Opens the document store once, upgrades the local agent configuration
//! if one is named, and serves health probes until Ctrl-C. Shutting down
//! closes the State Handle, which stops every live watcher.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cluster_state::State;
use cluster_state_agent::EnvSnapshot;
use cluster_state_store::RocksDocStore;
use cluster_stated::{create_router, Args};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cluster_state=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!(
        data_dir = %args.data_dir.display(),
        listen_addr = %args.listen_addr,
        agent_dir = ?args.agent_dir,
        max_attempts = args.max_attempts,
        "Starting cluster state server"
    );

    if let Some(dir) = &args.agent_dir {
        let config = cluster_state_agent::upgrade(dir, &EnvSnapshot::from_env())?;
        tracing::info!(tag = %config.tag(), "Agent config loaded");
    }

    tracing::info!(path = %args.data_dir.display(), "Opening RocksDB store");
    let store = Arc::new(RocksDocStore::open(&args.data_dir)?);
    let state = Arc::new(State::new(store, &args.state_config()));

    let app = create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    tracing::info!(listen_addr = %args.listen_addr, "Serving health probes");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.close();
    tracing::info!("Cluster state server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Cannot listen for Ctrl-C");
    }
    tracing::info!("Shutdown requested");
}
