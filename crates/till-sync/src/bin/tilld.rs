//! # tilld: Till POS Sync Daemon
//!
//! Long-running process that keeps a till's local store converged with the
//! remote system of record. Wires the full stack - store, remote client,
//! connectivity gate, cache, coordinator - from configuration and runs the
//! background sync loop until SIGINT.
//!
//! ```text
//! Usage: tilld [CONFIG_FILE]
//!
//! CONFIG_FILE   optional path to sync.toml; defaults to the platform
//!               config directory (~/.config/till-pos/sync.toml on Linux)
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use till_store::{Store, StoreConfig};
use till_sync::{
    ConnectivityGate, HttpRemoteClient, StateCache, SyncConfig, SyncCoordinator, SyncError,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        error!(error = %err, "tilld exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), SyncError> {
    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = SyncConfig::load_or_default(config_path.as_deref())?;

    let database_path = match config.database.path.clone() {
        Some(path) => path,
        None => SyncConfig::default_database_path().ok_or_else(|| {
            SyncError::InvalidConfig("cannot resolve a platform data directory".to_string())
        })?,
    };
    if let Some(parent) = database_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            SyncError::ConfigLoadFailed(format!("creating {}: {e}", parent.display()))
        })?;
    }

    let store = Store::new(StoreConfig::new(&database_path)).await?;

    let remote = Arc::new(HttpRemoteClient::new(
        &config.remote.base_url,
        config.request_timeout(),
    )?);
    let gate = Arc::new(ConnectivityGate::new(remote.clone(), config.probe_timeout()));
    if config.remote.force_offline {
        gate.force_offline(true);
    }

    let cache = StateCache::new(
        store.cache(),
        store.queue(),
        remote.clone(),
        gate.clone(),
        config.cache_settings(),
    );
    let coordinator = SyncCoordinator::new(
        store.queue(),
        remote,
        gate,
        cache,
        config.drain_settings(),
    );

    info!(
        remote = %config.remote.base_url,
        database = %database_path.display(),
        "tilld started"
    );

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let runner = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.run(shutdown_rx).await })
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(()).await;
    let _ = runner.await;
    store.close().await;
    info!("tilld stopped");
    Ok(())
}
