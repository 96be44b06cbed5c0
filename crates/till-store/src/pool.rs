//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Store Lifecycle                                    │
//! │                                                                         │
//! │  Application startup                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreConfig::new(path) ← pool settings                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Store::new(config).await ← create pool + run migrations               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  One Store instance, injected by reference into SyncCoordinator,      │
//! │  StateCache and ReconciliationEngine. Single-instance semantics        │
//! │  without hidden global state.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! Write-Ahead Logging is enabled so status reads (pending/error counts)
//! never block the drain loop's writes, and vice versa.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::StoreResult;
use crate::migrations;
use crate::repository::cache::CacheRepository;
use crate::repository::queue::QueueRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::session::SessionRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,

    /// Maximum pool connections.
    pub max_connections: u32,

    /// How long a connection waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl StoreConfig {
    /// Creates a config for the given database path with defaults.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            path: path.into(),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// The local durable store: a connection pool plus repository accessors.
///
/// Cheap to clone (the pool is internally reference-counted).
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if needed) the database at `config.path`, applies
    /// migrations, and returns a ready store.
    pub async fn new(config: StoreConfig) -> StoreResult<Self> {
        info!(path = %config.path.display(), "Opening local store");

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        migrations::run_migrations(&pool).await?;

        debug!("Local store ready");
        Ok(Store { pool })
    }

    /// Opens an in-memory database for tests.
    ///
    /// A single connection is required: each in-memory connection would
    /// otherwise see its own empty database.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        migrations::run_migrations(&pool).await?;

        Ok(Store { pool })
    }

    /// Raw pool access (repositories only).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Pending-operation queue + dead-letter set.
    pub fn queue(&self) -> QueueRepository {
        QueueRepository::new(self.pool.clone())
    }

    /// Cash sessions.
    pub fn sessions(&self) -> SessionRepository {
        SessionRepository::new(self.pool.clone())
    }

    /// Sales.
    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    /// Persisted remote-state cache.
    pub fn cache(&self) -> CacheRepository {
        CacheRepository::new(self.pool.clone())
    }

    /// Closes the pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// =============================================================================
// Tests
// =============================================================================
