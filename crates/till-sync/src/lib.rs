//! # till-sync: Offline-First Sync Orchestration for Till POS
//!
//! This crate keeps a till usable with no network and converges it with the
//! remote system of record when connectivity allows. Every mutation follows
//! the same rule: apply locally first, queue durably, replay in order.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Till POS Sync Data Flow                           │
//! │                                                                         │
//! │   cashier action                                                        │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   ReconciliationEngine ──► till-store (durable, always succeeds        │
//! │        │                    while the disk works)                      │
//! │        │ queue op                                                       │
//! │        ▼                                                                │
//! │   SyncCoordinator ◄── ConnectivityGate (probed, never assumed)         │
//! │        │ drain: oldest-first, stop at first failure                    │
//! │        ▼                                                                │
//! │   RemoteClient ──► remote system of record                             │
//! │                                                                         │
//! │   StateCache serves remote-owned documents through a TTL +            │
//! │   stale + default fallback chain, so reads never need the network.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`connectivity`] - probe-based online/offline gate with edge detection
//! - [`coordinator`] - queue drain loop, retry policy, status surface
//! - [`reconciliation`] - cash-session lifecycle and drawer reconciliation
//! - [`cache`] - TTL'd read-through cache for remote state documents
//! - [`remote`] - the REST seam to the remote system of record
//! - [`config`] - TOML + environment configuration
//! - [`error`] - error types with retryable/application classification

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod reconciliation;
pub mod remote;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cache::{merge_json, CacheSettings, StateCache};
pub use config::SyncConfig;
pub use connectivity::{ConnectivityGate, Transition};
pub use coordinator::{DrainOutcome, DrainSettings, DrainState, SyncCoordinator, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use reconciliation::ReconciliationEngine;
pub use remote::{HttpRemoteClient, RemoteClient};
