//! # Sync Coordinator
//!
//! Owns the drain loop that replays the pending-operation queue against the
//! remote, plus the triggers that start it: explicit submits while online,
//! connectivity-restored edges, the periodic background tick, and the fixed
//! retry delay after a failed drain.
//!
//! ## Drain State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Drain Lifecycle                                 │
//! │                                                                         │
//! │            trigger (submit / edge / tick / retry / force)              │
//! │                              │                                          │
//! │        ┌─────────┐   try_lock ok    ┌──────────┐                       │
//! │        │  IDLE   │ ───────────────► │ DRAINING │──┐                    │
//! │        └─────────┘                  └──────────┘  │                    │
//! │             ▲      queue empty           │        │ first failure      │
//! │             └────────────────────────────┘        ▼                    │
//! │                                          ┌────────────────┐            │
//! │             ▲   retry_delay elapsed      │ PAUSED_ON_ERROR│            │
//! │             └────────────────────────────┴────────────────┘            │
//! │                                                                         │
//! │  At most one drain runs at a time (tokio::sync::Mutex::try_lock);      │
//! │  concurrent triggers are no-ops, an explicit force_sync() while a      │
//! │  drain holds the lock returns SyncInProgress.                          │
//! │                                                                         │
//! │  Inside a drain, operations replay strictly oldest-first and the       │
//! │  drain STOPS at the first failure - never skip-and-continue, so        │
//! │  per-entity ordering survives remote flakiness.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use till_core::{validation::validate_entity_id, EntityKind, PendingOperation};
use till_store::QueueRepository;

use crate::cache::StateCache;
use crate::connectivity::{ConnectivityGate, Transition};
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteClient;

/// Where the coordinator currently is in the drain lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainState {
    Idle,
    Draining,
    PausedOnError,
}

/// Result of a drain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The queue was fully replayed.
    Completed { succeeded: usize },
    /// A drain already held the lock; nothing was done.
    AlreadyRunning,
    /// The drain stopped at a failed operation; a retry is scheduled.
    Paused { succeeded: usize },
}

/// Point-in-time view of the sync engine for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub forced_offline: bool,
    pub pending_count: i64,
    pub error_count: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub drain_state: DrainState,
}

/// Tuning knobs for the drain loop, filled from [`crate::config::SyncConfig`].
#[derive(Debug, Clone)]
pub struct DrainSettings {
    /// Operations fetched per queue read inside a drain.
    pub batch_size: u32,
    /// Transient failures tolerated per operation before dead-lettering.
    pub max_attempts: i64,
    /// Fixed delay before retrying after a paused drain.
    pub retry_delay: Duration,
    /// How long a submit caller waits for its best-effort drain.
    pub submit_timeout: Duration,
    /// Background tick for connectivity refresh and opportunistic drains.
    pub poll_interval: Duration,
}

impl Default for DrainSettings {
    fn default() -> Self {
        DrainSettings {
            batch_size: till_core::DEFAULT_BATCH_SIZE,
            max_attempts: till_core::DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_secs(30),
            submit_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct Shared {
    drain_state: DrainState,
    last_sync_at: Option<DateTime<Utc>>,
}

/// Replays the durable queue against the remote and tracks sync health.
#[derive(Clone)]
pub struct SyncCoordinator {
    queue: QueueRepository,
    remote: Arc<dyn RemoteClient>,
    gate: Arc<ConnectivityGate>,
    cache: StateCache,
    settings: DrainSettings,
    drain_lock: Arc<Mutex<()>>,
    shared: Arc<RwLock<Shared>>,
}

impl SyncCoordinator {
    /// Creates a coordinator over the queue, remote seam, gate, and cache.
    pub fn new(
        queue: QueueRepository,
        remote: Arc<dyn RemoteClient>,
        gate: Arc<ConnectivityGate>,
        cache: StateCache,
        settings: DrainSettings,
    ) -> Self {
        SyncCoordinator {
            queue,
            remote,
            gate,
            cache,
            settings,
            drain_lock: Arc::new(Mutex::new(())),
            shared: Arc::new(RwLock::new(Shared {
                drain_state: DrainState::Idle,
                last_sync_at: None,
            })),
        }
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Durably enqueues an operation, then - if the remote is reachable -
    /// kicks a best-effort drain the caller waits on for at most
    /// `submit_timeout`. The enqueue itself never depends on connectivity.
    pub async fn submit(&self, op: PendingOperation) -> SyncResult<String> {
        validate_entity_id(&op.entity_id)?;
        let id = op.id.clone();
        self.queue.enqueue(&op).await?;
        debug!(id = %id, entity = %op.entity, "Operation queued");

        if self.gate.is_online().await {
            self.kick_drain_bounded().await;
        }
        Ok(id)
    }

    /// Routes a state-document update: the cache applies the optimistic
    /// merge and enqueues the mutation, then the coordinator kicks a drain.
    pub async fn submit_state_update(
        &self,
        scope_key: &str,
        update: serde_json::Value,
    ) -> SyncResult<PendingOperation> {
        let op = self.cache.set(scope_key, update).await?;
        if self.gate.is_online().await {
            self.kick_drain_bounded().await;
        }
        Ok(op)
    }

    /// Spawns a drain and waits for it up to `submit_timeout`. If the
    /// timeout elapses the drain keeps running in the background; only the
    /// caller stops waiting.
    async fn kick_drain_bounded(&self) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = this.drain().await {
                warn!(error = %err, "Submit-triggered drain failed");
            }
        });
        let _ = tokio::time::timeout(self.settings.submit_timeout, handle).await;
    }

    // =========================================================================
    // Draining
    // =========================================================================

    /// Replays the queue oldest-first. Returns `AlreadyRunning` if another
    /// drain holds the lock.
    pub async fn drain(&self) -> SyncResult<DrainOutcome> {
        let _guard = match self.drain_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Ok(DrainOutcome::AlreadyRunning),
        };

        self.set_state(DrainState::Draining).await;
        match self.drain_queue().await {
            Ok((succeeded, false)) => {
                self.finish_drain(succeeded).await;
                Ok(DrainOutcome::Completed { succeeded })
            }
            Ok((succeeded, true)) => {
                self.set_state(DrainState::PausedOnError).await;
                self.schedule_retry();
                Ok(DrainOutcome::Paused { succeeded })
            }
            Err(err) => {
                // Local storage failure: nothing a retry timer can fix
                self.set_state(DrainState::Idle).await;
                Err(err)
            }
        }
    }

    /// Explicit full sync: drains the queue, then re-fetches every cached
    /// scope regardless of TTL. Refuses to overlap with a running drain.
    pub async fn force_sync(&self) -> SyncResult<DrainOutcome> {
        let _guard = match self.drain_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Err(SyncError::SyncInProgress),
        };

        info!("Forced sync requested");
        self.set_state(DrainState::Draining).await;
        let drained = self.drain_queue().await;

        // Refresh the cache even if the drain paused; failures are logged
        // per scope and never abort the sweep.
        for scope_key in self.cache.scope_keys().await? {
            if let Err(err) = self.cache.refresh(&scope_key).await {
                warn!(scope_key = %scope_key, error = %err, "Forced cache refresh failed");
            }
        }

        match drained {
            Ok((succeeded, false)) => {
                self.finish_drain(succeeded).await;
                Ok(DrainOutcome::Completed { succeeded })
            }
            Ok((succeeded, true)) => {
                self.set_state(DrainState::PausedOnError).await;
                self.schedule_retry();
                Ok(DrainOutcome::Paused { succeeded })
            }
            Err(err) => {
                self.set_state(DrainState::Idle).await;
                Err(err)
            }
        }
    }

    /// The inner replay loop. Returns `(succeeded, paused)`; `paused` is
    /// true when the drain stopped at a failed operation.
    ///
    /// Caller must hold the drain lock.
    async fn drain_queue(&self) -> SyncResult<(usize, bool)> {
        let mut succeeded = 0usize;

        loop {
            let batch = self.queue.peek_batch(self.settings.batch_size).await?;
            if batch.is_empty() {
                return Ok((succeeded, false));
            }

            for op in batch {
                match self.remote.apply(&op).await {
                    Ok(()) => {
                        self.queue.mark_succeeded(&op.id).await?;
                        succeeded += 1;
                        debug!(id = %op.id, entity = %op.entity, "Operation applied");

                        // A confirmed settings write supersedes the
                        // optimistic local copy; the next read re-fetches.
                        if op.entity == EntityKind::Settings {
                            if let Some(scope_key) = &op.owner_key {
                                if let Err(err) = self.cache.invalidate(scope_key).await {
                                    warn!(scope_key = %scope_key, error = %err, "Cache invalidation failed");
                                }
                            }
                        }
                    }
                    Err(err) if err.is_application_rejection() => {
                        error!(
                            id = %op.id,
                            entity = %op.entity,
                            error = %err,
                            "Remote rejected operation, dead-lettering"
                        );
                        self.queue.dead_letter(&op.id, &err.to_string()).await?;
                        return Ok((succeeded, true));
                    }
                    Err(err) => {
                        let exhausted = self
                            .queue
                            .mark_failed(&op.id, &err.to_string(), self.settings.max_attempts)
                            .await?;
                        warn!(
                            id = %op.id,
                            entity = %op.entity,
                            error = %err,
                            exhausted = exhausted,
                            "Operation failed, pausing drain"
                        );
                        return Ok((succeeded, true));
                    }
                }
            }
        }
    }

    fn schedule_retry(&self) {
        let this = self.clone();
        let delay = this.settings.retry_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if this.drain_state().await != DrainState::PausedOnError {
                return;
            }
            debug!("Retry delay elapsed, re-attempting drain");
            if let Err(err) = this.drain().await {
                warn!(error = %err, "Scheduled retry drain failed");
            }
        });
    }

    async fn finish_drain(&self, succeeded: usize) {
        if succeeded > 0 {
            info!(succeeded = succeeded, "Drain completed");
        }
        let mut shared = self.shared.write().await;
        shared.drain_state = DrainState::Idle;
        shared.last_sync_at = Some(Utc::now());
    }

    async fn set_state(&self, state: DrainState) {
        self.shared.write().await.drain_state = state;
    }

    /// Current drain state.
    pub async fn drain_state(&self) -> DrainState {
        self.shared.read().await.drain_state
    }

    // =========================================================================
    // Status and operator actions
    // =========================================================================

    /// Snapshot for status surfaces. Uses the last published connectivity
    /// value; it never probes the network.
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        let shared = self.shared.read().await;
        Ok(SyncStatus {
            is_online: self.gate.last_known(),
            forced_offline: self.gate.is_forced_offline(),
            pending_count: self.queue.drainable_count().await?,
            error_count: self.queue.error_count().await?,
            last_sync_at: shared.last_sync_at,
            drain_state: shared.drain_state,
        })
    }

    /// Dead-lettered operations for operator review.
    pub async fn dead_letters(&self) -> SyncResult<Vec<till_store::DeadLetter>> {
        Ok(self.queue.dead_letters().await?)
    }

    /// Discards the dead-letter set after operator review.
    pub async fn clear_errors(&self) -> SyncResult<u64> {
        let purged = self.queue.purge_dead_letters().await?;
        if purged > 0 {
            info!(purged = purged, "Dead-letter set cleared");
        }
        Ok(purged)
    }

    // =========================================================================
    // Background loop
    // =========================================================================

    /// Long-running loop: refreshes connectivity every `poll_interval`,
    /// drains on the offline→online edge, and opportunistically drains a
    /// non-empty queue while online. Exits when the shutdown channel fires.
    pub async fn run(&self, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(poll_interval = ?self.settings.poll_interval, "Sync loop started");
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.gate.refresh().await {
                        Transition::CameOnline => {
                            if let Err(err) = self.drain().await {
                                warn!(error = %err, "Reconnect drain failed");
                            }
                        }
                        Transition::Unchanged(true) => {
                            match self.queue.drainable_count().await {
                                Ok(0) => {}
                                Ok(_) => {
                                    if let Err(err) = self.drain().await {
                                        warn!(error = %err, "Periodic drain failed");
                                    }
                                }
                                Err(err) => warn!(error = %err, "Queue count check failed"),
                            }
                        }
                        Transition::WentOffline | Transition::Unchanged(false) => {}
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Sync loop shutting down");
                    break;
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
