//! # Reconciliation Engine
//!
//! Orchestrates the cash-session lifecycle: opening a drawer, recording
//! sales against it, validating that it may close, and applying the
//! terminal close with the operator's declared count. The drawer arithmetic
//! itself lives in till-core; this module wires it to storage, the sync
//! queue, and the remote cross-checks.
//!
//! ## Closing Validation Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  validate_for_closing(session)                          │
//! │                                                                         │
//! │  session not open ──────────────► blocked (always, purely local)       │
//! │                                                                         │
//! │  ONLINE:   local checks (pending sales, other local open sessions)     │
//! │            + remote open-session cross-check for the same user         │
//! │                                                                         │
//! │  OFFLINE, permissive (default): can_close = true on trust of local     │
//! │            state - a drawer must always be closable at end of shift    │
//! │                                                                         │
//! │  OFFLINE, strict: local checks only, no remote consultation           │
//! │                                                                         │
//! │  A remote failure mid-check degrades the same way as being offline.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use till_core::{
    closing_issues, summarize,
    validation::{validate_declared_amount, validate_opening_amount},
    CashSession, ClosingCheck, ClosingIssue, CoreError, EntityKind, Money, OperationKind,
    PendingOperation, ReconciliationSummary, Sale,
};
use till_store::{Store, StoreError};

use crate::connectivity::ConnectivityGate;
use crate::coordinator::SyncCoordinator;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteClient;

/// Drives cash-session opening, sales, and reconciled closing.
#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Store,
    remote: Arc<dyn RemoteClient>,
    gate: Arc<ConnectivityGate>,
    coordinator: SyncCoordinator,
    /// When offline, allow closing on trust of local state alone.
    permissive_offline: bool,
}

impl ReconciliationEngine {
    /// Creates an engine over the store, remote seam, gate, and coordinator.
    pub fn new(
        store: Store,
        remote: Arc<dyn RemoteClient>,
        gate: Arc<ConnectivityGate>,
        coordinator: SyncCoordinator,
        permissive_offline: bool,
    ) -> Self {
        ReconciliationEngine {
            store,
            remote,
            gate,
            coordinator,
            permissive_offline,
        }
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Opens a drawer session for a user with the counted opening float.
    ///
    /// Persists locally first, then queues the creation for the remote -
    /// opening a drawer never waits on the network.
    pub async fn open_session(&self, user_id: &str, opening: Money) -> SyncResult<CashSession> {
        validate_opening_amount(opening)?;

        let session = self.store.sessions().open(user_id, opening).await?;
        info!(id = %session.id, user_id = %user_id, opening = %opening, "Cash session opened");

        let op = PendingOperation::new(
            OperationKind::Create,
            EntityKind::CashSession,
            &session.id,
            Some(session.user_id.clone()),
            serde_json::to_string(&session)?,
        );
        self.coordinator.submit(op).await?;
        Ok(session)
    }

    /// Records a sale against an open session and queues it for the remote.
    pub async fn record_sale(&self, sale: Sale) -> SyncResult<Sale> {
        let session = self.require_session(&sale.session_id).await?;
        if !session.is_open() {
            return Err(CoreError::SessionAlreadyClosed { id: session.id }.into());
        }

        self.store.sales().record(&sale).await?;
        debug!(id = %sale.id, session_id = %sale.session_id, amount = %sale.amount(), "Sale recorded");

        let op = PendingOperation::new(
            OperationKind::Create,
            EntityKind::Sale,
            &sale.id,
            Some(sale.user_id.clone()),
            serde_json::to_string(&sale)?,
        );
        self.coordinator.submit(op).await?;
        Ok(sale)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Computes the drawer summary for a session against a declared count.
    ///
    /// When the remote is reachable, sales it recorded for this session
    /// (e.g. from another till) are merged in by id; otherwise the summary
    /// is computed from local sales alone.
    pub async fn summarize_session(
        &self,
        session_id: &str,
        declared: Money,
    ) -> SyncResult<ReconciliationSummary> {
        validate_declared_amount(declared)?;
        let session = self.require_session(session_id).await?;

        let mut sales = self.store.sales().list_for_session(session_id).await?;
        if self.gate.is_online().await {
            match self.remote.sales_for_session(session_id).await {
                Ok(remote_sales) => {
                    for remote_sale in remote_sales {
                        if !sales.iter().any(|s| s.id == remote_sale.id) {
                            sales.push(remote_sale);
                        }
                    }
                }
                Err(err) => {
                    warn!(session_id = %session_id, error = %err, "Remote sales unavailable, summarizing locally");
                }
            }
        }

        Ok(summarize(&session, &sales, declared))
    }

    /// Collects everything that blocks a session from closing.
    pub async fn validate_for_closing(&self, session_id: &str) -> SyncResult<ClosingCheck> {
        let session = self.require_session(session_id).await?;

        // Not-open is known locally with certainty; no policy softens it
        if !session.is_open() {
            return Ok(ClosingCheck::from_issues(vec![ClosingIssue::SessionNotOpen]));
        }

        let online = self.gate.is_online().await;
        if !online && self.permissive_offline {
            info!(session_id = %session_id, "Offline: closing validation degraded to permissive");
            return Ok(ClosingCheck::permissive());
        }

        let sales = self.store.sales().list_for_session(session_id).await?;
        let mut others: Vec<CashSession> = self
            .store
            .sessions()
            .list_open()
            .await?
            .into_iter()
            .filter(|s| s.id != session.id && s.user_id == session.user_id)
            .collect();

        if online {
            match self.remote.open_sessions_for_user(&session.user_id).await {
                Ok(remote_sessions) => {
                    for remote_session in remote_sessions {
                        let known = remote_session.id == session.id
                            || others.iter().any(|s| s.id == remote_session.id);
                        if !known {
                            others.push(remote_session);
                        }
                    }
                }
                Err(err) => {
                    warn!(session_id = %session_id, error = %err, "Remote session check failed");
                    if self.permissive_offline {
                        return Ok(ClosingCheck::permissive());
                    }
                }
            }
        }

        Ok(ClosingCheck::from_issues(closing_issues(
            &session, &sales, &others,
        )))
    }

    /// Applies the terminal Open→Closed transition with the declared count.
    ///
    /// The close is validated first; a blocked session surfaces its issues
    /// to the operator instead of closing. On success the closed session is
    /// queued for the remote.
    pub async fn close_session(
        &self,
        session_id: &str,
        declared: Money,
    ) -> SyncResult<CashSession> {
        validate_declared_amount(declared)?;

        let session = self.require_session(session_id).await?;
        if !session.is_open() {
            return Err(CoreError::SessionAlreadyClosed { id: session.id }.into());
        }

        let check = self.validate_for_closing(session_id).await?;
        if !check.can_close {
            return Err(SyncError::ClosingBlocked {
                issues: check.messages(),
            });
        }

        let closed = match self
            .store
            .sessions()
            .close(session_id, declared, Utc::now())
            .await
        {
            Ok(closed) => closed,
            // Lost the race with another close: the transition is terminal
            Err(StoreError::NotFound { .. }) => {
                return Err(CoreError::SessionAlreadyClosed {
                    id: session_id.to_string(),
                }
                .into())
            }
            Err(err) => return Err(err.into()),
        };

        let summary = summarize(
            &closed,
            &self.store.sales().list_for_session(session_id).await?,
            declared,
        );
        info!(
            id = %closed.id,
            declared = %declared,
            expected_cash = %summary.expected_cash,
            difference = %summary.difference,
            balanced = summary.balances(),
            "Cash session closed"
        );

        let op = PendingOperation::new(
            OperationKind::Update,
            EntityKind::CashSession,
            &closed.id,
            Some(closed.user_id.clone()),
            serde_json::to_string(&closed)?,
        );
        self.coordinator.submit(op).await?;
        Ok(closed)
    }

    async fn require_session(&self, session_id: &str) -> SyncResult<CashSession> {
        self.store
            .sessions()
            .get(session_id)
            .await?
            .ok_or_else(|| CoreError::SessionNotFound(session_id.to_string()).into())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheSettings, StateCache};
    use crate::coordinator::DrainSettings;
    use crate::remote::mock::MockRemote;
    use std::time::Duration;
    use till_core::{PaymentMethod, SaleStatus, SessionStatus};

    async fn fixture(remote: Arc<MockRemote>, permissive: bool) -> (Store, ReconciliationEngine) {
        let store = Store::in_memory().await.unwrap();
        let gate = Arc::new(ConnectivityGate::new(
            remote.clone(),
            Duration::from_millis(200),
        ));
        let cache = StateCache::new(
            store.cache(),
            store.queue(),
            remote.clone(),
            gate.clone(),
            CacheSettings::default(),
        );
        let coordinator = SyncCoordinator::new(
            store.queue(),
            remote.clone(),
            gate.clone(),
            cache,
            DrainSettings {
                retry_delay: Duration::from_secs(600),
                ..DrainSettings::default()
            },
        );
        let engine = ReconciliationEngine::new(store.clone(), remote, gate, coordinator, permissive);
        (store, engine)
    }

    fn sale(id: &str, session: &CashSession, method: PaymentMethod, cents: i64, status: SaleStatus) -> Sale {
        Sale {
            id: id.into(),
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
            method,
            amount_cents: cents,
            status,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_open_session_persists_and_queues_offline() {
        let remote = Arc::new(MockRemote::offline());
        let (store, engine) = fixture(remote.clone(), true).await;

        let session = engine
            .open_session("user-1", Money::from_cents(10_000))
            .await
            .unwrap();
        assert!(session.is_open());

        // Durable locally, queued for the remote, nothing applied yet
        assert!(store.sessions().get(&session.id).await.unwrap().is_some());
        assert_eq!(store.queue().drainable_count().await.unwrap(), 1);
        assert!(remote.applied().is_empty());
    }

    #[tokio::test]
    async fn test_record_sale_requires_open_session() {
        let remote = Arc::new(MockRemote::offline());
        let (_store, engine) = fixture(remote.clone(), true).await;

        let session = engine.open_session("user-1", Money::zero()).await.unwrap();
        engine
            .record_sale(sale("s1", &session, PaymentMethod::Cash, 500, SaleStatus::Completed))
            .await
            .unwrap();

        engine.close_session(&session.id, Money::from_cents(500)).await.unwrap();
        let err = engine
            .record_sale(sale("s2", &session, PaymentMethod::Cash, 500, SaleStatus::Completed))
            .await;
        assert!(matches!(
            err,
            Err(SyncError::Core(CoreError::SessionAlreadyClosed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_summary_matches_drawer_arithmetic() {
        let remote = Arc::new(MockRemote::offline());
        let (_store, engine) = fixture(remote.clone(), true).await;

        let session = engine
            .open_session("user-1", Money::from_cents(10_000))
            .await
            .unwrap();
        for s in [
            sale("s1", &session, PaymentMethod::Cash, 2_550, SaleStatus::Completed),
            sale("s2", &session, PaymentMethod::Cash, 1_000, SaleStatus::Pending),
            sale("s3", &session, PaymentMethod::Card, 4_000, SaleStatus::Completed),
            sale("s4", &session, PaymentMethod::Cash, 9_999, SaleStatus::Voided),
        ] {
            engine.record_sale(s).await.unwrap();
        }

        let summary = engine
            .summarize_session(&session.id, Money::from_cents(14_000))
            .await
            .unwrap();

        assert_eq!(summary.sales_count, 3);
        assert_eq!(summary.total_for(PaymentMethod::Cash), Money::from_cents(3_550));
        assert_eq!(summary.total_for(PaymentMethod::Card), Money::from_cents(4_000));
        assert_eq!(summary.expected_cash, Money::from_cents(13_550));
        assert_eq!(summary.difference, Money::from_cents(450));
        assert!(!summary.balances());
    }

    #[tokio::test]
    async fn test_summary_merges_remote_sales_by_id() {
        let remote = Arc::new(MockRemote::online());
        let (_store, engine) = fixture(remote.clone(), true).await;

        let session = engine.open_session("user-1", Money::zero()).await.unwrap();
        let local = sale("s1", &session, PaymentMethod::Cash, 1_000, SaleStatus::Completed);
        engine.record_sale(local.clone()).await.unwrap();

        // Remote knows the same sale plus one from another till
        remote.set_remote_sales(vec![
            local,
            sale("s2", &session, PaymentMethod::Card, 2_000, SaleStatus::Completed),
        ]);

        let summary = engine
            .summarize_session(&session.id, Money::from_cents(1_000))
            .await
            .unwrap();
        assert_eq!(summary.sales_count, 2);
        assert_eq!(summary.total_for(PaymentMethod::Card), Money::from_cents(2_000));
    }

    #[tokio::test]
    async fn test_pending_sales_block_close_online() {
        let remote = Arc::new(MockRemote::online());
        let (_store, engine) = fixture(remote.clone(), true).await;

        let session = engine.open_session("user-1", Money::zero()).await.unwrap();
        engine
            .record_sale(sale("s1", &session, PaymentMethod::Card, 700, SaleStatus::Pending))
            .await
            .unwrap();

        let check = engine.validate_for_closing(&session.id).await.unwrap();
        assert!(!check.can_close);
        assert_eq!(check.issues, vec![ClosingIssue::PendingSales { count: 1 }]);

        let err = engine.close_session(&session.id, Money::zero()).await;
        assert!(matches!(err, Err(SyncError::ClosingBlocked { .. })));
    }

    #[tokio::test]
    async fn test_remote_open_session_blocks_close() {
        let remote = Arc::new(MockRemote::online());
        let (_store, engine) = fixture(remote.clone(), true).await;

        let session = engine.open_session("user-1", Money::zero()).await.unwrap();
        remote.set_remote_open_sessions(vec![CashSession {
            id: "remote-session".into(),
            user_id: "user-1".into(),
            opened_at: Utc::now(),
            closed_at: None,
            opening_cents: 0,
            declared_closing_cents: None,
            status: SessionStatus::Open,
        }]);

        let check = engine.validate_for_closing(&session.id).await.unwrap();
        assert!(!check.can_close);
        assert!(matches!(
            check.issues[0],
            ClosingIssue::ConcurrentOpenSession { .. }
        ));
    }

    #[tokio::test]
    async fn test_offline_permissive_allows_close_despite_pending() {
        let remote = Arc::new(MockRemote::offline());
        let (_store, engine) = fixture(remote.clone(), true).await;

        let session = engine.open_session("user-1", Money::zero()).await.unwrap();
        engine
            .record_sale(sale("s1", &session, PaymentMethod::Card, 700, SaleStatus::Pending))
            .await
            .unwrap();

        let check = engine.validate_for_closing(&session.id).await.unwrap();
        assert!(check.can_close);
        assert!(check.issues.is_empty());

        let closed = engine.close_session(&session.id, Money::zero()).await.unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
    }

    #[tokio::test]
    async fn test_offline_strict_still_runs_local_checks() {
        let remote = Arc::new(MockRemote::offline());
        let (_store, engine) = fixture(remote.clone(), false).await;

        let session = engine.open_session("user-1", Money::zero()).await.unwrap();
        engine
            .record_sale(sale("s1", &session, PaymentMethod::Card, 700, SaleStatus::Pending))
            .await
            .unwrap();

        let check = engine.validate_for_closing(&session.id).await.unwrap();
        assert!(!check.can_close);
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let remote = Arc::new(MockRemote::offline());
        let (_store, engine) = fixture(remote.clone(), true).await;

        let session = engine.open_session("user-1", Money::zero()).await.unwrap();
        engine.close_session(&session.id, Money::zero()).await.unwrap();

        let err = engine.close_session(&session.id, Money::zero()).await;
        assert!(matches!(
            err,
            Err(SyncError::Core(CoreError::SessionAlreadyClosed { .. }))
        ));

        // A closed session also reports not-open through validation
        let check = engine.validate_for_closing(&session.id).await.unwrap();
        assert_eq!(check.issues, vec![ClosingIssue::SessionNotOpen]);
    }

    #[tokio::test]
    async fn test_negative_declared_amount_is_rejected() {
        let remote = Arc::new(MockRemote::offline());
        let (_store, engine) = fixture(remote.clone(), true).await;

        let session = engine.open_session("user-1", Money::zero()).await.unwrap();
        let err = engine
            .close_session(&session.id, Money::from_cents(-1))
            .await;
        assert!(matches!(err, Err(SyncError::Validation(_))));
    }
}
