//! # Cash Session Repository
//!
//! Database operations for cash-drawer sessions.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Cash Session Lifecycle                              │
//! │                                                                         │
//! │  1. OPEN                                                               │
//! │     └── open(user, opening) → CashSession { status: Open }             │
//! │         (refused if the user already holds an open session)            │
//! │                                                                         │
//! │  2. SELL                                                               │
//! │     └── sales recorded against the session (SaleRepository)            │
//! │                                                                         │
//! │  3. CLOSE (terminal - no reopen)                                       │
//! │     └── close(id, declared, at) → status: Closed,                      │
//! │         declared_closing_cents recorded for reconciliation             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use till_core::{CashSession, CoreError, Money, SessionStatus};

use crate::error::{StoreError, StoreResult};

/// Repository for cash-session database operations.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Creates a new SessionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    /// Opens a new session for `user_id` with the given opening float.
    ///
    /// A user may hold at most one open session; violating that is a
    /// domain error, not a silent overwrite.
    pub async fn open(&self, user_id: &str, opening: Money) -> StoreResult<CashSession> {
        if let Some(existing) = self.open_session_for_user(user_id).await? {
            return Err(StoreError::Conflict(
                CoreError::SessionAlreadyOpen {
                    user_id: user_id.to_string(),
                    session_id: existing.id,
                }
                .to_string(),
            ));
        }

        let session = CashSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            opened_at: Utc::now(),
            closed_at: None,
            opening_cents: opening.cents(),
            declared_closing_cents: None,
            status: SessionStatus::Open,
        };

        debug!(id = %session.id, user_id = %user_id, opening = %opening, "Opening cash session");

        sqlx::query(
            r#"
            INSERT INTO cash_sessions (
                id, user_id, opened_at, closed_at,
                opening_cents, declared_closing_cents, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(session.opened_at)
        .bind(session.closed_at)
        .bind(session.opening_cents)
        .bind(session.declared_closing_cents)
        .bind(session.status)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    /// Gets a session by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<CashSession>> {
        let session = sqlx::query_as::<_, CashSession>(
            r#"
            SELECT id, user_id, opened_at, closed_at,
                   opening_cents, declared_closing_cents, status
            FROM cash_sessions
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// The user's currently open session, if any.
    pub async fn open_session_for_user(&self, user_id: &str) -> StoreResult<Option<CashSession>> {
        let session = sqlx::query_as::<_, CashSession>(
            r#"
            SELECT id, user_id, opened_at, closed_at,
                   opening_cents, declared_closing_cents, status
            FROM cash_sessions
            WHERE user_id = ?1 AND status = 'open'
            ORDER BY opened_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// All currently open sessions (any user).
    pub async fn list_open(&self) -> StoreResult<Vec<CashSession>> {
        let sessions = sqlx::query_as::<_, CashSession>(
            r#"
            SELECT id, user_id, opened_at, closed_at,
                   opening_cents, declared_closing_cents, status
            FROM cash_sessions
            WHERE status = 'open'
            ORDER BY opened_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Applies the single Open→Closed transition.
    ///
    /// The WHERE clause only matches open rows, so a second close finds
    /// nothing to update and returns NotFound - the engine translates that
    /// into a descriptive already-closed error.
    pub async fn close(
        &self,
        id: &str,
        declared: Money,
        closed_at: DateTime<Utc>,
    ) -> StoreResult<CashSession> {
        let result = sqlx::query(
            r#"
            UPDATE cash_sessions
            SET status = 'closed', closed_at = ?2, declared_closing_cents = ?3
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(id)
        .bind(closed_at)
        .bind(declared.cents())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("open cash_session", id));
        }

        self.get(id)
            .await?
            .ok_or_else(|| StoreError::not_found("cash_session", id))
    }
}

// =============================================================================
// Tests
// =============================================================================
