//! # Domain Types
//!
//! Core domain types used throughout Till POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌─────────────────┐   ┌─────────────────┐      │
//! │  │ PendingOperation │   │   CashSession   │   │      Sale       │      │
//! │  │  ──────────────  │   │  ─────────────  │   │  ─────────────  │      │
//! │  │  id              │   │  id             │   │  id             │      │
//! │  │  kind (CRUD)     │   │  user_id        │   │  session_id     │      │
//! │  │  entity          │   │  opening_cents  │   │  method         │      │
//! │  │  owner_key       │   │  status         │   │  amount_cents   │      │
//! │  │  attempt_count   │   │  declared_...   │   │  status         │      │
//! │  └──────────────────┘   └─────────────────┘   └─────────────────┘      │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌─────────────────┐   ┌─────────────────┐      │
//! │  │  OperationKind   │   │  SessionStatus  │   │ PaymentMethod   │      │
//! │  │  Create          │   │  Open           │   │  Cash           │      │
//! │  │  Update          │   │  Closed         │   │  Card           │      │
//! │  │  Delete          │   │  (terminal)     │   │  DigitalWallet  │      │
//! │  └──────────────────┘   └─────────────────┘   └─────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Replay Ordering
//! A `PendingOperation` belongs to an *ordering lane*: the pair of entity
//! kind and owner key. Operations within a lane must reach the remote in
//! submission order; lanes are independent of each other.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

// =============================================================================
// Operation Kind
// =============================================================================

/// The CRUD verb a queued operation applies remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create the entity remotely (POST).
    Create,
    /// Update the entity remotely (PUT).
    Update,
    /// Delete the entity remotely (DELETE).
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Entity Kind
// =============================================================================

/// The remote resource an operation targets.
///
/// Each kind maps to one REST collection on the remote system of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Sale,
    Product,
    User,
    CashRegister,
    CashSession,
    Settings,
}

impl EntityKind {
    /// Stable string form used in logs and ids.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Sale => "sale",
            EntityKind::Product => "product",
            EntityKind::User => "user",
            EntityKind::CashRegister => "cash_register",
            EntityKind::CashSession => "cash_session",
            EntityKind::Settings => "settings",
        }
    }

    /// REST collection path on the remote service.
    pub const fn endpoint(&self) -> &'static str {
        match self {
            EntityKind::Sale => "/sales",
            EntityKind::Product => "/products",
            EntityKind::User => "/users",
            EntityKind::CashRegister => "/cash-registers",
            EntityKind::CashSession => "/cash-sessions",
            EntityKind::Settings => "/settings",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Pending Operation
// =============================================================================

/// A local mutation that has not yet been confirmed by the remote service.
///
/// ## Lifecycle
/// ```text
/// created (enqueue)
///     │
///     ▼
/// replayed ──success──► removed permanently
///     │
///     └──failure──► attempt_count += 1, last_error recorded
///                        │
///                        └── attempt_count >= max, or 4xx ──► dead-letter set
/// ```
///
/// The payload is opaque JSON text; the queue never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PendingOperation {
    /// Unique id: creation time in millis plus a random suffix, so ids sort
    /// roughly by creation even across restarts.
    pub id: String,

    /// CRUD verb to apply remotely.
    pub kind: OperationKind,

    /// Remote resource kind.
    pub entity: EntityKind,

    /// Id of the entity being mutated.
    pub entity_id: String,

    /// Optional user/session scoping; part of the ordering lane.
    pub owner_key: Option<String>,

    /// Full entity state as JSON text (opaque to the queue).
    pub payload: String,

    /// Client-generated key the remote can use to deduplicate retried
    /// creates. Generated once at enqueue time and never regenerated.
    pub idempotency_key: String,

    /// Number of failed replay attempts so far.
    pub attempt_count: i64,

    /// Error message from the most recent failed attempt.
    pub last_error: Option<String>,

    /// When the operation was enqueued.
    pub created_at: DateTime<Utc>,
}

impl PendingOperation {
    /// Creates a fresh operation ready for enqueueing.
    pub fn new(
        kind: OperationKind,
        entity: EntityKind,
        entity_id: impl Into<String>,
        owner_key: Option<String>,
        payload: impl Into<String>,
    ) -> Self {
        let created_at = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!("{}-{}", created_at.timestamp_millis(), &suffix[..8]);

        PendingOperation {
            id,
            kind,
            entity,
            entity_id: entity_id.into(),
            owner_key,
            payload: payload.into(),
            idempotency_key: Uuid::new_v4().to_string(),
            attempt_count: 0,
            last_error: None,
            created_at,
        }
    }

    /// The (entity kind, owner key) pair replay order is preserved within.
    pub fn ordering_lane(&self) -> (EntityKind, Option<&str>) {
        (self.entity, self.owner_key.as_deref())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a sale was paid.
///
/// Ord is derived so per-method totals can live in a `BTreeMap` with a
/// deterministic iteration order (stable reports, stable tests).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash - the only method that affects the drawer count.
    Cash,
    /// Card payment on an external terminal.
    Card,
    /// Digital wallet / QR payment.
    DigitalWallet,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::DigitalWallet => "digital_wallet",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Sale
// =============================================================================

/// The status of a recorded sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Payment not yet confirmed (e.g., card authorization outstanding).
    Pending,
    /// Paid and final.
    Completed,
    /// Cancelled; excluded from reconciliation.
    Voided,
}

impl SaleStatus {
    /// A terminal sale can no longer change and is safe to reconcile over.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SaleStatus::Completed | SaleStatus::Voided)
    }
}

/// A sale recorded against a cash session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    /// Cash session this sale was rung up under.
    pub session_id: String,
    pub user_id: String,
    pub method: PaymentMethod,
    /// Amount in cents.
    pub amount_cents: i64,
    pub status: SaleStatus,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// Returns the sale amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Cash Session
// =============================================================================

/// Cash session lifecycle.
///
/// State machine: `Open --close(declared)--> Closed`. Closed is terminal;
/// there is no reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Closed,
}

/// A cash-drawer session owned by a single user.
///
/// Owned exclusively by the user who opened it until closed; immutable once
/// `status == Closed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashSession {
    pub id: String,
    pub user_id: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Float counted into the drawer at open, in cents.
    pub opening_cents: i64,
    /// Amount the operator counted at close, in cents.
    pub declared_closing_cents: Option<i64>,
    pub status: SessionStatus,
}

impl CashSession {
    /// Returns the opening amount as Money.
    #[inline]
    pub fn opening_amount(&self) -> Money {
        Money::from_cents(self.opening_cents)
    }

    /// Returns the declared closing amount, if the session was closed.
    #[inline]
    pub fn declared_closing_amount(&self) -> Option<Money> {
        self.declared_closing_cents.map(Money::from_cents)
    }

    /// Whether the session is still open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}

// =============================================================================
// Cached State
// =============================================================================

/// A remote-sourced value with its fetch timestamp and scope.
///
/// Exactly one entry exists per scope key at a time; a new fetch replaces
/// the prior entry atomically. Freshness is a property of the read, not of
/// the entry: a stale entry is still served as a degraded fallback when the
/// remote is unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedState<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
    pub scope_key: String,
}

impl<T> CachedState<T> {
    /// Creates an entry fetched now.
    pub fn new(value: T, scope_key: impl Into<String>) -> Self {
        CachedState {
            value,
            fetched_at: Utc::now(),
            scope_key: scope_key.into(),
        }
    }

    /// True if the entry is within its TTL at `now`.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < ttl
    }

    /// Age of the entry at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_id_sorts_by_creation() {
        let a = PendingOperation::new(
            OperationKind::Create,
            EntityKind::Sale,
            "sale-1",
            Some("user-1".into()),
            "{}",
        );
        // Millisecond prefix means ids from later wall-clock times compare
        // greater; same-millisecond ids fall back to the random suffix.
        assert!(a.id.contains('-'));
        assert_eq!(a.attempt_count, 0);
        assert!(a.last_error.is_none());
        assert!(!a.idempotency_key.is_empty());
    }

    #[test]
    fn test_ordering_lane() {
        let a = PendingOperation::new(
            OperationKind::Create,
            EntityKind::Sale,
            "sale-1",
            Some("user-1".into()),
            "{}",
        );
        let b = PendingOperation::new(
            OperationKind::Update,
            EntityKind::Sale,
            "sale-1",
            Some("user-1".into()),
            "{}",
        );
        let c = PendingOperation::new(
            OperationKind::Create,
            EntityKind::Product,
            "prod-1",
            Some("user-1".into()),
            "{}",
        );

        assert_eq!(a.ordering_lane(), b.ordering_lane());
        assert_ne!(a.ordering_lane(), c.ordering_lane());
    }

    #[test]
    fn test_entity_endpoints() {
        assert_eq!(EntityKind::Sale.endpoint(), "/sales");
        assert_eq!(EntityKind::CashSession.endpoint(), "/cash-sessions");
        assert_eq!(EntityKind::CashRegister.endpoint(), "/cash-registers");
    }

    #[test]
    fn test_sale_status_terminal() {
        assert!(!SaleStatus::Pending.is_terminal());
        assert!(SaleStatus::Completed.is_terminal());
        assert!(SaleStatus::Voided.is_terminal());
    }

    #[test]
    fn test_cached_state_freshness() {
        let entry = CachedState::new(42i64, "user-1");
        let now = entry.fetched_at;

        assert!(entry.is_fresh(Duration::seconds(300), now + Duration::seconds(100)));
        assert!(!entry.is_fresh(Duration::seconds(300), now + Duration::seconds(400)));
        assert_eq!(entry.age(now + Duration::seconds(7)), Duration::seconds(7));
    }
}
