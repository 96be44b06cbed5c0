//! # Reconciliation Arithmetic
//!
//! Pure computation for cash-drawer reconciliation: given a session, its
//! sales, and the amount the operator counted, decide whether the drawer
//! balances and whether the session may close.
//!
//! ## The Reconciliation Question
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  What Should Be In The Drawer?                          │
//! │                                                                         │
//! │  opening float          $100.00   (counted in at session open)         │
//! │  + cash sales            $35.50   (25.50 + 10.00)                      │
//! │  ─────────────────────────────                                         │
//! │  expected cash          $135.50                                        │
//! │                                                                         │
//! │  declared at close      $140.00   (what the operator counted)          │
//! │  difference              +$4.50   (positive = over, negative = short)  │
//! │                                                                         │
//! │  Card / wallet sales are informational only: they never touched the    │
//! │  drawer, so they never move `expected cash`.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is a pure function over values loaded elsewhere. A
//! [`ReconciliationSummary`] is derived fresh on every request and never
//! persisted.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{CashSession, PaymentMethod, Sale, SaleStatus, SessionStatus};

// =============================================================================
// Reconciliation Summary
// =============================================================================

/// Result of reconciling a session against a declared closing amount.
///
/// A pure computed value - recomputed from the session and its sales each
/// time reconciliation is requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    /// Number of sales counted (voided sales excluded).
    pub sales_count: usize,

    /// Totals per payment method. BTreeMap for deterministic order.
    pub totals_by_method: BTreeMap<PaymentMethod, Money>,

    /// Opening float plus cash sales.
    pub expected_cash: Money,

    /// What the operator counted.
    pub declared_closing: Money,

    /// `declared - expected`. Positive means the drawer is over, negative
    /// means it is short.
    pub difference: Money,
}

impl ReconciliationSummary {
    /// True when the drawer count matches expected cash exactly.
    #[inline]
    pub fn balances(&self) -> bool {
        self.difference.is_zero()
    }

    /// Total for one payment method (zero if no sales used it).
    pub fn total_for(&self, method: PaymentMethod) -> Money {
        self.totals_by_method
            .get(&method)
            .copied()
            .unwrap_or_else(Money::zero)
    }
}

/// Computes the reconciliation summary for a session.
///
/// Voided sales are excluded entirely. Pending sales still count toward the
/// totals (the money is expected in the drawer once they settle); whether
/// pending sales *block closing* is [`closing_issues`]'s concern, not this
/// function's.
pub fn summarize(session: &CashSession, sales: &[Sale], declared: Money) -> ReconciliationSummary {
    let mut totals_by_method: BTreeMap<PaymentMethod, Money> = BTreeMap::new();
    let mut sales_count = 0usize;

    for sale in sales {
        if sale.status == SaleStatus::Voided {
            continue;
        }
        sales_count += 1;
        let slot = totals_by_method.entry(sale.method).or_insert_with(Money::zero);
        *slot += sale.amount();
    }

    let cash_total = totals_by_method
        .get(&PaymentMethod::Cash)
        .copied()
        .unwrap_or_else(Money::zero);

    let expected_cash = session.opening_amount() + cash_total;

    ReconciliationSummary {
        sales_count,
        totals_by_method,
        expected_cash,
        declared_closing: declared,
        difference: declared - expected_cash,
    }
}

// =============================================================================
// Closing Eligibility
// =============================================================================

/// A reason a session cannot close yet.
///
/// Issues are structured (not bare strings) so callers can branch on them,
/// but render to operator-readable text via Display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "issue")]
pub enum ClosingIssue {
    /// The session is not in Open status.
    SessionNotOpen,
    /// Sales on this session are still in a non-terminal state.
    PendingSales { count: usize },
    /// The same user holds another open session.
    ConcurrentOpenSession { session_id: String },
}

impl fmt::Display for ClosingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClosingIssue::SessionNotOpen => {
                write!(f, "session is not open")
            }
            ClosingIssue::PendingSales { count } => {
                write!(f, "{count} sale(s) on this session are still pending")
            }
            ClosingIssue::ConcurrentOpenSession { session_id } => {
                write!(f, "another session ({session_id}) is open for this user")
            }
        }
    }
}

/// Outcome of a closing-eligibility check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosingCheck {
    pub can_close: bool,
    pub issues: Vec<ClosingIssue>,
}

impl ClosingCheck {
    /// The degraded-offline result: closing is allowed on trust of local
    /// state so a drawer can always close at end of shift.
    pub fn permissive() -> Self {
        ClosingCheck {
            can_close: true,
            issues: Vec::new(),
        }
    }

    /// Builds a check from collected issues.
    pub fn from_issues(issues: Vec<ClosingIssue>) -> Self {
        ClosingCheck {
            can_close: issues.is_empty(),
            issues,
        }
    }

    /// Issues rendered as operator-readable strings.
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.to_string()).collect()
    }
}

/// Collects everything that blocks `session` from closing.
///
/// `other_open_sessions` is the caller-supplied set of *other* sessions
/// currently open for the same user (local, plus remote when reachable).
pub fn closing_issues(
    session: &CashSession,
    sales: &[Sale],
    other_open_sessions: &[CashSession],
) -> Vec<ClosingIssue> {
    let mut issues = Vec::new();

    if session.status != SessionStatus::Open {
        issues.push(ClosingIssue::SessionNotOpen);
    }

    let pending = sales
        .iter()
        .filter(|s| s.session_id == session.id && !s.status.is_terminal())
        .count();
    if pending > 0 {
        issues.push(ClosingIssue::PendingSales { count: pending });
    }

    for other in other_open_sessions {
        if other.id != session.id && other.user_id == session.user_id && other.is_open() {
            issues.push(ClosingIssue::ConcurrentOpenSession {
                session_id: other.id.clone(),
            });
        }
    }

    issues
}

// =============================================================================
// Unit Tests
// =============================================================================
