//! # till-core: Pure Business Logic for Till POS
//!
//! This crate is the **heart** of the offline-first POS client. It contains
//! the domain types and the reconciliation arithmetic as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Till POS Data Flow                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    till-sync (orchestration)                    │   │
//! │  │    SyncCoordinator ── ReconciliationEngine ── RemoteStateCache  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ till-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ reconcile │  │ validation│  │   │
//! │  │   │ Operation │  │   Money   │  │ summarize │  │   rules   │  │   │
//! │  │   │  Session  │  │  (cents)  │  │  issues   │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    till-store (SQLite layer)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (PendingOperation, CashSession, Sale, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`reconcile`] - Cash-drawer reconciliation arithmetic
//! - [`validation`] - Business rule validation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: deterministic - same input = same output
//! 2. **No I/O**: database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: all monetary values are minor units (i64), so
//!    reconciliation sums never drift the way floats do
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example
//!
//! ```rust
//! use till_core::money::Money;
//!
//! let opening = Money::from_cents(10_000);           // $100.00
//! let cash_sales = Money::from_cents(3_550);         // $35.50
//! let declared = Money::from_cents(14_000);          // $140.00
//!
//! let expected = opening + cash_sales;
//! assert_eq!((declared - expected).cents(), 450);    // drawer is $4.50 over
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod reconcile;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use till_core::Money` instead of
// `use till_core::money::Money`.

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use reconcile::{closing_issues, summarize, ClosingCheck, ClosingIssue, ReconciliationSummary};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default retry budget for a queued operation before it is dead-lettered.
///
/// ## Why a constant?
/// The maximum is tunable through sync configuration; this value is the
/// fallback used when no override is configured. Ten attempts at the default
/// retry delay covers several minutes of flapping connectivity without
/// letting a poisoned operation block the queue forever.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 10;

/// Default batch size for a single drain pass over the pending queue.
///
/// ## Business Reason
/// Bounds the work done per pass so a long offline backlog is replayed in
/// observable chunks rather than one open-ended burst.
pub const DEFAULT_BATCH_SIZE: u32 = 50;
