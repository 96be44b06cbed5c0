//! # Error Types
//!
//! Domain-specific error types for till-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  till-core errors (this file)                                          │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  till-store errors (separate crate)                                    │
//! │  └── StoreError       - Database operation failures                    │
//! │                                                                         │
//! │  till-sync errors (separate crate)                                     │
//! │  └── SyncError        - Transport, replay, orchestration failures      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → caller                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. `thiserror` derive macros, never manual impls
//! 2. Context in error messages (ids, amounts)
//! 3. Errors are enum variants, never bare Strings

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Cash session cannot be found.
    #[error("Cash session not found: {0}")]
    SessionNotFound(String),

    /// The session is already closed; the Open→Closed transition is
    /// terminal and must not be repeated.
    #[error("Cash session {id} is already closed")]
    SessionAlreadyClosed { id: String },

    /// A user may hold at most one open session.
    #[error("User {user_id} already has an open session: {session_id}")]
    SessionAlreadyOpen { user_id: String, session_id: String },

    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was empty or missing.
    #[error("Field '{field}' is required")]
    Required { field: String },

    /// Field exceeds its maximum length.
    #[error("Field '{field}' exceeds maximum length of {max}")]
    TooLong { field: String, max: usize },

    /// A monetary amount that must not be negative was negative.
    #[error("Amount for '{field}' must not be negative (got {cents} cents)")]
    NegativeAmount { field: String, cents: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_context() {
        let err = CoreError::SessionAlreadyClosed { id: "s-42".into() };
        assert!(err.to_string().contains("s-42"));

        let err = CoreError::SessionAlreadyOpen {
            user_id: "user-1".into(),
            session_id: "s-1".into(),
        };
        assert!(err.to_string().contains("user-1"));
        assert!(err.to_string().contains("s-1"));
    }

    #[test]
    fn test_validation_converts_to_core() {
        let v = ValidationError::NegativeAmount {
            field: "declared_closing".into(),
            cents: -5,
        };
        let core: CoreError = v.into();
        assert!(core.to_string().contains("declared_closing"));
    }
}
