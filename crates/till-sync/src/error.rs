//! # Sync Error Types
//!
//! Error handling for the sync engine, with a hard line between *retryable*
//! failures (the network or remote is unhealthy, try again later) and
//! *application* failures (the remote understood the request and rejected
//! it, retrying will never help).
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Sync Error Categories                              │
//! │                                                                         │
//! │  RETRYABLE (drain pauses, operation stays queued)                      │
//! │  ├── Transport       connection refused / reset / DNS                  │
//! │  ├── Timeout         request exceeded the configured deadline          │
//! │  └── RemoteStatus    5xx - remote is up but unhealthy                  │
//! │                                                                         │
//! │  APPLICATION (operation is dead-lettered, drain continues later)       │
//! │  ├── RemoteStatus    4xx - the remote rejected this operation          │
//! │  └── Serialization   payload could not be encoded/decoded              │
//! │                                                                         │
//! │  LOCAL (surfaced to the caller directly)                               │
//! │  ├── Store / Core / Validation (transparent wrappers)                  │
//! │  ├── SyncInProgress  explicit drain refused, one at a time             │
//! │  ├── ClosingBlocked  session failed its closing validation             │
//! │  └── Config*         configuration load/save/shape problems            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use till_core::{CoreError, ValidationError};
use till_store::StoreError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors produced by the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Remote / transport errors
    // =========================================================================
    /// Could not reach the remote at all.
    #[error("Connection failed: {0}")]
    Transport(String),

    /// The request exceeded its deadline.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The remote answered with a non-success status.
    #[error("Remote returned HTTP {status}: {message}")]
    RemoteStatus { status: u16, message: String },

    /// A payload could not be serialized or deserialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    // =========================================================================
    // Local errors
    // =========================================================================
    /// Local persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A domain rule was violated.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An input failed validation before leaving the process.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An explicit sync was requested while a drain already held the lock.
    #[error("A sync is already in progress")]
    SyncInProgress,

    /// A session close was refused by its validation checks.
    #[error("Session cannot be closed: {}", issues.join("; "))]
    ClosingBlocked { issues: Vec<String> },

    // =========================================================================
    // Configuration errors
    // =========================================================================
    /// The configuration is structurally valid but semantically wrong.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read or parsed.
    #[error("Failed to load configuration: {0}")]
    ConfigLoadFailed(String),

    /// The configuration file could not be written.
    #[error("Failed to save configuration: {0}")]
    ConfigSaveFailed(String),
}

impl SyncError {
    /// Whether the drain loop should keep the operation queued and retry.
    ///
    /// Transport failures, timeouts, and 5xx responses are presumed to be
    /// transient. Everything else either already succeeded locally or will
    /// fail the same way on every retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport(_) | SyncError::Timeout(_) => true,
            SyncError::RemoteStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the remote definitively rejected the operation.
    ///
    /// These operations are moved to the dead-letter set immediately: the
    /// remote understood the request and said no.
    pub fn is_application_rejection(&self) -> bool {
        match self {
            SyncError::RemoteStatus { status, .. } => (400..500).contains(status),
            SyncError::Serialization(_) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::RemoteStatus {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            SyncError::Serialization(err.to_string())
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidConfig(format!("invalid remote URL: {err}"))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::Transport("refused".into()).is_retryable());
        assert!(SyncError::Timeout("15s".into()).is_retryable());
        assert!(SyncError::RemoteStatus { status: 503, message: String::new() }.is_retryable());

        assert!(!SyncError::RemoteStatus { status: 409, message: String::new() }.is_retryable());
        assert!(!SyncError::Serialization("bad json".into()).is_retryable());
        assert!(!SyncError::SyncInProgress.is_retryable());
    }

    #[test]
    fn test_application_rejection_classification() {
        assert!(SyncError::RemoteStatus { status: 422, message: String::new() }
            .is_application_rejection());
        assert!(SyncError::Serialization("bad json".into()).is_application_rejection());

        assert!(!SyncError::RemoteStatus { status: 500, message: String::new() }
            .is_application_rejection());
        assert!(!SyncError::Transport("refused".into()).is_application_rejection());
    }

    #[test]
    fn test_closing_blocked_message_joins_issues() {
        let err = SyncError::ClosingBlocked {
            issues: vec!["1 pending sale".into(), "another session is open".into()],
        };
        assert_eq!(
            err.to_string(),
            "Session cannot be closed: 1 pending sale; another session is open"
        );
    }
}
