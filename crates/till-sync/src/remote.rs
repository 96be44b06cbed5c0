//! # Remote Client
//!
//! The seam between the sync engine and the remote system of record. Every
//! other module in this crate talks to the remote exclusively through the
//! [`RemoteClient`] trait, which keeps the drain loop, cache, and
//! reconciliation engine testable without a network.
//!
//! ## Request Routing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Operation → HTTP Request                             │
//! │                                                                         │
//! │  PendingOperation { kind, entity, entity_id, payload }                 │
//! │                                                                         │
//! │  Create  →  POST   {base}{entity.endpoint()}           body: payload   │
//! │  Update  →  PUT    {base}{entity.endpoint()}/{id}      body: payload   │
//! │  Delete  →  DELETE {base}{entity.endpoint()}/{id}                      │
//! │                                                                         │
//! │  Every request carries an Idempotency-Key header so the remote can     │
//! │  deduplicate at-least-once replays.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use tracing::debug;
use url::Url;

use till_core::{CashSession, EntityKind, OperationKind, PendingOperation, Sale};

use crate::error::{SyncError, SyncResult};

/// Abstraction over the remote system of record.
///
/// The production implementation is [`HttpRemoteClient`]; tests substitute
/// a scripted mock.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Lightweight liveness probe. `Ok(())` means the remote is reachable
    /// and willing to serve requests.
    async fn health(&self) -> SyncResult<()>;

    /// Applies one queued mutation to the remote.
    async fn apply(&self, op: &PendingOperation) -> SyncResult<()>;

    /// Fetches the authoritative state document for a scope key.
    async fn fetch_state(&self, scope_key: &str) -> SyncResult<serde_json::Value>;

    /// Sales the remote has recorded against a session.
    async fn sales_for_session(&self, session_id: &str) -> SyncResult<Vec<Sale>>;

    /// Sessions the remote believes are open for a user.
    async fn open_sessions_for_user(&self, user_id: &str) -> SyncResult<Vec<CashSession>>;
}

/// REST implementation of [`RemoteClient`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    http: reqwest::Client,
    /// Base URL without a trailing slash; entity endpoints are appended.
    base: String,
}

impl HttpRemoteClient {
    /// Creates a client for `base_url` with a per-request timeout.
    ///
    /// The URL is validated eagerly so a typo in the configuration fails at
    /// startup instead of on the first drain.
    pub fn new(base_url: &str, request_timeout: Duration) -> SyncResult<Self> {
        let parsed = Url::parse(base_url)?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SyncError::InvalidConfig(format!(
                "remote URL must be http(s), got '{}'",
                parsed.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(HttpRemoteClient {
            http,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Maps a non-success response to a `RemoteStatus` error, carrying a
    /// truncated body for the logs.
    async fn check(response: reqwest::Response) -> SyncResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut message = response.text().await.unwrap_or_default();
        message.truncate(512);
        Err(SyncError::RemoteStatus {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn health(&self) -> SyncResult<()> {
        let response = self.http.get(self.url("/health")).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn apply(&self, op: &PendingOperation) -> SyncResult<()> {
        let endpoint = op.entity.endpoint();
        debug!(id = %op.id, kind = ?op.kind, endpoint = %endpoint, "Applying operation to remote");

        let request = match op.kind {
            OperationKind::Create => self
                .http
                .post(self.url(endpoint))
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(op.payload.clone()),
            OperationKind::Update => self
                .http
                .put(self.url(&format!("{}/{}", endpoint, op.entity_id)))
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(op.payload.clone()),
            OperationKind::Delete => self
                .http
                .delete(self.url(&format!("{}/{}", endpoint, op.entity_id))),
        };

        let response = request
            .header("Idempotency-Key", &op.idempotency_key)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn fetch_state(&self, scope_key: &str) -> SyncResult<serde_json::Value> {
        let url = format!("{}/{}", self.url(EntityKind::Settings.endpoint()), scope_key);
        let response = self.http.get(url).send().await?;
        let value = Self::check(response).await?.json().await?;
        Ok(value)
    }

    async fn sales_for_session(&self, session_id: &str) -> SyncResult<Vec<Sale>> {
        let response = self
            .http
            .get(self.url(EntityKind::Sale.endpoint()))
            .query(&[("session_id", session_id)])
            .send()
            .await?;
        let sales = Self::check(response).await?.json().await?;
        Ok(sales)
    }

    async fn open_sessions_for_user(&self, user_id: &str) -> SyncResult<Vec<CashSession>> {
        let response = self
            .http
            .get(self.url(EntityKind::CashSession.endpoint()))
            .query(&[("user_id", user_id), ("status", "open")])
            .send()
            .await?;
        let sessions = Self::check(response).await?.json().await?;
        Ok(sessions)
    }
}

// =============================================================================
// Test support
// =============================================================================


// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_url() {
        let err = HttpRemoteClient::new("ftp://example.com", Duration::from_secs(5));
        assert!(matches!(err, Err(SyncError::InvalidConfig(_))));

        let err = HttpRemoteClient::new("not a url", Duration::from_secs(5));
        assert!(matches!(err, Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_base_url_trailing_slash_is_normalized() {
        let client =
            HttpRemoteClient::new("https://api.example.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url("/sales"), "https://api.example.com/sales");

        let client =
            HttpRemoteClient::new("https://api.example.com", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url("/sales"), "https://api.example.com/sales");
    }
}
