//! # Cached-State Repository
//!
//! Persistence for remote-sourced state, one row per scope key. The TTL and
//! fallback-chain logic live in till-sync; this repository only guarantees
//! atomic replacement and durability across restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::StoreResult;

/// A persisted cache row. The payload is the cached value as JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CachedRow {
    pub scope_key: String,
    pub payload: String,
    pub fetched_at: DateTime<Utc>,
}

/// Repository for the persisted remote-state cache.
#[derive(Debug, Clone)]
pub struct CacheRepository {
    pool: SqlitePool,
}

impl CacheRepository {
    /// Creates a new CacheRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CacheRepository { pool }
    }

    /// Gets the entry for a scope key, fresh or stale.
    pub async fn get(&self, scope_key: &str) -> StoreResult<Option<CachedRow>> {
        let row = sqlx::query_as::<_, CachedRow>(
            "SELECT scope_key, payload, fetched_at FROM cached_state WHERE scope_key = ?1",
        )
        .bind(scope_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Replaces the entry for a scope key atomically (upsert).
    pub async fn put(
        &self,
        scope_key: &str,
        payload: &str,
        fetched_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        debug!(scope_key = %scope_key, "Storing cached state");

        sqlx::query(
            r#"
            INSERT INTO cached_state (scope_key, payload, fetched_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (scope_key) DO UPDATE SET
                payload = excluded.payload,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(scope_key)
        .bind(payload)
        .bind(fetched_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Drops the entry for a scope key.
    pub async fn invalidate(&self, scope_key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM cached_state WHERE scope_key = ?1")
            .bind(scope_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All scope keys with a cached entry.
    pub async fn scope_keys(&self) -> StoreResult<Vec<String>> {
        let keys: Vec<String> =
            sqlx::query_scalar("SELECT scope_key FROM cached_state ORDER BY scope_key")
                .fetch_all(&self.pool)
                .await?;
        Ok(keys)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Store;

    #[tokio::test]
    async fn test_put_replaces_atomically() {
        let store = Store::in_memory().await.unwrap();
        let cache = store.cache();

        let t1 = Utc::now();
        cache.put("user-1", r#"{"theme":"dark"}"#, t1).await.unwrap();
        cache.put("user-1", r#"{"theme":"light"}"#, t1).await.unwrap();

        let row = cache.get("user-1").await.unwrap().unwrap();
        assert_eq!(row.payload, r#"{"theme":"light"}"#);

        // One entry per scope key
        assert_eq!(cache.scope_keys().await.unwrap(), vec!["user-1".to_string()]);
    }

    #[tokio::test]
    async fn test_get_missing_and_invalidate() {
        let store = Store::in_memory().await.unwrap();
        let cache = store.cache();

        assert!(cache.get("nobody").await.unwrap().is_none());

        cache.put("user-1", "{}", Utc::now()).await.unwrap();
        cache.invalidate("user-1").await.unwrap();
        assert!(cache.get("user-1").await.unwrap().is_none());
    }
}
