//! # Remote State Cache
//!
//! Read-through cache for remote-owned state documents (settings and other
//! per-scope configuration). Reads never fail hard just because the link is
//! down; writes are optimistic and queue a mutation for the drain loop.
//!
//! ## Read Fallback Chain
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      get(scope_key)                                     │
//! │                                                                         │
//! │  1. cached entry fresh (age < TTL)      → serve it                     │
//! │  2. online                              → fetch, persist, serve        │
//! │  3. stale entry exists                  → serve it (warn)              │
//! │  4. nothing at all                      → seed + serve the default     │
//! │                                                                         │
//! │  A remote failure mid-chain falls through to the next step; the only   │
//! │  errors get() surfaces are local (validation / storage).               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write Path
//! `set()` deep-merges the update into the cached document, persists the
//! merged result immediately (optimistic, no rollback), and enqueues an
//! update operation so the remote converges once a drain goes through.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use till_core::{
    validation::validate_scope_key, CachedState, EntityKind, OperationKind, PendingOperation,
};
use till_store::{CacheRepository, QueueRepository};

use crate::connectivity::ConnectivityGate;
use crate::error::SyncResult;
use crate::remote::RemoteClient;

/// Tuning knobs for the cache, filled from [`crate::config::SyncConfig`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// How long a fetched document counts as fresh.
    pub ttl: Duration,
    /// Refresh fresh-but-aging entries in the background on read.
    pub auto_refresh: bool,
    /// Document served (and seeded) when no cached or remote value exists.
    pub default_state: Value,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            ttl: Duration::from_secs(300),
            auto_refresh: false,
            default_state: Value::Object(serde_json::Map::new()),
        }
    }
}

/// TTL'd read-through cache over the remote's state documents.
#[derive(Clone)]
pub struct StateCache {
    repo: CacheRepository,
    queue: QueueRepository,
    remote: Arc<dyn RemoteClient>,
    gate: Arc<ConnectivityGate>,
    ttl: chrono::Duration,
    auto_refresh: bool,
    default_state: Value,
}

impl StateCache {
    /// Creates a cache over the given repositories and remote seam.
    pub fn new(
        repo: CacheRepository,
        queue: QueueRepository,
        remote: Arc<dyn RemoteClient>,
        gate: Arc<ConnectivityGate>,
        settings: CacheSettings,
    ) -> Self {
        let ttl = chrono::Duration::from_std(settings.ttl).unwrap_or(chrono::Duration::MAX);
        StateCache {
            repo,
            queue,
            remote,
            gate,
            ttl,
            auto_refresh: settings.auto_refresh,
            default_state: settings.default_state,
        }
    }

    /// Reads the state document for a scope, walking the fallback chain.
    pub async fn get(&self, scope_key: &str) -> SyncResult<Value> {
        validate_scope_key(scope_key)?;

        let cached = match self.repo.get(scope_key).await? {
            Some(row) => {
                let value: Value = serde_json::from_str(&row.payload)?;
                Some(CachedState {
                    value,
                    fetched_at: row.fetched_at,
                    scope_key: row.scope_key,
                })
            }
            None => None,
        };

        if let Some(entry) = &cached {
            if entry.is_fresh(self.ttl, Utc::now()) {
                if self.auto_refresh && self.gate.last_known() {
                    self.spawn_background_refresh(scope_key);
                }
                return Ok(entry.value.clone());
            }
        }

        if self.gate.is_online().await {
            match self.refresh(scope_key).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(scope_key = %scope_key, error = %err, "Remote fetch failed, falling back");
                }
            }
        }

        if let Some(entry) = cached {
            warn!(
                scope_key = %scope_key,
                age_secs = entry.age(Utc::now()).num_seconds(),
                "Serving stale cached state"
            );
            return Ok(entry.value);
        }

        info!(scope_key = %scope_key, "No cached state available, seeding default");
        self.repo
            .put(scope_key, &self.default_state.to_string(), Utc::now())
            .await?;
        Ok(self.default_state.clone())
    }

    /// Fetches the scope from the remote unconditionally and persists it.
    pub async fn refresh(&self, scope_key: &str) -> SyncResult<Value> {
        let value = self.remote.fetch_state(scope_key).await?;
        self.repo
            .put(scope_key, &value.to_string(), Utc::now())
            .await?;
        debug!(scope_key = %scope_key, "Cached state refreshed from remote");
        Ok(value)
    }

    /// Applies an optimistic local update and queues it for the remote.
    ///
    /// The merged document is persisted before the enqueue; if the enqueue
    /// fails the local write stays (the caller sees the error and the till
    /// keeps the value the cashier just saved).
    ///
    /// `fetched_at` is preserved on existing entries, and a never-fetched
    /// scope is stamped already expired: a local write never makes a
    /// document count as remotely confirmed.
    pub async fn set(&self, scope_key: &str, update: Value) -> SyncResult<PendingOperation> {
        validate_scope_key(scope_key)?;

        let existing = self.repo.get(scope_key).await?;
        let (base, fetched_at) = match &existing {
            Some(row) => (serde_json::from_str(&row.payload)?, row.fetched_at),
            None => {
                // Already expired, so the first online read still fetches
                // the authoritative document instead of trusting this write
                let expired = Utc::now()
                    .checked_sub_signed(self.ttl)
                    .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
                (self.default_state.clone(), expired)
            }
        };

        let merged = merge_json(base, update);
        self.repo
            .put(scope_key, &merged.to_string(), fetched_at)
            .await?;

        let op = PendingOperation::new(
            OperationKind::Update,
            EntityKind::Settings,
            scope_key,
            Some(scope_key.to_string()),
            merged.to_string(),
        );
        self.queue.enqueue(&op).await?;
        debug!(scope_key = %scope_key, op_id = %op.id, "State update applied locally and queued");
        Ok(op)
    }

    /// Drops the cached entry for a scope. The next read re-fetches.
    pub async fn invalidate(&self, scope_key: &str) -> SyncResult<()> {
        self.repo.invalidate(scope_key).await?;
        Ok(())
    }

    /// All scope keys currently cached.
    pub async fn scope_keys(&self) -> SyncResult<Vec<String>> {
        Ok(self.repo.scope_keys().await?)
    }

    fn spawn_background_refresh(&self, scope_key: &str) {
        let this = self.clone();
        let scope_key = scope_key.to_string();
        tokio::spawn(async move {
            if let Err(err) = this.refresh(&scope_key).await {
                debug!(scope_key = %scope_key, error = %err, "Background refresh failed");
            }
        });
    }
}

/// Recursive JSON merge: objects merge key-by-key, `null` removes a key,
/// everything else replaces.
pub fn merge_json(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    base_map.remove(&key);
                } else {
                    let merged = match base_map.remove(&key) {
                        Some(base_value) => merge_json(base_value, patch_value),
                        None => patch_value,
                    };
                    base_map.insert(key, merged);
                }
            }
            Value::Object(base_map)
        }
        (_, patch) => patch,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::MockRemote;
    use serde_json::json;
    use till_store::Store;

    async fn fixture(remote: Arc<MockRemote>) -> (Store, StateCache) {
        let store = Store::in_memory().await.unwrap();
        let gate = Arc::new(ConnectivityGate::new(
            remote.clone(),
            Duration::from_millis(200),
        ));
        let cache = StateCache::new(
            store.cache(),
            store.queue(),
            remote,
            gate,
            CacheSettings {
                default_state: json!({"tax_rate": 0}),
                ..CacheSettings::default()
            },
        );
        (store, cache)
    }

    #[tokio::test]
    async fn test_miss_fetches_from_remote_when_online() {
        let remote = Arc::new(MockRemote::online());
        remote.set_state("user-1", json!({"theme": "dark"}));
        let (_store, cache) = fixture(remote.clone()).await;

        let value = cache.get("user-1").await.unwrap();
        assert_eq!(value, json!({"theme": "dark"}));
        assert_eq!(remote.fetch_count(), 1);

        // Second read is served from the fresh cache
        let value = cache.get("user-1").await.unwrap();
        assert_eq!(value, json!({"theme": "dark"}));
        assert_eq!(remote.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_refreshes_when_online() {
        let remote = Arc::new(MockRemote::online());
        remote.set_state("user-1", json!({"v": 2}));
        let (store, cache) = fixture(remote.clone()).await;

        let stale_at = Utc::now() - chrono::Duration::seconds(400);
        store
            .cache()
            .put("user-1", r#"{"v":1}"#, stale_at)
            .await
            .unwrap();

        let value = cache.get("user-1").await.unwrap();
        assert_eq!(value, json!({"v": 2}));
        assert_eq!(remote.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_served_when_offline() {
        let remote = Arc::new(MockRemote::offline());
        let (store, cache) = fixture(remote.clone()).await;

        let stale_at = Utc::now() - chrono::Duration::seconds(400);
        store
            .cache()
            .put("user-1", r#"{"v":1}"#, stale_at)
            .await
            .unwrap();

        // Stale beats nothing: same value keeps being served while offline
        assert_eq!(cache.get("user-1").await.unwrap(), json!({"v": 1}));
        assert_eq!(cache.get("user-1").await.unwrap(), json!({"v": 1}));
        assert_eq!(remote.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_and_offline_seeds_default() {
        let remote = Arc::new(MockRemote::offline());
        let (store, cache) = fixture(remote.clone()).await;

        let value = cache.get("user-1").await.unwrap();
        assert_eq!(value, json!({"tax_rate": 0}));

        // The default is persisted, not just returned
        let row = store.cache().get("user-1").await.unwrap().unwrap();
        assert_eq!(row.payload, json!({"tax_rate": 0}).to_string());
    }

    #[tokio::test]
    async fn test_set_merges_locally_and_enqueues() {
        let remote = Arc::new(MockRemote::offline());
        let (store, cache) = fixture(remote.clone()).await;

        store
            .cache()
            .put("user-1", r#"{"theme":"dark","receipt":{"header":"Till"}}"#, Utc::now())
            .await
            .unwrap();

        let op = cache
            .set("user-1", json!({"receipt": {"footer": "Thanks!"}}))
            .await
            .unwrap();
        assert_eq!(op.entity, EntityKind::Settings);
        assert_eq!(op.kind, OperationKind::Update);
        assert_eq!(op.owner_key.as_deref(), Some("user-1"));

        // Local read reflects the merge immediately, even offline
        let value = cache.get("user-1").await.unwrap();
        assert_eq!(
            value,
            json!({"theme": "dark", "receipt": {"header": "Till", "footer": "Thanks!"}})
        );

        // And the mutation is waiting for the next drain
        assert_eq!(store.queue().drainable_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_on_unfetched_scope_does_not_mask_remote() {
        let remote = Arc::new(MockRemote::offline());
        let (_store, cache) = fixture(remote.clone()).await;

        // Optimistic write before the scope has ever been fetched
        cache.set("user-1", json!({"theme": "dark"})).await.unwrap();

        // Offline reads serve the optimistic value
        assert_eq!(
            cache.get("user-1").await.unwrap(),
            json!({"tax_rate": 0, "theme": "dark"})
        );

        // Once the link is back, the remote document wins over the
        // never-confirmed local write
        remote.set_healthy(true);
        remote.set_state("user-1", json!({"theme": "light"}));

        assert_eq!(cache.get("user-1").await.unwrap(), json!({"theme": "light"}));
        assert_eq!(remote.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let remote = Arc::new(MockRemote::online());
        remote.set_state("user-1", json!({"v": 1}));
        let (_store, cache) = fixture(remote.clone()).await;

        cache.get("user-1").await.unwrap();
        cache.invalidate("user-1").await.unwrap();
        cache.get("user-1").await.unwrap();
        assert_eq!(remote.fetch_count(), 2);
    }

    #[test]
    fn test_merge_json_semantics() {
        // Nested objects merge
        let merged = merge_json(json!({"a": {"x": 1}}), json!({"a": {"y": 2}}));
        assert_eq!(merged, json!({"a": {"x": 1, "y": 2}}));

        // null removes
        let merged = merge_json(json!({"a": 1, "b": 2}), json!({"b": null}));
        assert_eq!(merged, json!({"a": 1}));

        // Scalars and arrays replace
        let merged = merge_json(json!({"a": [1, 2]}), json!({"a": [3]}));
        assert_eq!(merged, json!({"a": [3]}));
        let merged = merge_json(json!(1), json!({"a": 1}));
        assert_eq!(merged, json!({"a": 1}));
    }
}
