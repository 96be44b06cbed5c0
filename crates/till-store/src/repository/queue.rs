//! # Pending-Operation Queue Repository
//!
//! The durable, ordered queue of local mutations awaiting replay, plus the
//! dead-letter set for operations that exhausted their retry budget.
//!
//! ## The Queue Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Pending-Operation Queue                                 │
//! │                                                                         │
//! │  enqueue(op)            append to tail; INSERT failure surfaces        │
//! │                         synchronously (a lost enqueue is a lost        │
//! │                         business transaction)                          │
//! │                                                                         │
//! │  peek_batch(n)          first n ops in insertion order, NOT removed    │
//! │                                                                         │
//! │  mark_succeeded(id)     permanent removal - only after the remote      │
//! │                         confirmed the write (pop-then-retry, never     │
//! │                         pop-then-call)                                 │
//! │                                                                         │
//! │  mark_failed(id, err)   attempt_count += 1; at the configured max      │
//! │                         the row MOVES to dead_letters - it is never    │
//! │                         silently dropped                               │
//! │                                                                         │
//! │  dead_letter(id, err)   immediate move for non-retryable (4xx)         │
//! │                         application errors                             │
//! │                                                                         │
//! │  drainable_count()      observability for the status surface           │
//! │  error_count()                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A process crash between peek and mark leaves the operation in the queue;
//! the next drain replays it. That is the at-least-once guarantee (the
//! idempotency key on each operation lets the remote deduplicate).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use till_core::{EntityKind, OperationKind, PendingOperation};

use crate::error::StoreResult;

// =============================================================================
// Dead Letter
// =============================================================================

/// A pending operation that was pulled out of the drainable queue, retained
/// for operator inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeadLetter {
    pub id: String,
    pub kind: OperationKind,
    pub entity: EntityKind,
    pub entity_id: String,
    pub owner_key: Option<String>,
    pub payload: String,
    pub idempotency_key: String,
    pub attempt_count: i64,
    /// The error that condemned the operation.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
}

// =============================================================================
// Queue Repository
// =============================================================================

/// Repository for the pending-operation queue and dead-letter set.
#[derive(Debug, Clone)]
pub struct QueueRepository {
    pool: SqlitePool,
}

impl QueueRepository {
    /// Creates a new QueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        QueueRepository { pool }
    }

    /// Appends an operation to the tail of the queue.
    ///
    /// Never rejects a well-formed operation; the only failure mode is
    /// storage I/O, which propagates to the caller synchronously.
    pub async fn enqueue(&self, op: &PendingOperation) -> StoreResult<()> {
        debug!(
            id = %op.id,
            entity = %op.entity,
            kind = %op.kind,
            "Enqueueing pending operation"
        );

        sqlx::query(
            r#"
            INSERT INTO pending_operations (
                id, kind, entity, entity_id, owner_key, payload,
                idempotency_key, attempt_count, last_error, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&op.id)
        .bind(op.kind)
        .bind(op.entity)
        .bind(&op.entity_id)
        .bind(&op.owner_key)
        .bind(&op.payload)
        .bind(&op.idempotency_key)
        .bind(op.attempt_count)
        .bind(&op.last_error)
        .bind(op.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns up to `limit` operations in insertion order without removing
    /// them. rowid breaks same-millisecond created_at ties.
    pub async fn peek_batch(&self, limit: u32) -> StoreResult<Vec<PendingOperation>> {
        let ops = sqlx::query_as::<_, PendingOperation>(
            r#"
            SELECT id, kind, entity, entity_id, owner_key, payload,
                   idempotency_key, attempt_count, last_error, created_at
            FROM pending_operations
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ops)
    }

    /// Removes an operation permanently after confirmed remote success.
    pub async fn mark_succeeded(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM pending_operations WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            warn!(id = %id, "mark_succeeded on unknown operation");
        }

        Ok(())
    }

    /// Records a failed replay attempt.
    ///
    /// Increments `attempt_count` and stores the error. When the count
    /// reaches `max_attempts` the operation moves to the dead-letter set.
    /// Returns true if the operation was dead-lettered.
    pub async fn mark_failed(
        &self,
        id: &str,
        error: &str,
        max_attempts: i64,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE pending_operations
            SET attempt_count = attempt_count + 1, last_error = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&mut *tx)
        .await?;

        let attempts: Option<i64> =
            sqlx::query_scalar("SELECT attempt_count FROM pending_operations WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let exhausted = matches!(attempts, Some(n) if n >= max_attempts);
        if exhausted {
            warn!(id = %id, attempts = attempts, "Retry budget exhausted, dead-lettering");
            Self::move_to_dead_letters(&mut tx, id).await?;
        }

        tx.commit().await?;
        Ok(exhausted)
    }

    /// Moves an operation straight to the dead-letter set.
    ///
    /// Used for application (4xx) errors, which will not succeed on retry.
    pub async fn dead_letter(&self, id: &str, error: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE pending_operations SET last_error = ?2 WHERE id = ?1")
            .bind(id)
            .bind(error)
            .execute(&mut *tx)
            .await?;

        Self::move_to_dead_letters(&mut tx, id).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Moves a row from pending_operations to dead_letters inside `tx`.
    async fn move_to_dead_letters(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        id: &str,
    ) -> StoreResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO dead_letters (
                id, kind, entity, entity_id, owner_key, payload,
                idempotency_key, attempt_count, last_error, created_at, failed_at
            )
            SELECT id, kind, entity, entity_id, owner_key, payload,
                   idempotency_key, attempt_count, last_error, created_at, ?2
            FROM pending_operations
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        sqlx::query("DELETE FROM pending_operations WHERE id = ?1")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Number of operations waiting to drain.
    pub async fn drainable_count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_operations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Size of the dead-letter set.
    pub async fn error_count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dead_letters")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Lists dead-lettered operations for operator review, newest first.
    pub async fn dead_letters(&self) -> StoreResult<Vec<DeadLetter>> {
        let rows = sqlx::query_as::<_, DeadLetter>(
            r#"
            SELECT id, kind, entity, entity_id, owner_key, payload,
                   idempotency_key, attempt_count, last_error, created_at, failed_at
            FROM dead_letters
            ORDER BY failed_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Purges the dead-letter set (explicit operator action only).
    /// Returns the number of purged entries.
    pub async fn purge_dead_letters(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM dead_letters")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Store;
    use till_core::{EntityKind, OperationKind, PendingOperation};

    fn op(entity_id: &str) -> PendingOperation {
        PendingOperation::new(
            OperationKind::Create,
            EntityKind::Sale,
            entity_id,
            Some("user-1".into()),
            r#"{"amount_cents":1000}"#,
        )
    }

    #[tokio::test]
    async fn test_enqueue_and_peek_preserves_order() {
        let store = Store::in_memory().await.unwrap();
        let queue = store.queue();

        let a = op("sale-a");
        let b = op("sale-b");
        let c = op("sale-c");
        queue.enqueue(&a).await.unwrap();
        queue.enqueue(&b).await.unwrap();
        queue.enqueue(&c).await.unwrap();

        let batch = queue.peek_batch(10).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str(), b.id.as_str(), c.id.as_str()]);

        // Peek is non-destructive
        assert_eq!(queue.drainable_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_peek_batch_respects_limit() {
        let store = Store::in_memory().await.unwrap();
        let queue = store.queue();

        for i in 0..5 {
            queue.enqueue(&op(&format!("sale-{i}"))).await.unwrap();
        }

        assert_eq!(queue.peek_batch(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mark_succeeded_removes_permanently() {
        let store = Store::in_memory().await.unwrap();
        let queue = store.queue();

        let a = op("sale-a");
        queue.enqueue(&a).await.unwrap();
        queue.mark_succeeded(&a.id).await.unwrap();

        assert_eq!(queue.drainable_count().await.unwrap(), 0);
        assert_eq!(queue.error_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_failed_increments_attempts() {
        let store = Store::in_memory().await.unwrap();
        let queue = store.queue();

        let a = op("sale-a");
        queue.enqueue(&a).await.unwrap();

        let dead = queue.mark_failed(&a.id, "connection refused", 3).await.unwrap();
        assert!(!dead);

        let batch = queue.peek_batch(1).await.unwrap();
        assert_eq!(batch[0].attempt_count, 1);
        assert_eq!(batch[0].last_error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_move_to_dead_letters() {
        let store = Store::in_memory().await.unwrap();
        let queue = store.queue();

        let a = op("sale-a");
        queue.enqueue(&a).await.unwrap();

        assert!(!queue.mark_failed(&a.id, "timeout", 2).await.unwrap());
        assert!(queue.mark_failed(&a.id, "timeout", 2).await.unwrap());

        // Not drainable, not dropped
        assert_eq!(queue.drainable_count().await.unwrap(), 0);
        assert_eq!(queue.error_count().await.unwrap(), 1);

        let dead = queue.dead_letters().await.unwrap();
        assert_eq!(dead[0].id, a.id);
        assert_eq!(dead[0].attempt_count, 2);
        assert_eq!(dead[0].last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_immediate_dead_letter_for_application_error() {
        let store = Store::in_memory().await.unwrap();
        let queue = store.queue();

        let a = op("sale-a");
        queue.enqueue(&a).await.unwrap();
        queue.dead_letter(&a.id, "422 validation rejected").await.unwrap();

        assert_eq!(queue.drainable_count().await.unwrap(), 0);
        let dead = queue.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].last_error.as_deref(), Some("422 validation rejected"));
    }

    #[tokio::test]
    async fn test_purge_dead_letters() {
        let store = Store::in_memory().await.unwrap();
        let queue = store.queue();

        let a = op("sale-a");
        queue.enqueue(&a).await.unwrap();
        queue.dead_letter(&a.id, "409").await.unwrap();

        assert_eq!(queue.purge_dead_letters().await.unwrap(), 1);
        assert_eq!(queue.error_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let path = std::env::temp_dir().join(format!(
            "till-store-test-{}.db",
            uuid::Uuid::new_v4().simple()
        ));

        let a = op("sale-a");
        let b = op("sale-b");

        {
            let store = Store::new(crate::pool::StoreConfig::new(&path)).await.unwrap();
            let queue = store.queue();
            queue.enqueue(&a).await.unwrap();
            queue.enqueue(&b).await.unwrap();
            queue.mark_succeeded(&a.id).await.unwrap();
            store.close().await;
        }

        // "Restart": a fresh store over the same file
        let store = Store::new(crate::pool::StoreConfig::new(&path)).await.unwrap();
        let batch = store.queue().peek_batch(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, b.id);
        store.close().await;

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_round_trip_preserves_operation() {
        let store = Store::in_memory().await.unwrap();
        let queue = store.queue();

        let a = op("sale-a");
        queue.enqueue(&a).await.unwrap();

        let got = &queue.peek_batch(1).await.unwrap()[0];
        assert_eq!(got, &a);
    }
}
