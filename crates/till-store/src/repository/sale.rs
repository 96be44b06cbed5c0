//! # Sale Repository
//!
//! Database operations for sales recorded against a cash session. The
//! reconciliation engine reads these back to compute expected cash and the
//! pending-sale count that can block closing.

use sqlx::SqlitePool;
use tracing::debug;

use till_core::Sale;

use crate::error::StoreResult;

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Records a sale locally.
    pub async fn record(&self, sale: &Sale) -> StoreResult<()> {
        debug!(id = %sale.id, session_id = %sale.session_id, amount = sale.amount_cents, "Recording sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, session_id, user_id, method, amount_cents, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.session_id)
        .bind(&sale.user_id)
        .bind(sale.method)
        .bind(sale.amount_cents)
        .bind(sale.status)
        .bind(sale.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates a sale's status (e.g., a pending card payment settling).
    pub async fn set_status(&self, id: &str, status: till_core::SaleStatus) -> StoreResult<()> {
        sqlx::query("UPDATE sales SET status = ?2 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All sales linked to a session, oldest first.
    pub async fn list_for_session(&self, session_id: &str) -> StoreResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            r#"
            SELECT id, session_id, user_id, method, amount_cents, status, created_at
            FROM sales
            WHERE session_id = ?1
            ORDER BY created_at ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Count of non-terminal sales on a session.
    pub async fn pending_count_for_session(&self, session_id: &str) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sales WHERE session_id = ?1 AND status = 'pending'",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Store;
    use chrono::Utc;
    use till_core::{Money, PaymentMethod, SaleStatus};

    fn sale(id: &str, session_id: &str, method: PaymentMethod, cents: i64, status: SaleStatus) -> Sale {
        Sale {
            id: id.into(),
            session_id: session_id.into(),
            user_id: "user-1".into(),
            method,
            amount_cents: cents,
            status,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let store = Store::in_memory().await.unwrap();
        let s = store.sessions().open("user-1", Money::zero()).await.unwrap();
        let sales = store.sales();

        sales
            .record(&sale("a", &s.id, PaymentMethod::Cash, 2_550, SaleStatus::Completed))
            .await
            .unwrap();
        sales
            .record(&sale("b", &s.id, PaymentMethod::Card, 4_000, SaleStatus::Pending))
            .await
            .unwrap();

        let listed = sales.list_for_session(&s.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "a");
        assert_eq!(listed[1].method, PaymentMethod::Card);
    }

    #[tokio::test]
    async fn test_pending_count_and_settlement() {
        let store = Store::in_memory().await.unwrap();
        let s = store.sessions().open("user-1", Money::zero()).await.unwrap();
        let sales = store.sales();

        sales
            .record(&sale("a", &s.id, PaymentMethod::Card, 700, SaleStatus::Pending))
            .await
            .unwrap();
        assert_eq!(sales.pending_count_for_session(&s.id).await.unwrap(), 1);

        sales.set_status("a", SaleStatus::Completed).await.unwrap();
        assert_eq!(sales.pending_count_for_session(&s.id).await.unwrap(), 0);
    }
}
