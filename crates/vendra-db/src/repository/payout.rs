//! # Payout Repository
//!
//! Database operations for payouts and per-store payout configuration.
//!
//! ## Payout Lifecycle (storage view)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  scheduled ──mark_processing()──► processing ──mark_paid()──► paid     │
//! │      ▲                                │                                 │
//! │      │                                └──record_failure()──► failed    │
//! │      │                                                          │       │
//! │      └──────────── mark_processing() (retry, attempts left) ────┘       │
//! │                                                                         │
//! │  mark_processing is a conditional UPDATE: two executors racing the     │
//! │  same payout resolve to exactly one winner via rows_affected.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use vendra_core::{Payout, StorePayoutConfig};

/// Columns selected for `Payout` rows, in struct order.
const PAYOUT_COLUMNS: &str = "id, store_id, total_cents, status, scheduled_date, \
     retry_count, max_retry_attempts, next_retry_date, provider_reference, \
     last_error, created_at, updated_at";

/// Repository for payout database operations.
#[derive(Debug, Clone)]
pub struct PayoutRepository {
    pool: SqlitePool,
}

impl PayoutRepository {
    /// Creates a new PayoutRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PayoutRepository { pool }
    }

    // =========================================================================
    // Payouts
    // =========================================================================

    /// Inserts a freshly planned payout.
    pub async fn insert(&self, payout: &Payout) -> DbResult<()> {
        debug!(id = %payout.id, store_id = %payout.store_id, "Inserting payout");

        sqlx::query(
            r#"
            INSERT INTO payouts (
                id, store_id, total_cents, status, scheduled_date,
                retry_count, max_retry_attempts, next_retry_date,
                provider_reference, last_error, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&payout.id)
        .bind(&payout.store_id)
        .bind(payout.total_cents)
        .bind(payout.status)
        .bind(payout.scheduled_date)
        .bind(payout.retry_count)
        .bind(payout.max_retry_attempts)
        .bind(payout.next_retry_date)
        .bind(&payout.provider_reference)
        .bind(&payout.last_error)
        .bind(payout.created_at)
        .bind(payout.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a payout by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Payout> {
        let sql = format!("SELECT {PAYOUT_COLUMNS} FROM payouts WHERE id = ?1");
        sqlx::query_as::<_, Payout>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Payout", id))
    }

    /// Updates a payout's total after the claim step settles the final set
    /// of escrows it covers.
    pub async fn update_total(
        &self,
        payout_id: &str,
        total_cents: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query("UPDATE payouts SET total_cents = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(payout_id)
            .bind(total_cents)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes an aborted payout (claimed zero escrows).
    pub async fn delete(&self, payout_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM payouts WHERE id = ?1")
            .bind(payout_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Execution Transitions
    // =========================================================================

    /// Claims a payout for execution: `scheduled → processing`, or
    /// `failed → processing` while retries remain.
    ///
    /// Returns false when another executor won the race or the payout is in
    /// a non-executable state.
    pub async fn mark_processing(&self, payout_id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payouts
            SET status = 'processing', updated_at = ?2
            WHERE id = ?1
              AND (status = 'scheduled'
                   OR (status = 'failed' AND retry_count < max_retry_attempts))
            "#,
        )
        .bind(payout_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Records a successful transfer: `processing → paid` plus the rail's
    /// reference id.
    pub async fn mark_paid(
        &self,
        payout_id: &str,
        provider_reference: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payouts
            SET status = 'paid', provider_reference = ?2,
                next_retry_date = NULL, last_error = NULL, updated_at = ?3
            WHERE id = ?1 AND status = 'processing'
            "#,
        )
        .bind(payout_id)
        .bind(provider_reference)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Records a failed transfer: `processing → failed` with the retry
    /// bookkeeping the executor computed (count, backoff date, last error).
    ///
    /// `next_retry_date` is `None` once attempts are exhausted.
    pub async fn record_failure(
        &self,
        payout_id: &str,
        retry_count: i64,
        next_retry_date: Option<DateTime<Utc>>,
        last_error: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payouts
            SET status = 'failed', retry_count = ?2, next_retry_date = ?3,
                last_error = ?4, updated_at = ?5
            WHERE id = ?1 AND status = 'processing'
            "#,
        )
        .bind(payout_id)
        .bind(retry_count)
        .bind(next_retry_date)
        .bind(last_error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Lists failed payouts whose backoff has elapsed and that still have
    /// retry attempts left.
    pub async fn list_due_retries(&self, as_of: DateTime<Utc>) -> DbResult<Vec<Payout>> {
        let sql = format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts \
             WHERE status = 'failed' \
               AND retry_count < max_retry_attempts \
               AND next_retry_date IS NOT NULL AND next_retry_date <= ?1 \
             ORDER BY next_retry_date"
        );
        Ok(sqlx::query_as::<_, Payout>(&sql)
            .bind(as_of)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Lists scheduled payouts whose scheduled date has arrived.
    pub async fn list_due_scheduled(&self, as_of: DateTime<Utc>) -> DbResult<Vec<Payout>> {
        let sql = format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts \
             WHERE status = 'scheduled' AND scheduled_date <= ?1 \
             ORDER BY scheduled_date"
        );
        Ok(sqlx::query_as::<_, Payout>(&sql)
            .bind(as_of)
            .fetch_all(&self.pool)
            .await?)
    }

    // =========================================================================
    // Store Configuration
    // =========================================================================

    /// Gets a store's payout configuration, falling back to platform
    /// defaults for stores that never configured payouts.
    pub async fn config_for_store(&self, store_id: &str) -> DbResult<StorePayoutConfig> {
        let config = sqlx::query_as::<_, StorePayoutConfig>(
            r#"
            SELECT store_id, minimum_payout_threshold_cents, frequency,
                   payout_day, max_retry_attempts, retry_base_hours
            FROM store_payout_configs
            WHERE store_id = ?1
            "#,
        )
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(config.unwrap_or_else(|| StorePayoutConfig::default_for(store_id)))
    }

    /// Creates or replaces a store's payout configuration.
    pub async fn upsert_config(&self, config: &StorePayoutConfig) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO store_payout_configs (
                store_id, minimum_payout_threshold_cents, frequency,
                payout_day, max_retry_attempts, retry_base_hours
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (store_id) DO UPDATE SET
                minimum_payout_threshold_cents = excluded.minimum_payout_threshold_cents,
                frequency = excluded.frequency,
                payout_day = excluded.payout_day,
                max_retry_attempts = excluded.max_retry_attempts,
                retry_base_hours = excluded.retry_base_hours
            "#,
        )
        .bind(&config.store_id)
        .bind(config.minimum_payout_threshold_cents)
        .bind(config.frequency)
        .bind(config.payout_day)
        .bind(config.max_retry_attempts)
        .bind(config.retry_base_hours)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::TimeZone;
    use uuid::Uuid;
    use vendra_core::{PayoutFrequency, PayoutStatus};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 23, 0, 0, 0).unwrap()
    }

    fn payout(total_cents: i64) -> Payout {
        Payout {
            id: Uuid::new_v4().to_string(),
            store_id: "store-1".into(),
            total_cents,
            status: PayoutStatus::Scheduled,
            scheduled_date: now(),
            retry_count: 0,
            max_retry_attempts: 3,
            next_retry_date: None,
            provider_reference: None,
            last_error: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trips() {
        let db = db().await;
        let p = payout(6_000);
        db.payouts().insert(&p).await.unwrap();

        let stored = db.payouts().get_by_id(&p.id).await.unwrap();
        assert_eq!(stored.total_cents, 6_000);
        assert_eq!(stored.status, PayoutStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_mark_processing_single_winner() {
        let db = db().await;
        let p = payout(6_000);
        db.payouts().insert(&p).await.unwrap();

        assert!(db.payouts().mark_processing(&p.id, now()).await.unwrap());
        // Second claim loses
        assert!(!db.payouts().mark_processing(&p.id, now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_paid_is_terminal() {
        let db = db().await;
        let p = payout(6_000);
        db.payouts().insert(&p).await.unwrap();

        db.payouts().mark_processing(&p.id, now()).await.unwrap();
        assert!(db.payouts().mark_paid(&p.id, "rail-ref-1", now()).await.unwrap());

        let stored = db.payouts().get_by_id(&p.id).await.unwrap();
        assert_eq!(stored.status, PayoutStatus::Paid);
        assert_eq!(stored.provider_reference.as_deref(), Some("rail-ref-1"));

        // No path out of paid
        assert!(!db.payouts().mark_processing(&p.id, now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_retry_cycle() {
        let db = db().await;
        let p = payout(6_000);
        db.payouts().insert(&p).await.unwrap();

        db.payouts().mark_processing(&p.id, now()).await.unwrap();
        let retry_at = now() + chrono::Duration::hours(24);
        db.payouts()
            .record_failure(&p.id, 1, Some(retry_at), "rail timeout", now())
            .await
            .unwrap();

        // Not due before the backoff elapses
        assert!(db.payouts().list_due_retries(now()).await.unwrap().is_empty());
        let due = db.payouts().list_due_retries(retry_at).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].retry_count, 1);

        // Failed-with-retries-left is claimable again
        assert!(db.payouts().mark_processing(&p.id, retry_at).await.unwrap());
    }

    #[tokio::test]
    async fn test_exhausted_payout_not_retryable() {
        let db = db().await;
        let p = payout(6_000);
        db.payouts().insert(&p).await.unwrap();

        db.payouts().mark_processing(&p.id, now()).await.unwrap();
        // Third failure exhausts the budget; no next retry date
        db.payouts()
            .record_failure(&p.id, 3, None, "account closed", now())
            .await
            .unwrap();

        let far = now() + chrono::Duration::days(365);
        assert!(db.payouts().list_due_retries(far).await.unwrap().is_empty());
        assert!(!db.payouts().mark_processing(&p.id, far).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_config_defaults_and_upsert() {
        let db = db().await;

        // Unconfigured store gets platform defaults
        let config = db.payouts().config_for_store("store-1").await.unwrap();
        assert_eq!(config.minimum_payout_threshold_cents, 2_500);
        assert_eq!(config.frequency, PayoutFrequency::Weekly);

        let custom = StorePayoutConfig {
            store_id: "store-1".into(),
            minimum_payout_threshold_cents: 5_000,
            frequency: PayoutFrequency::Monthly,
            payout_day: 15,
            max_retry_attempts: 5,
            retry_base_hours: 12,
        };
        db.payouts().upsert_config(&custom).await.unwrap();

        let stored = db.payouts().config_for_store("store-1").await.unwrap();
        assert_eq!(stored.minimum_payout_threshold_cents, 5_000);
        assert_eq!(stored.frequency, PayoutFrequency::Monthly);
        assert_eq!(stored.payout_day, 15);
    }
}
