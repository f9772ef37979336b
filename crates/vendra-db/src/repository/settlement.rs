//! # Settlement Repository
//!
//! Database operations for versioned settlements, their line items, and
//! manual adjustments.
//!
//! ## Versioning Guards
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two builders race to regenerate (store, period):                      │
//! │                                                                         │
//! │  Builder A: supersede(v1) ── rows_affected = 1 ── proceeds             │
//! │  Builder B: supersede(v1) ── rows_affected = 0 ── Conflict, aborts     │
//! │                                                                         │
//! │  Backstop: UNIQUE(store_id, period_start, period_end, version) means   │
//! │  even a builder that skipped the supersede cannot insert a second v2.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use vendra_core::{Settlement, SettlementAdjustment, SettlementItem};

/// Columns selected for `Settlement` rows, in struct order.
const SETTLEMENT_COLUMNS: &str = "id, store_id, period_start, period_end, version, \
     is_current_version, status, gross_sales_cents, refunds_cents, \
     commission_cents, adjustments_cents, net_cents, previous_settlement_id, \
     created_at, finalized_at";

/// Columns selected for `SettlementAdjustment` rows, in struct order.
const ADJUSTMENT_COLUMNS: &str = "id, store_id, period_start, period_end, \
     amount_cents, reason, kind, settlement_id, created_at";

/// Repository for settlement database operations.
#[derive(Debug, Clone)]
pub struct SettlementRepository {
    pool: SqlitePool,
}

impl SettlementRepository {
    /// Creates a new SettlementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettlementRepository { pool }
    }

    // =========================================================================
    // Versions
    // =========================================================================

    /// Gets the current version for (store, period), if any.
    pub async fn current_version(
        &self,
        store_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> DbResult<Option<Settlement>> {
        let sql = format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM settlements \
             WHERE store_id = ?1 AND period_start = ?2 AND period_end = ?3 \
               AND is_current_version = 1"
        );
        Ok(sqlx::query_as::<_, Settlement>(&sql)
            .bind(store_id)
            .bind(period_start)
            .bind(period_end)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Gets a settlement by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Settlement> {
        let sql = format!("SELECT {SETTLEMENT_COLUMNS} FROM settlements WHERE id = ?1");
        sqlx::query_as::<_, Settlement>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Settlement", id))
    }

    /// Lists every version for (store, period), oldest first.
    pub async fn list_versions(
        &self,
        store_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> DbResult<Vec<Settlement>> {
        let sql = format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM settlements \
             WHERE store_id = ?1 AND period_start = ?2 AND period_end = ?3 \
             ORDER BY version"
        );
        Ok(sqlx::query_as::<_, Settlement>(&sql)
            .bind(store_id)
            .bind(period_start)
            .bind(period_end)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Demotes the current version before a rebuild: clears its current
    /// flag and stamps it `superseded`.
    ///
    /// Conditional on the row still being current; a concurrent rebuild that
    /// got there first leaves `rows_affected = 0`, surfaced as `Conflict`.
    pub async fn supersede(&self, settlement_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE settlements
            SET is_current_version = 0, status = 'superseded'
            WHERE id = ?1 AND is_current_version = 1
            "#,
        )
        .bind(settlement_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            return Err(DbError::conflict(format!(
                "settlement {settlement_id} was superseded concurrently"
            )));
        }
        Ok(())
    }

    /// Inserts a new settlement version with its line items and tags the
    /// period's adjustments to it, in one transaction.
    ///
    /// A UNIQUE hit on (store, period, version) means a concurrent build
    /// claimed the same version number.
    pub async fn insert_with_items(
        &self,
        settlement: &Settlement,
        items: &[SettlementItem],
    ) -> DbResult<()> {
        debug!(
            id = %settlement.id,
            store_id = %settlement.store_id,
            version = settlement.version,
            "Inserting settlement"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO settlements (
                id, store_id, period_start, period_end, version,
                is_current_version, status, gross_sales_cents, refunds_cents,
                commission_cents, adjustments_cents, net_cents,
                previous_settlement_id, created_at, finalized_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&settlement.id)
        .bind(&settlement.store_id)
        .bind(settlement.period_start)
        .bind(settlement.period_end)
        .bind(settlement.version)
        .bind(settlement.is_current_version)
        .bind(settlement.status)
        .bind(settlement.gross_sales_cents)
        .bind(settlement.refunds_cents)
        .bind(settlement.commission_cents)
        .bind(settlement.adjustments_cents)
        .bind(settlement.net_cents)
        .bind(&settlement.previous_settlement_id)
        .bind(settlement.created_at)
        .bind(settlement.finalized_at)
        .execute(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO settlement_items (
                    id, settlement_id, escrow_id, sub_order_id,
                    gross_cents, refunded_cents, commission_cents, net_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&item.id)
            .bind(&item.settlement_id)
            .bind(&item.escrow_id)
            .bind(&item.sub_order_id)
            .bind(item.gross_cents)
            .bind(item.refunded_cents)
            .bind(item.commission_cents)
            .bind(item.net_cents)
            .execute(&mut *tx)
            .await?;
        }

        // Retag the period's adjustments to this build; a rebuild takes them
        // over from the superseded version.
        sqlx::query(
            r#"
            UPDATE settlement_adjustments
            SET settlement_id = ?1
            WHERE store_id = ?2 AND period_start = ?3 AND period_end = ?4
            "#,
        )
        .bind(&settlement.id)
        .bind(&settlement.store_id)
        .bind(settlement.period_start)
        .bind(settlement.period_end)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Lists a settlement's line items.
    pub async fn list_items(&self, settlement_id: &str) -> DbResult<Vec<SettlementItem>> {
        Ok(sqlx::query_as::<_, SettlementItem>(
            r#"
            SELECT id, settlement_id, escrow_id, sub_order_id,
                   gross_cents, refunded_cents, commission_cents, net_cents
            FROM settlement_items
            WHERE settlement_id = ?1
            ORDER BY sub_order_id
            "#,
        )
        .bind(settlement_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Marks a draft current settlement finalized: `draft → finalized`.
    ///
    /// Returns false when the settlement is not a current draft (already
    /// finalized, or superseded meanwhile).
    pub async fn finalize(&self, settlement_id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE settlements
            SET status = 'finalized', finalized_at = ?2
            WHERE id = ?1 AND status = 'draft' AND is_current_version = 1
            "#,
        )
        .bind(settlement_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Adjustments
    // =========================================================================

    /// Records a manual adjustment against a (store, period).
    pub async fn insert_adjustment(&self, adjustment: &SettlementAdjustment) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settlement_adjustments (
                id, store_id, period_start, period_end, amount_cents,
                reason, kind, settlement_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&adjustment.id)
        .bind(&adjustment.store_id)
        .bind(adjustment.period_start)
        .bind(adjustment.period_end)
        .bind(adjustment.amount_cents)
        .bind(&adjustment.reason)
        .bind(adjustment.kind)
        .bind(&adjustment.settlement_id)
        .bind(adjustment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists the adjustments recorded against a (store, period).
    pub async fn list_adjustments(
        &self,
        store_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> DbResult<Vec<SettlementAdjustment>> {
        let sql = format!(
            "SELECT {ADJUSTMENT_COLUMNS} FROM settlement_adjustments \
             WHERE store_id = ?1 AND period_start = ?2 AND period_end = ?3 \
             ORDER BY created_at, id"
        );
        Ok(sqlx::query_as::<_, SettlementAdjustment>(&sql)
            .bind(store_id)
            .bind(period_start)
            .bind(period_end)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Signed sum of the adjustments recorded against a (store, period).
    pub async fn sum_adjustments(
        &self,
        store_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)
            FROM settlement_adjustments
            WHERE store_id = ?1 AND period_start = ?2 AND period_end = ?3
            "#,
        )
        .bind(store_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    // =========================================================================
    // Period Sums
    // =========================================================================

    /// Sum of escrow gross for a store's orders placed in `[start, end)`.
    pub async fn sum_gross_sales(
        &self,
        store_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(gross_cents), 0)
            FROM escrow_transactions
            WHERE store_id = ?1 AND ordered_at >= ?2 AND ordered_at < ?3
            "#,
        )
        .bind(store_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
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
    use vendra_core::{AdjustmentKind, SettlementStatus};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn period() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap(),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 2, 0, 0).unwrap()
    }

    fn settlement(version: i64, previous: Option<&Settlement>) -> Settlement {
        let (start, end) = period();
        Settlement {
            id: Uuid::new_v4().to_string(),
            store_id: "store-1".into(),
            period_start: start,
            period_end: end,
            version,
            is_current_version: true,
            status: SettlementStatus::Draft,
            gross_sales_cents: 100_000,
            refunds_cents: 4_000,
            commission_cents: 10_080,
            adjustments_cents: 0,
            net_cents: 85_920,
            previous_settlement_id: previous.map(|p| p.id.clone()),
            created_at: now(),
            finalized_at: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_current_version() {
        let db = db().await;
        let (start, end) = period();
        let v1 = settlement(1, None);
        db.settlements().insert_with_items(&v1, &[]).await.unwrap();

        let current = db
            .settlements()
            .current_version("store-1", start, end)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.id, v1.id);
        assert_eq!(current.version, 1);
    }

    #[tokio::test]
    async fn test_supersede_then_new_version() {
        let db = db().await;
        let (start, end) = period();
        let v1 = settlement(1, None);
        db.settlements().insert_with_items(&v1, &[]).await.unwrap();

        db.settlements().supersede(&v1.id).await.unwrap();
        let v2 = settlement(2, Some(&v1));
        db.settlements().insert_with_items(&v2, &[]).await.unwrap();

        let current = db
            .settlements()
            .current_version("store-1", start, end)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.previous_settlement_id.as_deref(), Some(v1.id.as_str()));

        // The demoted version is retained, superseded
        let old = db.settlements().get_by_id(&v1.id).await.unwrap();
        assert_eq!(old.status, SettlementStatus::Superseded);
        assert!(!old.is_current_version);

        let versions = db
            .settlements()
            .list_versions("store-1", start, end)
            .await
            .unwrap();
        assert_eq!(versions.len(), 2);
    }

    #[tokio::test]
    async fn test_double_supersede_conflicts() {
        let db = db().await;
        let v1 = settlement(1, None);
        db.settlements().insert_with_items(&v1, &[]).await.unwrap();

        db.settlements().supersede(&v1.id).await.unwrap();
        let err = db.settlements().supersede(&v1.id).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_duplicate_version_hits_unique_backstop() {
        let db = db().await;
        let v1 = settlement(1, None);
        db.settlements().insert_with_items(&v1, &[]).await.unwrap();

        let rival = settlement(1, None);
        let err = db.settlements().insert_with_items(&rival, &[]).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_finalize_current_draft_only() {
        let db = db().await;
        let v1 = settlement(1, None);
        db.settlements().insert_with_items(&v1, &[]).await.unwrap();

        assert!(db.settlements().finalize(&v1.id, now()).await.unwrap());
        let stored = db.settlements().get_by_id(&v1.id).await.unwrap();
        assert_eq!(stored.status, SettlementStatus::Finalized);
        assert!(stored.finalized_at.is_some());

        // Finalizing twice is a no-op failure, not an exception
        assert!(!db.settlements().finalize(&v1.id, now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_adjustments_sum_and_retag() {
        let db = db().await;
        let (start, end) = period();

        let adjustment = SettlementAdjustment {
            id: Uuid::new_v4().to_string(),
            store_id: "store-1".into(),
            period_start: start,
            period_end: end,
            amount_cents: -500,
            reason: "chargeback fee".into(),
            kind: AdjustmentKind::Fee,
            settlement_id: None,
            created_at: now(),
        };
        db.settlements().insert_adjustment(&adjustment).await.unwrap();

        let sum = db
            .settlements()
            .sum_adjustments("store-1", start, end)
            .await
            .unwrap();
        assert_eq!(sum, -500);

        // A build consumes (tags) the period's adjustments
        let v1 = settlement(1, None);
        db.settlements().insert_with_items(&v1, &[]).await.unwrap();

        let stored = db
            .settlements()
            .list_adjustments("store-1", start, end)
            .await
            .unwrap();
        assert_eq!(stored[0].settlement_id.as_deref(), Some(v1.id.as_str()));
    }
}
