//! # Commission Repositories
//!
//! Two repositories share this module:
//!
//! - [`CommissionRepository`] - the append-only commission audit trail
//!   (`commission_transactions`). Rows are inserted by allocation and refund
//!   flows and never updated or deleted.
//! - [`CommissionConfigRepository`] - effective-dated commission
//!   configuration across the three scopes (global, category, seller).
//!
//! ## Effective Dating
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  rate change = INSERT a new config row, never UPDATE the old one       │
//! │                                                                         │
//! │  global 10%  ├────────────────────┤                                    │
//! │  global 12%                  ├──────────────────────────►              │
//! │                                 ▲                                       │
//! │                    overlap: the row with the latest                     │
//! │                    effective_from wins at resolve time                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use vendra_core::commission::{CommissionConfig, CommissionPolicy, CommissionRate};
use vendra_core::money::{Money, RateBps};
use vendra_core::CommissionTransaction;

/// Columns selected for `CommissionTransaction` rows, in struct order.
const COMMISSION_COLUMNS: &str = "id, escrow_id, kind, basis_cents, rate_bps, \
     fixed_fee_cents, commission_cents, source, clamped, refund_request_id, \
     created_at";

// =============================================================================
// Audit Trail
// =============================================================================

/// Repository for the commission audit trail.
#[derive(Debug, Clone)]
pub struct CommissionRepository {
    pool: SqlitePool,
}

impl CommissionRepository {
    /// Creates a new CommissionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CommissionRepository { pool }
    }

    /// Lists an escrow's commission transactions, oldest first.
    pub async fn list_by_escrow(&self, escrow_id: &str) -> DbResult<Vec<CommissionTransaction>> {
        let sql = format!(
            "SELECT {COMMISSION_COLUMNS} FROM commission_transactions \
             WHERE escrow_id = ?1 ORDER BY created_at, id"
        );
        Ok(sqlx::query_as::<_, CommissionTransaction>(&sql)
            .bind(escrow_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Gets the escrow's `Initial` commission transaction.
    ///
    /// Every escrow has exactly one; its absence means the allocation
    /// transaction was tampered with and is reported as NotFound.
    pub async fn find_initial(&self, escrow_id: &str) -> DbResult<CommissionTransaction> {
        let sql = format!(
            "SELECT {COMMISSION_COLUMNS} FROM commission_transactions \
             WHERE escrow_id = ?1 AND kind = 'initial'"
        );
        sqlx::query_as::<_, CommissionTransaction>(&sql)
            .bind(escrow_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Initial commission for escrow", escrow_id))
    }

    /// Looks up the adjustment a refund request already produced, if any
    /// (refund de-duplication pre-check).
    pub async fn find_by_refund_request(
        &self,
        refund_request_id: &str,
    ) -> DbResult<Option<CommissionTransaction>> {
        let sql = format!(
            "SELECT {COMMISSION_COLUMNS} FROM commission_transactions \
             WHERE refund_request_id = ?1"
        );
        Ok(sqlx::query_as::<_, CommissionTransaction>(&sql)
            .bind(refund_request_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Sum of refund amounts a store's escrows had posted in `[start, end)`,
    /// bucketed by posting time.
    pub async fn sum_refunds_in_period(
        &self,
        store_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(ct.basis_cents), 0)
            FROM commission_transactions ct
            JOIN escrow_transactions e ON e.id = ct.escrow_id
            WHERE e.store_id = ?1
              AND ct.kind = 'refund_adjustment'
              AND ct.created_at >= ?2 AND ct.created_at < ?3
            "#,
        )
        .bind(store_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Net commission attributable to a store's period: initial charges for
    /// orders placed in `[start, end)` plus (negative) refund adjustments
    /// posted in it.
    ///
    /// Initial rows bucket by the order date so they line up with gross
    /// sales; adjustments bucket by posting time so they line up with the
    /// refunds column.
    pub async fn sum_commission_in_period(
        &self,
        store_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> DbResult<i64> {
        let initial: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(ct.commission_cents), 0)
            FROM commission_transactions ct
            JOIN escrow_transactions e ON e.id = ct.escrow_id
            WHERE e.store_id = ?1
              AND ct.kind = 'initial'
              AND e.ordered_at >= ?2 AND e.ordered_at < ?3
            "#,
        )
        .bind(store_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&self.pool)
        .await?;

        let adjustments: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(ct.commission_cents), 0)
            FROM commission_transactions ct
            JOIN escrow_transactions e ON e.id = ct.escrow_id
            WHERE e.store_id = ?1
              AND ct.kind = 'refund_adjustment'
              AND ct.created_at >= ?2 AND ct.created_at < ?3
            "#,
        )
        .bind(store_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&self.pool)
        .await?;

        // Adjustment amounts are negative, so this nets the reversals out.
        Ok(initial + adjustments)
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// One stored commission configuration row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommissionConfigRow {
    pub id: String,
    /// 'global', 'category', or 'seller'.
    pub scope: String,
    pub category_id: Option<String>,
    pub seller_id: Option<String>,
    pub rate_bps: i64,
    pub fixed_fee_cents: i64,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Repository for effective-dated commission configuration.
#[derive(Debug, Clone)]
pub struct CommissionConfigRepository {
    pool: SqlitePool,
}

impl CommissionConfigRepository {
    /// Creates a new CommissionConfigRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CommissionConfigRepository { pool }
    }

    /// Adds a platform-wide default rate.
    pub async fn add_global(
        &self,
        rate: CommissionRate,
        effective_from: DateTime<Utc>,
        effective_to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DbResult<String> {
        self.insert("global", None, None, rate, effective_from, effective_to, now)
            .await
    }

    /// Adds a category-level override (highest precedence).
    pub async fn add_category_override(
        &self,
        category_id: &str,
        rate: CommissionRate,
        effective_from: DateTime<Utc>,
        effective_to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DbResult<String> {
        self.insert(
            "category",
            Some(category_id),
            None,
            rate,
            effective_from,
            effective_to,
            now,
        )
        .await
    }

    /// Adds a seller-specific override.
    pub async fn add_seller_override(
        &self,
        seller_id: &str,
        rate: CommissionRate,
        effective_from: DateTime<Utc>,
        effective_to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DbResult<String> {
        self.insert(
            "seller",
            None,
            Some(seller_id),
            rate,
            effective_from,
            effective_to,
            now,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert(
        &self,
        scope: &str,
        category_id: Option<&str>,
        seller_id: Option<&str>,
        rate: CommissionRate,
        effective_from: DateTime<Utc>,
        effective_to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        debug!(scope = scope, id = %id, "Inserting commission config");

        sqlx::query(
            r#"
            INSERT INTO commission_configs (
                id, scope, category_id, seller_id, rate_bps, fixed_fee_cents,
                effective_from, effective_to, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&id)
        .bind(scope)
        .bind(category_id)
        .bind(seller_id)
        .bind(rate.rate.bps() as i64)
        .bind(rate.fixed_fee.cents())
        .bind(effective_from)
        .bind(effective_to)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Lists every stored configuration row.
    pub async fn list_all(&self) -> DbResult<Vec<CommissionConfigRow>> {
        Ok(sqlx::query_as::<_, CommissionConfigRow>(
            r#"
            SELECT id, scope, category_id, seller_id, rate_bps, fixed_fee_cents,
                   effective_from, effective_to, created_at
            FROM commission_configs
            ORDER BY effective_from, created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Materializes the full override chain as a resolver policy.
    ///
    /// Effective-date filtering happens at resolve time inside the policy,
    /// so one snapshot serves any `at` the allocator passes.
    pub async fn policy(&self) -> DbResult<CommissionPolicy> {
        let rows = self.list_all().await?;

        let mut policy = CommissionPolicy::new();
        for row in rows {
            let config = CommissionConfig {
                rate: CommissionRate::new(
                    RateBps::from_bps(row.rate_bps.max(0) as u32),
                    Money::from_cents(row.fixed_fee_cents),
                ),
                effective_from: row.effective_from,
                effective_to: row.effective_to,
            };

            policy = match (row.scope.as_str(), row.category_id, row.seller_id) {
                ("category", Some(category), _) => {
                    policy.with_category_override(&category, config)
                }
                ("seller", _, Some(seller)) => policy.with_seller_override(&seller, config),
                _ => policy.with_global(config),
            };
        }

        Ok(policy)
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

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn jan_1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn rate(bps: u32, fixed_cents: i64) -> CommissionRate {
        CommissionRate::new(RateBps::from_bps(bps), Money::from_cents(fixed_cents))
    }

    #[tokio::test]
    async fn test_policy_round_trips_three_tiers() {
        let db = db().await;
        let configs = db.commission_configs();
        let now = jan_1();

        configs.add_global(rate(1_000, 50), jan_1(), None, now).await.unwrap();
        configs
            .add_category_override("electronics", rate(1_500, 0), jan_1(), None, now)
            .await
            .unwrap();
        configs
            .add_seller_override("store-1", rate(800, 0), jan_1(), None, now)
            .await
            .unwrap();

        let policy = configs.policy().await.unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let gross = Money::from_cents(10_000);

        // Category beats seller beats global
        let resolved = policy.resolve("store-1", Some("electronics"), gross, at).unwrap();
        assert_eq!(resolved.commission.cents(), 1_500);

        let resolved = policy.resolve("store-1", Some("books"), gross, at).unwrap();
        assert_eq!(resolved.commission.cents(), 800);

        let resolved = policy.resolve("store-2", None, gross, at).unwrap();
        assert_eq!(resolved.commission.cents(), 1_050);
    }

    #[tokio::test]
    async fn test_effective_dated_rate_change() {
        let db = db().await;
        let configs = db.commission_configs();
        let now = jan_1();
        let april = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();

        configs.add_global(rate(1_000, 0), jan_1(), None, now).await.unwrap();
        configs.add_global(rate(1_200, 0), april, None, now).await.unwrap();

        let policy = configs.policy().await.unwrap();
        let gross = Money::from_cents(10_000);

        let march = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(policy.resolve("s", None, gross, march).unwrap().commission.cents(), 1_000);

        let may = Utc.with_ymd_and_hms(2026, 5, 15, 0, 0, 0).unwrap();
        assert_eq!(policy.resolve("s", None, gross, may).unwrap().commission.cents(), 1_200);
    }

    #[tokio::test]
    async fn test_find_initial_missing_is_not_found() {
        let db = db().await;
        let err = db.commissions().find_initial("nope").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
