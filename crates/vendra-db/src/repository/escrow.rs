//! # Escrow Repository
//!
//! Database operations for escrow transactions.
//!
//! ## Escrow Lifecycle (storage view)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. ALLOCATE                                                            │
//! │     └── insert_allocation() → escrow rows + initial commission rows     │
//! │         (one transaction; UNIQUE(payment_id, sub_order_id) backstop)    │
//! │                                                                         │
//! │  2. HOLD → ELIGIBLE                                                     │
//! │     └── promote_eligible() → held escrows past eligible_at              │
//! │                                                                         │
//! │  3. CLAIM                                                               │
//! │     └── claim_for_payout() → conditional UPDATE per escrow; an escrow  │
//! │         already claimed by a live payout silently stays put            │
//! │                                                                         │
//! │  4. RELEASE / REFUND                                                    │
//! │     └── release_for_payout() on rail success                            │
//! │     └── apply_refund() → optimistic update + adjustment row             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use vendra_core::allocation::AllocationPlan;
use vendra_core::{CommissionTransaction, EscrowTransaction};

/// Columns selected for `EscrowTransaction` rows, in struct order.
const ESCROW_COLUMNS: &str = "id, payment_id, sub_order_id, store_id, order_id, \
     currency, gross_cents, commission_cents, net_cents, refunded_cents, \
     commission_refunded_cents, status, eligible_at, payout_id, \
     ordered_at, created_at, updated_at";

/// Escrows an aggregator may pay: past their hold, and not already claimed
/// by a payout that is still live (scheduled/processing/paid, or failed with
/// retries remaining).
const CLAIMABLE: &str = "status IN ('eligible_for_payout', 'partially_refunded') \
     AND (payout_id IS NULL OR payout_id IN ( \
         SELECT id FROM payouts \
         WHERE status = 'failed' AND retry_count >= max_retry_attempts))";

/// Repository for escrow database operations.
#[derive(Debug, Clone)]
pub struct EscrowRepository {
    pool: SqlitePool,
}

impl EscrowRepository {
    /// Creates a new EscrowRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EscrowRepository { pool }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Persists an allocation: every escrow plus its initial commission
    /// transaction, in one database transaction.
    ///
    /// A `UNIQUE(payment_id, sub_order_id)` hit rolls everything back and
    /// surfaces as `DbError::UniqueViolation`; the ledger layer maps it to
    /// `DuplicateAllocation`.
    pub async fn insert_allocation(&self, plans: &[AllocationPlan]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        for plan in plans {
            let e = &plan.escrow;
            debug!(escrow_id = %e.id, payment_id = %e.payment_id, "Inserting escrow");

            sqlx::query(
                r#"
                INSERT INTO escrow_transactions (
                    id, payment_id, sub_order_id, store_id, order_id, currency,
                    gross_cents, commission_cents, net_cents, refunded_cents,
                    commission_refunded_cents, status, eligible_at, payout_id,
                    ordered_at, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                "#,
            )
            .bind(&e.id)
            .bind(&e.payment_id)
            .bind(&e.sub_order_id)
            .bind(&e.store_id)
            .bind(&e.order_id)
            .bind(&e.currency)
            .bind(e.gross_cents)
            .bind(e.commission_cents)
            .bind(e.net_cents)
            .bind(e.refunded_cents)
            .bind(e.commission_refunded_cents)
            .bind(e.status)
            .bind(e.eligible_at)
            .bind(&e.payout_id)
            .bind(e.ordered_at)
            .bind(e.created_at)
            .bind(e.updated_at)
            .execute(&mut *tx)
            .await?;

            insert_commission_tx(&mut tx, &plan.initial_commission).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Whether any escrow exists for the payment (allocation pre-check).
    pub async fn exists_for_payment(&self, payment_id: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM escrow_transactions WHERE payment_id = ?1",
        )
        .bind(payment_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Gets an escrow by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<EscrowTransaction> {
        let sql = format!("SELECT {ESCROW_COLUMNS} FROM escrow_transactions WHERE id = ?1");
        sqlx::query_as::<_, EscrowTransaction>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Escrow", id))
    }

    /// Lists all escrows created for one payment.
    pub async fn list_by_payment(&self, payment_id: &str) -> DbResult<Vec<EscrowTransaction>> {
        let sql = format!(
            "SELECT {ESCROW_COLUMNS} FROM escrow_transactions \
             WHERE payment_id = ?1 ORDER BY sub_order_id"
        );
        Ok(sqlx::query_as::<_, EscrowTransaction>(&sql)
            .bind(payment_id)
            .fetch_all(&self.pool)
            .await?)
    }

    // =========================================================================
    // Eligibility
    // =========================================================================

    /// Re-anchors a held escrow's eligibility timer (delivery confirmation).
    ///
    /// Only `held` escrows re-anchor; returns false when the escrow has
    /// already moved on (refunded, disputed, promoted).
    pub async fn reanchor_eligibility(
        &self,
        escrow_id: &str,
        eligible_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE escrow_transactions
            SET eligible_at = ?2, updated_at = ?3
            WHERE id = ?1 AND status = 'held'
            "#,
        )
        .bind(escrow_id)
        .bind(eligible_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Promotes held escrows past their hold period to `eligible_for_payout`.
    ///
    /// Returns the number of escrows promoted. Refunded and disputed escrows
    /// are untouched: only `held` rows promote.
    pub async fn promote_eligible(
        &self,
        store_id: &str,
        as_of: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE escrow_transactions
            SET status = 'eligible_for_payout', updated_at = ?3
            WHERE store_id = ?1 AND status = 'held' AND eligible_at <= ?2
            "#,
        )
        .bind(store_id)
        .bind(as_of)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Lists escrows the aggregator may include in a new payout: eligible or
    /// partially refunded, past their hold, and not claimed by a live payout.
    pub async fn list_payable(
        &self,
        store_id: &str,
        as_of: DateTime<Utc>,
    ) -> DbResult<Vec<EscrowTransaction>> {
        let sql = format!(
            "SELECT {ESCROW_COLUMNS} FROM escrow_transactions \
             WHERE store_id = ?1 AND eligible_at <= ?2 AND {CLAIMABLE} \
             ORDER BY ordered_at"
        );
        Ok(sqlx::query_as::<_, EscrowTransaction>(&sql)
            .bind(store_id)
            .bind(as_of)
            .fetch_all(&self.pool)
            .await?)
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    /// Persists one refund application: the updated escrow counters and the
    /// negative commission adjustment, atomically.
    ///
    /// The escrow update is optimistic: it only matches when
    /// `refunded_cents` still equals `expected_refunded_cents` (the value the
    /// caller computed against). A concurrent refund in between surfaces as
    /// `DbError::Conflict`; a replayed `refund_request_id` surfaces as
    /// `UniqueViolation` from the adjustment insert.
    pub async fn apply_refund(
        &self,
        escrow: &EscrowTransaction,
        adjustment: &CommissionTransaction,
        expected_refunded_cents: i64,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        // Adjustment first: a duplicate refund_request_id must fail before
        // the counters move.
        insert_commission_tx(&mut tx, adjustment).await?;

        let result = sqlx::query(
            r#"
            UPDATE escrow_transactions
            SET refunded_cents = ?2,
                commission_refunded_cents = ?3,
                status = ?4,
                updated_at = ?5
            WHERE id = ?1 AND refunded_cents = ?6
            "#,
        )
        .bind(&escrow.id)
        .bind(escrow.refunded_cents)
        .bind(escrow.commission_refunded_cents)
        .bind(escrow.status)
        .bind(escrow.updated_at)
        .bind(expected_refunded_cents)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            // Implicit rollback on drop.
            return Err(DbError::conflict(format!(
                "escrow {} changed during refund application",
                escrow.id
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Payout Claims & Releases
    // =========================================================================

    /// Atomically claims escrows for a payout, one conditional UPDATE each.
    ///
    /// Returns the IDs actually claimed. An escrow that a concurrent payout
    /// grabbed first fails its condition and is simply absent from the
    /// result; the caller recomputes the payout total from the claimed set.
    pub async fn claim_for_payout(
        &self,
        escrow_ids: &[String],
        payout_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Vec<String>> {
        let sql = format!(
            "UPDATE escrow_transactions SET payout_id = ?1, updated_at = ?2 \
             WHERE id = ?3 AND {CLAIMABLE}"
        );

        let mut tx = self.pool.begin().await?;
        let mut claimed = Vec::with_capacity(escrow_ids.len());

        for escrow_id in escrow_ids {
            let result = sqlx::query(&sql)
                .bind(payout_id)
                .bind(now)
                .bind(escrow_id)
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() == 1 {
                claimed.push(escrow_id.clone());
            } else {
                debug!(escrow_id = %escrow_id, "Escrow lost to a concurrent claim");
            }
        }

        tx.commit().await?;
        Ok(claimed)
    }

    /// Lists the escrows claimed by a payout.
    pub async fn list_by_payout(&self, payout_id: &str) -> DbResult<Vec<EscrowTransaction>> {
        let sql = format!(
            "SELECT {ESCROW_COLUMNS} FROM escrow_transactions \
             WHERE payout_id = ?1 ORDER BY ordered_at"
        );
        Ok(sqlx::query_as::<_, EscrowTransaction>(&sql)
            .bind(payout_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Releases a paid payout's escrows to the seller (terminal).
    ///
    /// Escrows that went terminal between claim and payment (e.g. fully
    /// refunded) keep their terminal status.
    pub async fn release_for_payout(&self, payout_id: &str, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE escrow_transactions
            SET status = 'released', updated_at = ?2
            WHERE payout_id = ?1
              AND status IN ('eligible_for_payout', 'partially_refunded')
            "#,
        )
        .bind(payout_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Unclaims every escrow held by a payout (aborted/empty payout).
    pub async fn unclaim_for_payout(&self, payout_id: &str, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE escrow_transactions
            SET payout_id = NULL, updated_at = ?2
            WHERE payout_id = ?1
            "#,
        )
        .bind(payout_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Disputes
    // =========================================================================

    /// Freezes an escrow pending a dispute decision.
    ///
    /// Only non-terminal, unclaimed escrows freeze; returns false otherwise.
    pub async fn mark_in_dispute(&self, escrow_id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE escrow_transactions
            SET status = 'in_dispute', updated_at = ?2
            WHERE id = ?1
              AND status IN ('held', 'eligible_for_payout', 'partially_refunded')
              AND payout_id IS NULL
            "#,
        )
        .bind(escrow_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Unfreezes a disputed escrow back to `held`; the promotion sweep picks
    /// it up again once its hold has elapsed.
    pub async fn resolve_dispute(&self, escrow_id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE escrow_transactions
            SET status = 'held', updated_at = ?2
            WHERE id = ?1 AND status = 'in_dispute'
            "#,
        )
        .bind(escrow_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Settlement Support
    // =========================================================================

    /// Lists a store's escrows whose orders fall in `[start, end)`, for
    /// settlement item generation.
    pub async fn list_ordered_in_period(
        &self,
        store_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> DbResult<Vec<EscrowTransaction>> {
        let sql = format!(
            "SELECT {ESCROW_COLUMNS} FROM escrow_transactions \
             WHERE store_id = ?1 AND ordered_at >= ?2 AND ordered_at < ?3 \
             ORDER BY ordered_at"
        );
        Ok(sqlx::query_as::<_, EscrowTransaction>(&sql)
            .bind(store_id)
            .bind(period_start)
            .bind(period_end)
            .fetch_all(&self.pool)
            .await?)
    }
}

/// Inserts one commission transaction inside an open database transaction.
///
/// Shared by allocation (initial rows) and refunds (adjustment rows).
pub(crate) async fn insert_commission_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    ct: &CommissionTransaction,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO commission_transactions (
            id, escrow_id, kind, basis_cents, rate_bps, fixed_fee_cents,
            commission_cents, source, clamped, refund_request_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&ct.id)
    .bind(&ct.escrow_id)
    .bind(ct.kind)
    .bind(ct.basis_cents)
    .bind(ct.rate_bps)
    .bind(ct.fixed_fee_cents)
    .bind(ct.commission_cents)
    .bind(ct.source)
    .bind(ct.clamped)
    .bind(&ct.refund_request_id)
    .bind(ct.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
