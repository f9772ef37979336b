//! # Settlement Builder Service
//!
//! Produces versioned per-store, per-period financial reports from the
//! ledger tables and walks them through the draft → finalized lifecycle.
//!
//! ## Concurrent Builds
//! Two builders racing to regenerate the same (store, period) are resolved
//! by the conditional supersede update plus the UNIQUE version backstop in
//! the settlements table: exactly one insert lands, the other surfaces as
//! [`LedgerError::ConcurrentSettlementBuild`].

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::{LedgerError, LedgerResult};
use vendra_core::money::Money;
use vendra_core::settlement::{build_settlement, finalize, SettlementTotals};
use vendra_core::{AdjustmentKind, Settlement, SettlementAdjustment, SettlementItem};
use vendra_db::{Database, DbError};

/// Service that builds and finalizes settlement reports.
#[derive(Debug, Clone)]
pub struct SettlementBuilder<C: Clock = SystemClock> {
    db: Database,
    clock: C,
}

impl SettlementBuilder<SystemClock> {
    /// Creates a builder on the system clock.
    pub fn new(db: Database) -> Self {
        SettlementBuilder {
            db,
            clock: SystemClock,
        }
    }
}

impl<C: Clock> SettlementBuilder<C> {
    /// Creates a builder with an explicit clock (tests).
    pub fn with_clock(db: Database, clock: C) -> Self {
        SettlementBuilder { db, clock }
    }

    /// Builds the next settlement version for (store, period).
    ///
    /// The first build is version 1; every rebuild supersedes the current
    /// version and links back to it. A finalized current version blocks the
    /// rebuild unless `force` is set (admin override).
    pub async fn build(
        &self,
        store_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        force: bool,
    ) -> LedgerResult<Settlement> {
        let now = self.clock.now();
        debug!(
            store_id = %store_id,
            period_start = %period_start,
            period_end = %period_end,
            "Building settlement"
        );

        let previous = self
            .db
            .settlements()
            .current_version(store_id, period_start, period_end)
            .await?;

        let totals = SettlementTotals {
            gross_sales: Money::from_cents(
                self.db
                    .settlements()
                    .sum_gross_sales(store_id, period_start, period_end)
                    .await?,
            ),
            refunds: Money::from_cents(
                self.db
                    .commissions()
                    .sum_refunds_in_period(store_id, period_start, period_end)
                    .await?,
            ),
            commission: Money::from_cents(
                self.db
                    .commissions()
                    .sum_commission_in_period(store_id, period_start, period_end)
                    .await?,
            ),
            adjustments: Money::from_cents(
                self.db
                    .settlements()
                    .sum_adjustments(store_id, period_start, period_end)
                    .await?,
            ),
        };

        let settlement = build_settlement(
            store_id,
            period_start,
            period_end,
            totals,
            previous.as_ref(),
            force,
            now,
        )?;

        if let Some(prev) = &previous {
            match self.db.settlements().supersede(&prev.id).await {
                Ok(()) => {}
                Err(DbError::Conflict(_)) => {
                    return Err(LedgerError::ConcurrentSettlementBuild {
                        store_id: store_id.to_string(),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        let escrows = self
            .db
            .escrows()
            .list_ordered_in_period(store_id, period_start, period_end)
            .await?;
        let items: Vec<SettlementItem> = escrows
            .iter()
            .map(|e| {
                let commission_cents = e.commission_cents - e.commission_refunded_cents;
                SettlementItem {
                    id: Uuid::new_v4().to_string(),
                    settlement_id: settlement.id.clone(),
                    escrow_id: e.id.clone(),
                    sub_order_id: e.sub_order_id.clone(),
                    gross_cents: e.gross_cents,
                    refunded_cents: e.refunded_cents,
                    commission_cents,
                    net_cents: e.gross_cents - e.refunded_cents - commission_cents,
                }
            })
            .collect();

        match self.db.settlements().insert_with_items(&settlement, &items).await {
            Ok(()) => {}
            Err(err) if err.is_unique_violation() => {
                // A concurrent build claimed this version number.
                return Err(LedgerError::ConcurrentSettlementBuild {
                    store_id: store_id.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            store_id = %store_id,
            settlement_id = %settlement.id,
            version = settlement.version,
            net_cents = settlement.net_cents,
            items = items.len(),
            "Settlement built"
        );
        Ok(settlement)
    }

    /// Finalizes a draft settlement (admin action, one-way).
    pub async fn finalize(&self, settlement_id: &str) -> LedgerResult<Settlement> {
        let now = self.clock.now();
        let settlement = self.db.settlements().get_by_id(settlement_id).await?;

        let finalized = finalize(&settlement, now)?;

        if !self.db.settlements().finalize(settlement_id, now).await? {
            // Superseded or finalized between the read and the update.
            return Err(DbError::conflict(format!(
                "settlement {settlement_id} changed concurrently"
            ))
            .into());
        }

        info!(
            settlement_id = %settlement_id,
            store_id = %finalized.store_id,
            net_cents = finalized.net_cents,
            "Settlement finalized"
        );
        Ok(finalized)
    }

    /// Records a manual adjustment against a (store, period). It is picked
    /// up by the next build for that period.
    pub async fn add_adjustment(
        &self,
        store_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        amount: Money,
        reason: &str,
        kind: AdjustmentKind,
    ) -> LedgerResult<SettlementAdjustment> {
        let adjustment = SettlementAdjustment {
            id: Uuid::new_v4().to_string(),
            store_id: store_id.to_string(),
            period_start,
            period_end,
            amount_cents: amount.cents(),
            reason: reason.to_string(),
            kind,
            settlement_id: None,
            created_at: self.clock.now(),
        };
        self.db.settlements().insert_adjustment(&adjustment).await?;

        info!(
            store_id = %store_id,
            amount_cents = adjustment.amount_cents,
            kind = ?kind,
            "Settlement adjustment recorded"
        );
        Ok(adjustment)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
