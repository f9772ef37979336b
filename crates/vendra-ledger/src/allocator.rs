//! # Escrow Allocator Service
//!
//! Splits confirmed payments into per-seller escrows and persists them with
//! their initial commission audit rows.
//!
//! ## Idempotency
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  allocate_payment(payment, sub_orders)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. Pre-check: escrows exist for payment? ──yes──► DuplicateAllocation │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │  2. Pure split (vendra-core): validate, resolve rates, compute         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  3. Persist in one tx ── UNIQUE(payment, sub_order) hit? ──┐           │
//! │       │                                                     │           │
//! │       ▼                                                     ▼           │
//! │     done                       DuplicateAllocation (race backstop)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use vendra_core::allocation::allocate;
use vendra_core::{CoreError, EscrowTransaction, Payment, SubOrder};
use vendra_db::Database;

/// Service that turns confirmed payments into escrow records.
#[derive(Debug, Clone)]
pub struct EscrowAllocator<C: Clock = SystemClock> {
    db: Database,
    config: LedgerConfig,
    clock: C,
}

impl EscrowAllocator<SystemClock> {
    /// Creates an allocator on the system clock.
    pub fn new(db: Database, config: LedgerConfig) -> Self {
        EscrowAllocator {
            db,
            config,
            clock: SystemClock,
        }
    }
}

impl<C: Clock> EscrowAllocator<C> {
    /// Creates an allocator with an explicit clock (tests).
    pub fn with_clock(db: Database, config: LedgerConfig, clock: C) -> Self {
        EscrowAllocator { db, config, clock }
    }

    /// Allocates a confirmed payment into per-seller escrows.
    ///
    /// Exactly-once per payment: a replay returns `DuplicateAllocation`
    /// whether it is caught by the pre-check or by the unique-index backstop
    /// underneath it. Payments in a currency other than the configured
    /// settlement currency are rejected up front. Nothing is persisted on
    /// any error.
    pub async fn allocate_payment(
        &self,
        payment: &Payment,
        sub_orders: &[SubOrder],
    ) -> LedgerResult<Vec<EscrowTransaction>> {
        debug!(payment_id = %payment.id, sub_orders = sub_orders.len(), "Allocating payment");

        if payment.currency != self.config.currency {
            return Err(LedgerError::UnsupportedCurrency {
                payment_id: payment.id.clone(),
                currency: payment.currency.clone(),
                expected: self.config.currency.clone(),
            });
        }

        if self.db.escrows().exists_for_payment(&payment.id).await? {
            return Err(CoreError::DuplicateAllocation {
                payment_id: payment.id.clone(),
            }
            .into());
        }

        let policy = self.db.commission_configs().policy().await?;
        let plans = allocate(
            payment,
            sub_orders,
            &policy,
            self.config.rate_policy,
            self.config.hold_days,
        )?;

        match self.db.escrows().insert_allocation(&plans).await {
            Ok(()) => {}
            Err(err) if err.is_unique_violation() => {
                // Lost a race with a concurrent allocate for this payment.
                return Err(CoreError::DuplicateAllocation {
                    payment_id: payment.id.clone(),
                }
                .into());
            }
            Err(err) => return Err(err.into()),
        }

        let escrows: Vec<EscrowTransaction> = plans.into_iter().map(|p| p.escrow).collect();
        info!(
            payment_id = %payment.id,
            escrows = escrows.len(),
            total_gross_cents = escrows.iter().map(|e| e.gross_cents).sum::<i64>(),
            "Payment allocated"
        );
        Ok(escrows)
    }

    /// Records delivery confirmation for an escrow, restarting its hold
    /// period from the delivery instant.
    ///
    /// Returns false when the escrow already left `held` (promoted,
    /// refunded, or disputed); the event is then a stale no-op.
    pub async fn record_delivery(
        &self,
        escrow_id: &str,
        delivered_at: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        let eligible_at = delivered_at + Duration::days(self.config.hold_days);
        let reanchored = self
            .db
            .escrows()
            .reanchor_eligibility(escrow_id, eligible_at, self.clock.now())
            .await?;

        if reanchored {
            debug!(escrow_id = %escrow_id, eligible_at = %eligible_at, "Delivery recorded");
        }
        Ok(reanchored)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
