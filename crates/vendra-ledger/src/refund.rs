//! # Refund Adjuster Service
//!
//! Applies refund decisions against escrows: proportional commission
//! reversal, escrow counter updates, and refund de-duplication. Also owns
//! the dispute freeze/unfreeze transitions, since disputes are the
//! precursor of most refunds.
//!
//! ## De-duplication
//! Refund requests arrive at-least-once from the returns collaborator. The
//! pre-check looks the `refund_request_id` up in the audit trail; the UNIQUE
//! index on that column backstops the race where two replicas pass the
//! pre-check simultaneously.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::LedgerResult;
use vendra_core::money::Money;
use vendra_core::refund::{apply_refund, RefundOutcome};
use vendra_core::{CoreError, PayoutStatus};
use vendra_db::Database;

/// Service that applies refunds and manages dispute freezes.
#[derive(Debug, Clone)]
pub struct RefundAdjuster<C: Clock = SystemClock> {
    db: Database,
    clock: C,
}

impl RefundAdjuster<SystemClock> {
    /// Creates an adjuster on the system clock.
    pub fn new(db: Database) -> Self {
        RefundAdjuster {
            db,
            clock: SystemClock,
        }
    }
}

impl<C: Clock> RefundAdjuster<C> {
    /// Creates an adjuster with an explicit clock (tests).
    pub fn with_clock(db: Database, clock: C) -> Self {
        RefundAdjuster { db, clock }
    }

    /// Applies one refund decision to an escrow.
    ///
    /// Commission is reversed proportionally to the refunded share of gross
    /// and a `RefundAdjustment` row is appended to the audit trail. Replays
    /// of the same `refund_request_id` return `DuplicateRefund` and change
    /// nothing.
    ///
    /// If the escrow was already disbursed through a paid payout the
    /// adjustment still posts — it flows into future settlements — but no
    /// clawback of transferred funds is attempted.
    pub async fn apply(
        &self,
        escrow_id: &str,
        refund_request_id: &str,
        amount: Money,
    ) -> LedgerResult<RefundOutcome> {
        debug!(
            escrow_id = %escrow_id,
            refund_request_id = %refund_request_id,
            amount_cents = amount.cents(),
            "Applying refund"
        );

        if self
            .db
            .commissions()
            .find_by_refund_request(refund_request_id)
            .await?
            .is_some()
        {
            return Err(CoreError::DuplicateRefund {
                refund_request_id: refund_request_id.to_string(),
            }
            .into());
        }

        let escrow = self.db.escrows().get_by_id(escrow_id).await?;
        let initial = self.db.commissions().find_initial(escrow_id).await?;

        let outcome = apply_refund(&escrow, &initial, refund_request_id, amount, self.clock.now())?;

        match self
            .db
            .escrows()
            .apply_refund(&outcome.escrow, &outcome.adjustment, escrow.refunded_cents)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_unique_violation() => {
                // A replica replayed the request between pre-check and write.
                return Err(CoreError::DuplicateRefund {
                    refund_request_id: refund_request_id.to_string(),
                }
                .into());
            }
            Err(err) => return Err(err.into()),
        }

        if let Some(payout_id) = &escrow.payout_id {
            let payout = self.db.payouts().get_by_id(payout_id).await?;
            if payout.status == PayoutStatus::Paid {
                warn!(
                    escrow_id = %escrow_id,
                    payout_id = %payout_id,
                    refunded_cents = amount.cents(),
                    "Refund against an already-disbursed escrow; no clawback, \
                     adjustment flows into the next settlement"
                );
            }
        }

        info!(
            escrow_id = %escrow_id,
            refund_request_id = %refund_request_id,
            refunded_cents = amount.cents(),
            commission_reversed_cents = -outcome.adjustment.commission_cents,
            status = ?outcome.escrow.status,
            "Refund applied"
        );
        Ok(outcome)
    }

    /// Freezes an escrow while a return/complaint is investigated.
    ///
    /// Frozen escrows never promote to payable. Returns false when the
    /// escrow is terminal or already claimed by a payout.
    pub async fn open_dispute(&self, escrow_id: &str) -> LedgerResult<bool> {
        let frozen = self
            .db
            .escrows()
            .mark_in_dispute(escrow_id, self.clock.now())
            .await?;
        if frozen {
            info!(escrow_id = %escrow_id, "Escrow frozen for dispute");
        }
        Ok(frozen)
    }

    /// Unfreezes a disputed escrow without a refund (dispute resolved in
    /// the seller's favor). The escrow returns to `held` and promotes again
    /// once its hold has elapsed.
    pub async fn resolve_dispute(&self, escrow_id: &str) -> LedgerResult<bool> {
        let released = self
            .db
            .escrows()
            .resolve_dispute(escrow_id, self.clock.now())
            .await?;
        if released {
            info!(escrow_id = %escrow_id, "Dispute resolved, escrow unfrozen");
        }
        Ok(released)
    }

    /// Convenience for dispute resolutions that end in a refund: unfreezes
    /// and applies in one call.
    pub async fn resolve_dispute_with_refund(
        &self,
        escrow_id: &str,
        refund_request_id: &str,
        amount: Money,
    ) -> LedgerResult<RefundOutcome> {
        self.db
            .escrows()
            .resolve_dispute(escrow_id, self.clock.now())
            .await?;
        self.apply(escrow_id, refund_request_id, amount).await
    }

    /// Current instant, exposed so callers batching refunds can stamp
    /// related records consistently.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
