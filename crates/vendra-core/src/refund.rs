//! # Refund Adjustment
//!
//! Applies partial or full refunds against an escrow, proportionally
//! reversing commission and recording an adjustment transaction.
//!
//! ## Proportional Reversal
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Escrow: gross $100.00, commission $10.50, net $89.50                  │
//! │                                                                         │
//! │  Refund $40.00                                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  reversal = round2(10.50 × 40.00 / 100.00) = $4.20                     │
//! │                                                                         │
//! │  After:  refunded $40.00                                                │
//! │          commission exposure $10.50 − $4.20 = $6.30                     │
//! │          status PartiallyRefunded                                       │
//! │          + CommissionTransaction(RefundAdjustment, −$4.20)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This module is pure: de-duplication of refund request ids needs storage
//! and lives in the ledger crate. If the escrow was already included in a
//! Paid payout the adjustment still posts (it feeds future settlements) but
//! nothing claws back disbursed funds; that is a recorded policy decision.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{CommissionKind, CommissionTransaction, EscrowStatus, EscrowTransaction};

/// The result of applying one refund: the mutated escrow plus the negative
/// commission adjustment to append to the audit trail.
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub escrow: EscrowTransaction,
    pub adjustment: CommissionTransaction,
}

/// Applies a refund to an escrow, reversing commission proportionally.
///
/// `initial` must be the escrow's `Initial` commission transaction; the
/// reversal is computed from the commission actually recorded there (which
/// may have been clamped), so the audit trail always nets out exactly.
///
/// ## Errors
/// - `InvalidRefundAmount` for zero or negative amounts
/// - `RefundExceedsAvailable` when `amount > gross − refunded`
pub fn apply_refund(
    escrow: &EscrowTransaction,
    initial: &CommissionTransaction,
    refund_request_id: &str,
    amount: Money,
    now: DateTime<Utc>,
) -> CoreResult<RefundOutcome> {
    if !amount.is_positive() {
        return Err(CoreError::InvalidRefundAmount {
            escrow_id: escrow.id.clone(),
            amount_cents: amount.cents(),
        });
    }

    let available = escrow.available_for_refund();
    if amount > available {
        return Err(CoreError::RefundExceedsAvailable {
            escrow_id: escrow.id.clone(),
            requested_cents: amount.cents(),
            available_cents: available.cents(),
        });
    }

    // Proportional to the recorded commission, not a re-resolution: the
    // historical rate is what was charged, so it is what gets reversed.
    let reversal = initial.commission().proportion(amount, escrow.gross());

    let mut updated = escrow.clone();
    updated.refunded_cents += amount.cents();
    updated.commission_refunded_cents += reversal.cents();
    updated.status = if updated.refunded_cents < updated.gross_cents {
        EscrowStatus::PartiallyRefunded
    } else {
        EscrowStatus::ReturnedToBuyer
    };
    updated.updated_at = now;

    let adjustment = CommissionTransaction {
        id: Uuid::new_v4().to_string(),
        escrow_id: escrow.id.clone(),
        kind: CommissionKind::RefundAdjustment,
        basis_cents: amount.cents(),
        rate_bps: initial.rate_bps,
        fixed_fee_cents: initial.fixed_fee_cents,
        commission_cents: -reversal.cents(),
        source: initial.source,
        clamped: false,
        refund_request_id: Some(refund_request_id.to_string()),
        created_at: now,
    };

    Ok(RefundOutcome {
        escrow: updated,
        adjustment,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RateSource;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 20, 9, 0, 0).unwrap()
    }

    fn escrow() -> EscrowTransaction {
        let t = Utc.with_ymd_and_hms(2026, 3, 10, 14, 30, 0).unwrap();
        EscrowTransaction {
            id: "esc-1".into(),
            payment_id: "pay-1".into(),
            sub_order_id: "sub-1".into(),
            store_id: "store-1".into(),
            order_id: "ord-1".into(),
            currency: "USD".into(),
            gross_cents: 10_000,
            commission_cents: 1_050,
            net_cents: 8_950,
            refunded_cents: 0,
            commission_refunded_cents: 0,
            status: EscrowStatus::Held,
            eligible_at: t,
            payout_id: None,
            ordered_at: t,
            created_at: t,
            updated_at: t,
        }
    }

    fn initial_tx() -> CommissionTransaction {
        CommissionTransaction {
            id: "ctx-1".into(),
            escrow_id: "esc-1".into(),
            kind: CommissionKind::Initial,
            basis_cents: 10_000,
            rate_bps: 1_000,
            fixed_fee_cents: 50,
            commission_cents: 1_050,
            source: RateSource::Global,
            clamped: false,
            refund_request_id: None,
            created_at: now(),
        }
    }

    #[test]
    fn test_partial_refund_spec_scenario() {
        // gross $100.00, commission $10.50; refund $40.00 → reversal $4.20,
        // remaining exposure $6.30, status PartiallyRefunded
        let outcome = apply_refund(
            &escrow(),
            &initial_tx(),
            "ret-1",
            Money::from_cents(4_000),
            now(),
        )
        .unwrap();

        assert_eq!(outcome.adjustment.commission_cents, -420);
        assert_eq!(outcome.adjustment.kind, CommissionKind::RefundAdjustment);
        assert_eq!(outcome.adjustment.basis_cents, 4_000);
        assert_eq!(outcome.adjustment.refund_request_id.as_deref(), Some("ret-1"));

        let e = &outcome.escrow;
        assert_eq!(e.refunded_cents, 4_000);
        assert_eq!(e.commission_refunded_cents, 420);
        assert_eq!(e.status, EscrowStatus::PartiallyRefunded);
        // Remaining commission exposure: 10.50 − 4.20 = 6.30
        assert_eq!(e.commission_cents - e.commission_refunded_cents, 630);
    }

    #[test]
    fn test_half_refund_reverses_half_commission() {
        let outcome = apply_refund(
            &escrow(),
            &initial_tx(),
            "ret-1",
            Money::from_cents(5_000),
            now(),
        )
        .unwrap();
        assert_eq!(outcome.adjustment.commission_cents, -525);
    }

    #[test]
    fn test_full_refund_returns_to_buyer() {
        let outcome = apply_refund(
            &escrow(),
            &initial_tx(),
            "ret-1",
            Money::from_cents(10_000),
            now(),
        )
        .unwrap();

        assert_eq!(outcome.escrow.status, EscrowStatus::ReturnedToBuyer);
        assert_eq!(outcome.escrow.refunded_cents, 10_000);
        assert_eq!(outcome.adjustment.commission_cents, -1_050);
    }

    #[test]
    fn test_sequential_refunds_never_overshoot() {
        // Two $50.00 refunds: reversals 525 + 525 = 1050, exactly the
        // original commission.
        let first = apply_refund(
            &escrow(),
            &initial_tx(),
            "ret-1",
            Money::from_cents(5_000),
            now(),
        )
        .unwrap();
        let second = apply_refund(
            &first.escrow,
            &initial_tx(),
            "ret-2",
            Money::from_cents(5_000),
            now(),
        )
        .unwrap();

        assert_eq!(second.escrow.status, EscrowStatus::ReturnedToBuyer);
        assert_eq!(second.escrow.commission_refunded_cents, 1_050);
        assert_eq!(second.escrow.payable().cents(), 0);
    }

    #[test]
    fn test_refund_exceeding_available_rejected() {
        let mut e = escrow();
        e.refunded_cents = 6_000;
        e.status = EscrowStatus::PartiallyRefunded;

        let err = apply_refund(
            &e,
            &initial_tx(),
            "ret-2",
            Money::from_cents(5_000),
            now(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::RefundExceedsAvailable {
                requested_cents: 5_000,
                available_cents: 4_000,
                ..
            }
        ));
    }

    #[test]
    fn test_non_positive_refund_rejected() {
        let err = apply_refund(&escrow(), &initial_tx(), "ret-1", Money::zero(), now())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRefundAmount { .. }));
    }
}
