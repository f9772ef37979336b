//! # Escrow Allocation
//!
//! Splits a confirmed payment into one escrow record per seller sub-order,
//! each carrying gross/commission/net amounts and an `Initial` commission
//! audit transaction.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Escrow Allocation                                   │
//! │                                                                         │
//! │  Payment ($250.00, confirmed)                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌──────────────┬──────────────┬──────────────┐                        │
//! │  │ SubOrder A   │ SubOrder B   │ SubOrder C   │   (one per seller)     │
//! │  │ $100.00      │ $90.00       │ $60.00       │                        │
//! │  └──────┬───────┴──────┬───────┴──────┬───────┘                        │
//! │         ▼              ▼              ▼                                 │
//! │  Escrow(gross,    Escrow(...)    Escrow(...)                           │
//! │   commission,                                                           │
//! │   net, Held)                                                            │
//! │         │                                                               │
//! │         └── + CommissionTransaction(Initial) each                       │
//! │                                                                         │
//! │  INVARIANT: Σ escrow.gross == payment.amount, exactly.                 │
//! │  A mismatch is a reconciliation bug → AllocationMismatch, fatal.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This module is pure: it validates, computes, and returns the rows to
//! persist. Idempotency (duplicate-allocation detection) needs storage and
//! lives in the ledger crate.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commission::{CommissionPolicy, ResolvedCommission};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{
    CommissionKind, CommissionTransaction, EscrowStatus, EscrowTransaction, Payment, SubOrder,
};

// =============================================================================
// Rate Policy
// =============================================================================

/// How to commission a sub-order whose lines span multiple categories.
///
/// The source system left this unspecified; it is an explicit policy
/// parameter rather than an assumption baked into the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryRatePolicy {
    /// Resolve each order line against its own category and sum the
    /// resulting commissions. Shipping resolves through the seller/global
    /// chain (no category). Default.
    #[default]
    PerItem,
    /// Resolve the whole gross against the category with the largest line
    /// subtotal (blended rate).
    DominantCategory,
}

/// The rows produced for one sub-order: the escrow plus its `Initial`
/// commission audit transaction.
#[derive(Debug, Clone)]
pub struct AllocationPlan {
    pub escrow: EscrowTransaction,
    pub initial_commission: CommissionTransaction,
}

// =============================================================================
// Allocation
// =============================================================================

/// Splits a confirmed payment into per-seller escrows.
///
/// ## Errors
/// - `PaymentNotConfirmed` before payment capture
/// - `NoSubOrders` when there is nothing to allocate
/// - `ConfigurationMissing` when no commission config covers a sale context
/// - `AllocationMismatch` when `Σ gross != payment.amount` (fatal; callers
///   must not persist anything for this payment)
///
/// `eligible_at` starts at `confirmed_at + hold_days`; delivery confirmation
/// re-anchors it later (see the escrow repository's `record_delivery`).
pub fn allocate(
    payment: &Payment,
    sub_orders: &[SubOrder],
    policy: &CommissionPolicy,
    rate_policy: CategoryRatePolicy,
    hold_days: i64,
) -> CoreResult<Vec<AllocationPlan>> {
    if !payment.is_confirmed() {
        return Err(CoreError::PaymentNotConfirmed {
            payment_id: payment.id.clone(),
        });
    }
    if sub_orders.is_empty() {
        return Err(CoreError::NoSubOrders {
            payment_id: payment.id.clone(),
        });
    }

    // Safe: is_confirmed() checked above.
    let confirmed_at = payment.confirmed_at.ok_or(CoreError::PaymentNotConfirmed {
        payment_id: payment.id.clone(),
    })?;

    // Reconciliation first: refuse to compute commissions on amounts that
    // don't add up to the captured payment.
    let allocated: Money = sub_orders.iter().map(SubOrder::gross).sum();
    if allocated != payment.amount() {
        return Err(CoreError::AllocationMismatch {
            payment_id: payment.id.clone(),
            allocated_cents: allocated.cents(),
            payment_cents: payment.amount().cents(),
        });
    }

    let mut plans = Vec::with_capacity(sub_orders.len());
    for sub in sub_orders {
        let gross = sub.gross();
        let (commission, recorded) =
            commission_for_sub_order(sub, gross, policy, rate_policy, confirmed_at)?;
        let net = gross - commission;

        let escrow_id = Uuid::new_v4().to_string();
        let escrow = EscrowTransaction {
            id: escrow_id.clone(),
            payment_id: payment.id.clone(),
            sub_order_id: sub.id.clone(),
            store_id: sub.store_id.clone(),
            order_id: sub.order_id.clone(),
            currency: payment.currency.clone(),
            gross_cents: gross.cents(),
            commission_cents: commission.cents(),
            net_cents: net.cents(),
            refunded_cents: 0,
            commission_refunded_cents: 0,
            status: EscrowStatus::Held,
            eligible_at: confirmed_at + Duration::days(hold_days),
            payout_id: None,
            ordered_at: sub.ordered_at,
            created_at: confirmed_at,
            updated_at: confirmed_at,
        };

        let initial_commission = CommissionTransaction {
            id: Uuid::new_v4().to_string(),
            escrow_id,
            kind: CommissionKind::Initial,
            basis_cents: gross.cents(),
            rate_bps: recorded.rate.rate.bps() as i64,
            fixed_fee_cents: recorded.rate.fixed_fee.cents(),
            commission_cents: commission.cents(),
            source: recorded.source,
            clamped: recorded.clamped,
            refund_request_id: None,
            created_at: confirmed_at,
        };

        plans.push(AllocationPlan {
            escrow,
            initial_commission,
        });
    }

    Ok(plans)
}

/// Computes the commission for one sub-order under the given rate policy.
///
/// Returns the total commission plus the resolution recorded on the audit
/// row. Under `PerItem` with mixed categories the recorded rate is the
/// dominant line's resolution; the commission amount itself is always the
/// exact sum, so the audit trail reconciles to the cent regardless.
fn commission_for_sub_order(
    sub: &SubOrder,
    gross: Money,
    policy: &CommissionPolicy,
    rate_policy: CategoryRatePolicy,
    at: chrono::DateTime<chrono::Utc>,
) -> CoreResult<(Money, ResolvedCommission)> {
    let dominant_category = sub
        .lines
        .iter()
        .max_by_key(|l| l.line_total_cents)
        .map(|l| l.category_id.as_str());

    match rate_policy {
        CategoryRatePolicy::DominantCategory => {
            let resolved = policy.resolve(&sub.store_id, dominant_category, gross, at)?;
            Ok((resolved.commission, resolved))
        }
        CategoryRatePolicy::PerItem => {
            let mut total = Money::zero();
            let mut recorded: Option<ResolvedCommission> = None;
            let mut any_clamped = false;

            for line in &sub.lines {
                let resolved = policy.resolve(
                    &sub.store_id,
                    Some(&line.category_id),
                    line.line_total(),
                    at,
                )?;
                total += resolved.commission;
                any_clamped |= resolved.clamped;
                // Record the dominant line's resolution on the audit row.
                if dominant_category == Some(line.category_id.as_str()) && recorded.is_none() {
                    recorded = Some(resolved);
                }
            }

            let shipping = Money::from_cents(sub.shipping_cents);
            if shipping.is_positive() {
                let resolved = policy.resolve(&sub.store_id, None, shipping, at)?;
                total += resolved.commission;
                any_clamped |= resolved.clamped;
                if recorded.is_none() {
                    recorded = Some(resolved);
                }
            }

            // A sub-order with no lines and no shipping commissions nothing;
            // resolve anyway so a missing config still surfaces.
            let mut recorded = match recorded {
                Some(r) => r,
                None => policy.resolve(&sub.store_id, dominant_category, gross, at)?,
            };
            recorded.clamped = any_clamped;

            // Per-line clamps bound each component by its basis, so the sum
            // never exceeds gross.
            debug_assert!(total <= gross);

            Ok((total, recorded))
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
