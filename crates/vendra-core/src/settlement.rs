//! # Settlement Math
//!
//! Pure aggregation and versioning rules for per-store, per-period
//! settlement reports. The builder in vendra-ledger owns the storage side
//! (sums from the ledger tables, the conditional supersede update); this
//! module owns the arithmetic and the state machine.
//!
//! ## Versioning
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  build(store, period)        build(store, period) again                │
//! │        │                              │                                 │
//! │        ▼                              ▼                                 │
//! │  ┌───────────┐   supersedes   ┌───────────┐                            │
//! │  │ v1 Draft  │◄───────────────│ v2 Draft  │                            │
//! │  │ current ✔ │   v1: current ✘│ current ✔ │                            │
//! │  └───────────┘   status →     └───────────┘                            │
//! │                  Superseded                                             │
//! │                                                                         │
//! │  Prior versions are retained forever; corrections are new versions,    │
//! │  never edits (audit requirement).                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Settlement, SettlementStatus};

// =============================================================================
// Totals
// =============================================================================

/// The four aggregates a settlement reconciles.
///
/// Invariant: `net = gross_sales − refunds − commission + adjustments`,
/// exact integer arithmetic, no intermediate rounding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTotals {
    /// Sum of escrow gross for sub-orders ordered in the period.
    pub gross_sales: Money,
    /// Sum of refund amounts posted in the period (positive).
    pub refunds: Money,
    /// Net commission in the period: initial charges plus (negative)
    /// refund adjustments.
    pub commission: Money,
    /// Sum of manual adjustments tagged to the period (signed).
    pub adjustments: Money,
}

impl SettlementTotals {
    /// The seller's net payable for the period.
    pub fn net(&self) -> Money {
        self.gross_sales - self.refunds - self.commission + self.adjustments
    }
}

// =============================================================================
// Building & Transitions
// =============================================================================

/// Constructs the next settlement version for (store, period).
///
/// `previous` is the current version, if one exists. A `Finalized` previous
/// version blocks regeneration unless `force` is set (admin override path):
/// a finalized report may already have been sent or reconciled externally,
/// and silently invalidating it is worse than failing.
pub fn build_settlement(
    store_id: &str,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    totals: SettlementTotals,
    previous: Option<&Settlement>,
    force: bool,
    now: DateTime<Utc>,
) -> CoreResult<Settlement> {
    if let Some(prev) = previous {
        if prev.status == SettlementStatus::Finalized && !force {
            return Err(CoreError::SettlementAlreadyFinalized {
                settlement_id: prev.id.clone(),
            });
        }
    }

    Ok(Settlement {
        id: Uuid::new_v4().to_string(),
        store_id: store_id.to_string(),
        period_start,
        period_end,
        version: previous.map_or(1, |p| p.version + 1),
        is_current_version: true,
        status: SettlementStatus::Draft,
        gross_sales_cents: totals.gross_sales.cents(),
        refunds_cents: totals.refunds.cents(),
        commission_cents: totals.commission.cents(),
        adjustments_cents: totals.adjustments.cents(),
        net_cents: totals.net().cents(),
        previous_settlement_id: previous.map(|p| p.id.clone()),
        created_at: now,
        finalized_at: None,
    })
}

/// One-way Draft → Finalized transition (admin action).
///
/// Superseded and already-finalized settlements reject the transition; the
/// state machine has no path out of `Superseded`.
pub fn finalize(settlement: &Settlement, now: DateTime<Utc>) -> CoreResult<Settlement> {
    if settlement.status != SettlementStatus::Draft {
        return Err(CoreError::InvalidSettlementTransition {
            settlement_id: settlement.id.clone(),
            status: settlement.status.to_string(),
        });
    }

    let mut finalized = settlement.clone();
    finalized.status = SettlementStatus::Finalized;
    finalized.finalized_at = Some(now);
    Ok(finalized)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn period() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap(),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 2, 0, 0).unwrap()
    }

    fn totals() -> SettlementTotals {
        SettlementTotals {
            gross_sales: Money::from_cents(100_000),
            refunds: Money::from_cents(4_000),
            commission: Money::from_cents(10_080), // 10_500 initial − 420 reversed
            adjustments: Money::from_cents(-500),
        }
    }

    #[test]
    fn test_net_identity() {
        // 1000.00 − 40.00 − 100.80 + (−5.00) = 854.20
        assert_eq!(totals().net().cents(), 85_420);
    }

    #[test]
    fn test_first_build_is_version_one() {
        let (start, end) = period();
        let s = build_settlement("store-1", start, end, totals(), None, false, now()).unwrap();

        assert_eq!(s.version, 1);
        assert!(s.is_current_version);
        assert_eq!(s.status, SettlementStatus::Draft);
        assert_eq!(s.net_cents, 85_420);
        assert!(s.previous_settlement_id.is_none());
        // Persisted columns satisfy the reconciliation identity
        assert_eq!(
            s.net_cents,
            s.gross_sales_cents - s.refunds_cents - s.commission_cents + s.adjustments_cents
        );
    }

    #[test]
    fn test_rebuild_bumps_version_and_links() {
        let (start, end) = period();
        let v1 = build_settlement("store-1", start, end, totals(), None, false, now()).unwrap();
        let v2 =
            build_settlement("store-1", start, end, totals(), Some(&v1), false, now()).unwrap();

        assert_eq!(v2.version, 2);
        assert_eq!(v2.previous_settlement_id.as_deref(), Some(v1.id.as_str()));
        // Same inputs → same net, up to the version bump
        assert_eq!(v2.net_cents, v1.net_cents);
    }

    #[test]
    fn test_finalized_blocks_rebuild_unless_forced() {
        let (start, end) = period();
        let v1 = build_settlement("store-1", start, end, totals(), None, false, now()).unwrap();
        let v1 = finalize(&v1, now()).unwrap();

        let err = build_settlement("store-1", start, end, totals(), Some(&v1), false, now())
            .unwrap_err();
        assert!(matches!(err, CoreError::SettlementAlreadyFinalized { .. }));

        // The admin override path proceeds
        let v2 =
            build_settlement("store-1", start, end, totals(), Some(&v1), true, now()).unwrap();
        assert_eq!(v2.version, 2);
    }

    #[test]
    fn test_finalize_is_one_way() {
        let (start, end) = period();
        let s = build_settlement("store-1", start, end, totals(), None, false, now()).unwrap();

        let finalized = finalize(&s, now()).unwrap();
        assert_eq!(finalized.status, SettlementStatus::Finalized);
        assert!(finalized.finalized_at.is_some());

        // Finalizing twice is a transition violation
        let err = finalize(&finalized, now()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSettlementTransition { .. }));
    }

    #[test]
    fn test_nothing_leaves_superseded() {
        let (start, end) = period();
        let mut s = build_settlement("store-1", start, end, totals(), None, false, now()).unwrap();
        s.status = SettlementStatus::Superseded;
        s.is_current_version = false;

        assert!(finalize(&s, now()).is_err());
    }
}
