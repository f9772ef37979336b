//! # Commission Resolver
//!
//! Resolves the applicable commission rate for a sale context from the
//! three-tier override chain and computes the commission amount.
//!
//! ## Override Chain
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Commission Resolution                                │
//! │                                                                         │
//! │  resolve(seller, category, gross, at)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. Category override in effect at `at`?  ──yes──► use it              │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │  2. Seller override in effect at `at`?    ──yes──► use it              │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │  3. Global config in effect at `at`?      ──yes──► use it              │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │  ConfigurationMissing                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reproducibility
//! `CommissionPolicy` is an immutable snapshot; resolution is a pure function
//! over it. Callers persist the resolved rate alongside the commission
//! transaction so later config changes never retroactively alter history.
//! Config rows are effective-dated (`effective_from`/`effective_to`) instead
//! of a mutable "is active" flag, so two configs can never race for the same
//! instant: the latest `effective_from` wins deterministically.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, RateBps};
use crate::types::RateSource;

// =============================================================================
// Rate Sources
// =============================================================================

/// A commission rate: percentage (basis points) plus a fixed fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRate {
    pub rate: RateBps,
    pub fixed_fee: Money,
}

impl CommissionRate {
    pub const fn new(rate: RateBps, fixed_fee: Money) -> Self {
        CommissionRate { rate, fixed_fee }
    }
}

/// An effective-dated commission configuration entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionConfig {
    pub rate: CommissionRate,
    pub effective_from: DateTime<Utc>,
    /// Open-ended when `None`.
    pub effective_to: Option<DateTime<Utc>>,
}

impl CommissionConfig {
    /// Whether this config covers the instant `at`.
    pub fn in_effect(&self, at: DateTime<Utc>) -> bool {
        self.effective_from <= at && self.effective_to.map_or(true, |to| at < to)
    }
}

// =============================================================================
// Policy Snapshot
// =============================================================================

/// Immutable snapshot of all commission configuration, keyed by tier.
///
/// Built by the config repository for a given instant and handed to the
/// allocator; the resolver itself never touches storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommissionPolicy {
    global: Vec<CommissionConfig>,
    category: HashMap<String, Vec<CommissionConfig>>,
    seller: HashMap<String, Vec<CommissionConfig>>,
}

/// The outcome of one commission resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCommission {
    /// The rate that was applied, frozen for the audit trail.
    pub rate: CommissionRate,
    /// The computed commission, clamped to the gross amount.
    pub commission: Money,
    pub source: RateSource,
    /// True when the raw commission exceeded gross and was clamped.
    pub clamped: bool,
}

impl CommissionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a platform-wide default config.
    pub fn with_global(mut self, config: CommissionConfig) -> Self {
        self.global.push(config);
        self
    }

    /// Adds a category-level override (highest precedence).
    pub fn with_category_override(mut self, category_id: &str, config: CommissionConfig) -> Self {
        self.category
            .entry(category_id.to_string())
            .or_default()
            .push(config);
        self
    }

    /// Adds a seller-specific override.
    pub fn with_seller_override(mut self, seller_id: &str, config: CommissionConfig) -> Self {
        self.seller
            .entry(seller_id.to_string())
            .or_default()
            .push(config);
        self
    }

    /// Picks the config in effect at `at` from a candidate list.
    /// When several overlap, the latest `effective_from` wins.
    fn pick(configs: &[CommissionConfig], at: DateTime<Utc>) -> Option<&CommissionConfig> {
        configs
            .iter()
            .filter(|c| c.in_effect(at))
            .max_by_key(|c| c.effective_from)
    }

    /// Resolves the applicable rate for a sale context.
    ///
    /// Lookup order: category override → seller override → global. First
    /// tier with a config in effect wins.
    pub fn resolve_rate(
        &self,
        seller_id: &str,
        category_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> CoreResult<(CommissionRate, RateSource)> {
        if let Some(cat) = category_id {
            if let Some(config) = self.category.get(cat).and_then(|c| Self::pick(c, at)) {
                return Ok((config.rate, RateSource::CategoryOverride));
            }
        }

        if let Some(config) = self.seller.get(seller_id).and_then(|c| Self::pick(c, at)) {
            return Ok((config.rate, RateSource::SellerOverride));
        }

        if let Some(config) = Self::pick(&self.global, at) {
            return Ok((config.rate, RateSource::Global));
        }

        Err(CoreError::ConfigurationMissing {
            seller_id: seller_id.to_string(),
        })
    }

    /// Resolves and computes the commission for a gross amount.
    ///
    /// `commission = round2(gross × rate) + fixed_fee`, rounded half away
    /// from zero, clamped to `gross` (never more than the sale itself). The
    /// `clamped` flag records when clamping occurred so the audit trail can
    /// surface mispriced configs.
    pub fn resolve(
        &self,
        seller_id: &str,
        category_id: Option<&str>,
        gross: Money,
        at: DateTime<Utc>,
    ) -> CoreResult<ResolvedCommission> {
        let (rate, source) = self.resolve_rate(seller_id, category_id, at)?;
        let raw = rate.rate.apply(gross) + rate.fixed_fee;

        let clamped = raw > gross;
        let commission = if clamped { gross } else { raw };

        Ok(ResolvedCommission {
            rate,
            commission,
            source,
            clamped,
        })
    }

    /// Like [`resolve`](Self::resolve), but a commission that exceeds gross
    /// is `CommissionExceedsGross` instead of being clamped.
    ///
    /// For callers validating config changes (an operator previewing a new
    /// rate) where a clamp means the config is mispriced and must not be
    /// accepted silently.
    pub fn resolve_strict(
        &self,
        seller_id: &str,
        category_id: Option<&str>,
        gross: Money,
        at: DateTime<Utc>,
    ) -> CoreResult<ResolvedCommission> {
        let resolved = self.resolve(seller_id, category_id, gross, at)?;
        if resolved.clamped {
            let raw = resolved.rate.rate.apply(gross) + resolved.rate.fixed_fee;
            return Err(CoreError::CommissionExceedsGross {
                commission_cents: raw.cents(),
                gross_cents: gross.cents(),
            });
        }
        Ok(resolved)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 10, 0, 0).unwrap()
    }

    fn open_config(bps: u32, fixed_cents: i64) -> CommissionConfig {
        CommissionConfig {
            rate: CommissionRate::new(RateBps::from_bps(bps), Money::from_cents(fixed_cents)),
            effective_from: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            effective_to: None,
        }
    }

    #[test]
    fn test_spec_scenario_ten_percent_plus_fixed() {
        // gross=$100.00, 10% + $0.50 fixed → commission $10.50
        let policy = CommissionPolicy::new().with_global(open_config(1_000, 50));
        let resolved = policy
            .resolve("seller-1", None, Money::from_cents(10_000), at())
            .unwrap();

        assert_eq!(resolved.commission.cents(), 1_050);
        assert_eq!(resolved.source, RateSource::Global);
        assert!(!resolved.clamped);
    }

    #[test]
    fn test_precedence_category_beats_seller_beats_global() {
        let policy = CommissionPolicy::new()
            .with_global(open_config(1_000, 0))
            .with_seller_override("seller-1", open_config(800, 0))
            .with_category_override("electronics", open_config(500, 0));

        // Category override wins when present
        let r = policy
            .resolve("seller-1", Some("electronics"), Money::from_cents(10_000), at())
            .unwrap();
        assert_eq!(r.source, RateSource::CategoryOverride);
        assert_eq!(r.commission.cents(), 500);

        // No category match → seller override
        let r = policy
            .resolve("seller-1", Some("books"), Money::from_cents(10_000), at())
            .unwrap();
        assert_eq!(r.source, RateSource::SellerOverride);
        assert_eq!(r.commission.cents(), 800);

        // Unknown seller, no category → global
        let r = policy
            .resolve("seller-2", None, Money::from_cents(10_000), at())
            .unwrap();
        assert_eq!(r.source, RateSource::Global);
        assert_eq!(r.commission.cents(), 1_000);
    }

    #[test]
    fn test_missing_configuration() {
        let policy = CommissionPolicy::new();
        let err = policy
            .resolve("seller-1", None, Money::from_cents(10_000), at())
            .unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationMissing { .. }));
    }

    #[test]
    fn test_effective_dating() {
        let old = CommissionConfig {
            rate: CommissionRate::new(RateBps::from_bps(2_000), Money::zero()),
            effective_from: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            effective_to: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
        };
        let current = open_config(1_000, 0);
        let policy = CommissionPolicy::new().with_global(old).with_global(current);

        // At a 2025 instant the expired config applies
        let past = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let r = policy.resolve("s", None, Money::from_cents(1_000), past).unwrap();
        assert_eq!(r.rate.rate.bps(), 2_000);

        // At a 2026 instant the open-ended config applies
        let r = policy.resolve("s", None, Money::from_cents(1_000), at()).unwrap();
        assert_eq!(r.rate.rate.bps(), 1_000);
    }

    #[test]
    fn test_overlapping_configs_latest_effective_from_wins() {
        let early = open_config(1_000, 0);
        let mut late = open_config(1_500, 0);
        late.effective_from = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();

        let policy = CommissionPolicy::new().with_global(early).with_global(late);
        let r = policy.resolve("s", None, Money::from_cents(1_000), at()).unwrap();
        assert_eq!(r.rate.rate.bps(), 1_500);
    }

    #[test]
    fn test_commission_clamped_to_gross() {
        // 50% + $5.00 fixed on a $1.00 sale would be $5.50 — clamp to $1.00
        let policy = CommissionPolicy::new().with_global(open_config(5_000, 500));
        let r = policy.resolve("s", None, Money::from_cents(100), at()).unwrap();

        assert_eq!(r.commission.cents(), 100);
        assert!(r.clamped);
    }

    #[test]
    fn test_strict_resolve_rejects_instead_of_clamping() {
        let policy = CommissionPolicy::new().with_global(open_config(5_000, 500));

        let err = policy
            .resolve_strict("s", None, Money::from_cents(100), at())
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::CommissionExceedsGross {
                commission_cents: 550,
                gross_cents: 100,
            }
        ));

        // Sanely priced sales resolve identically in both modes
        let r = policy
            .resolve_strict("s", None, Money::from_cents(10_000), at())
            .unwrap();
        assert_eq!(r.commission.cents(), 5_500);
        assert!(!r.clamped);
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        // $0.25 at 10% = $0.025 → $0.03
        let policy = CommissionPolicy::new().with_global(open_config(1_000, 0));
        let r = policy.resolve("s", None, Money::from_cents(25), at()).unwrap();
        assert_eq!(r.commission.cents(), 3);
    }
}
