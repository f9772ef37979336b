//! # Pipeline Configuration
//!
//! Platform-level knobs for the settlement pipeline. Per-store payout
//! settings live in the database (`store_payout_configs`); this struct only
//! carries what applies to every store.

use vendra_core::allocation::CategoryRatePolicy;
use vendra_core::DEFAULT_HOLD_DAYS;

/// Platform configuration for the pipeline services.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Escrow hold period after confirmation/delivery, in days.
    pub hold_days: i64,
    /// How mixed-category sub-orders are commissioned.
    pub rate_policy: CategoryRatePolicy,
    /// ISO 4217 code this deployment settles in. Payments in any other
    /// currency are rejected at allocation; every persisted amount is in
    /// this currency.
    pub currency: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            hold_days: DEFAULT_HOLD_DAYS,
            rate_policy: CategoryRatePolicy::default(),
            currency: "USD".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Sets the escrow hold period.
    pub fn hold_days(mut self, days: i64) -> Self {
        self.hold_days = days;
        self
    }

    /// Sets the mixed-category commission policy.
    pub fn rate_policy(mut self, policy: CategoryRatePolicy) -> Self {
        self.rate_policy = policy;
        self
    }

    /// Sets the settlement currency.
    pub fn currency(mut self, code: impl Into<String>) -> Self {
        self.currency = code.into();
        self
    }
}
