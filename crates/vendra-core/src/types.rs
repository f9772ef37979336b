//! # Domain Types
//!
//! Core domain types for the Vendra settlement ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │     Payment      │   │ EscrowTransaction│   │      Payout      │    │
//! │  │  ──────────────  │   │  ──────────────  │   │  ──────────────  │    │
//! │  │  id (UUID)       │──►│  payment_id (FK) │◄──│  escrow.payout_id│    │
//! │  │  amount_cents    │   │  gross/comm/net  │   │  total_cents     │    │
//! │  │  confirmed_at    │   │  status          │   │  retry bookkeeping│   │
//! │  └──────────────────┘   └────────┬─────────┘   └──────────────────┘    │
//! │                                  │                                      │
//! │                         ┌────────▼─────────┐   ┌──────────────────┐    │
//! │                         │CommissionTransact│   │    Settlement    │    │
//! │                         │  append-only     │   │  versioned report│    │
//! │                         │  audit trail     │   │  + Items + Adjs  │    │
//! │                         └──────────────────┘   └──────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Conventions
//! - Every entity has a UUID v4 `id` stored as TEXT
//! - All monetary columns are raw cents (`i64`); `Money` accessors are
//!   provided for calculations
//! - Foreign keys are explicit id references, never embedded object graphs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Collaborator Inputs (read-only contract)
// =============================================================================

/// Lifecycle of a payment as reported by the payment-capture collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Authorization exists but funds are not captured.
    Pending,
    /// Funds captured; the amount is ground truth for allocation.
    Confirmed,
}

/// A confirmed (or pending) buyer payment, supplied by the payment-capture
/// collaborator. The ledger trusts `amount_cents` as ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    /// Captured amount in cents.
    pub amount_cents: i64,
    /// ISO 4217 currency code.
    pub currency: String,
    pub status: PaymentStatus,
    /// When the payment was captured. `None` until confirmed.
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Returns the captured amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// Whether the payment has been captured.
    pub fn is_confirmed(&self) -> bool {
        self.status == PaymentStatus::Confirmed && self.confirmed_at.is_some()
    }
}

/// One line of a seller sub-order, supplied by the order collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    /// Category the item was sold under; drives commission overrides.
    pub category_id: String,
    /// Line total (unit price × quantity) in cents.
    pub line_total_cents: i64,
}

impl OrderLine {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

/// The seller-specific portion of a multi-vendor order.
///
/// Supplied read-only by the order collaborator; the ledger never mutates
/// order data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubOrder {
    pub id: String,
    pub order_id: String,
    /// The seller's store.
    pub store_id: String,
    /// Items belonging to this seller.
    pub lines: Vec<OrderLine>,
    /// Shipping charged for this seller's parcel, in cents.
    pub shipping_cents: i64,
    /// When the buyer placed the order (settlement period bucketing).
    pub ordered_at: DateTime<Utc>,
}

impl SubOrder {
    /// Gross amount for this sub-order: item subtotals plus shipping.
    pub fn gross(&self) -> Money {
        let items: Money = self.lines.iter().map(OrderLine::line_total).sum();
        items + Money::from_cents(self.shipping_cents)
    }
}

// =============================================================================
// Escrow
// =============================================================================

/// Lifecycle of an escrow transaction.
///
/// ```text
///  Held ──► EligibleForPayout ──► Released            (happy path)
///   │              │
///   │              ├──► PartiallyRefunded ──► Released / ReturnedToBuyer
///   │              │
///   └──► InDispute (funds frozen until the dispute resolves)
///
///  ReturnedToBuyer and Released are terminal.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Funds held; eligibility timer has not elapsed.
    Held,
    /// Hold period passed; awaiting inclusion in a payout.
    EligibleForPayout,
    /// Paid out to the seller. Terminal.
    Released,
    /// Fully refunded to the buyer. Terminal.
    ReturnedToBuyer,
    /// Frozen pending a return/complaint decision.
    InDispute,
    /// Partially refunded; the remainder is still payable.
    PartiallyRefunded,
}

impl EscrowStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowStatus::Released | EscrowStatus::ReturnedToBuyer)
    }
}

/// Funds held on behalf of one seller for one (payment, sub-order) pair.
///
/// Invariant: `net_cents = gross_cents − commission_cents`, always, to the
/// cent. Refunds are tracked separately in `refunded_cents` and
/// `commission_refunded_cents` so the original allocation stays auditable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct EscrowTransaction {
    pub id: String,
    /// The payment that funded this escrow (owner).
    pub payment_id: String,
    /// The seller sub-order this escrow covers. UNIQUE with payment_id.
    pub sub_order_id: String,
    pub store_id: String,
    pub order_id: String,
    /// ISO 4217 code copied from the funding payment.
    pub currency: String,
    /// Gross amount: item subtotals + shipping for this seller.
    pub gross_cents: i64,
    /// Commission recorded at allocation time.
    pub commission_cents: i64,
    /// Net = gross − commission.
    pub net_cents: i64,
    /// Running total refunded to the buyer.
    pub refunded_cents: i64,
    /// Running total of commission reversed by refunds (positive).
    pub commission_refunded_cents: i64,
    pub status: EscrowStatus,
    /// When the escrow becomes eligible for payout.
    pub eligible_at: DateTime<Utc>,
    /// The payout that claimed this escrow, if any (reference, not owner).
    pub payout_id: Option<String>,
    /// When the buyer placed the underlying order.
    pub ordered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EscrowTransaction {
    #[inline]
    pub fn gross(&self) -> Money {
        Money::from_cents(self.gross_cents)
    }

    #[inline]
    pub fn commission(&self) -> Money {
        Money::from_cents(self.commission_cents)
    }

    #[inline]
    pub fn net(&self) -> Money {
        Money::from_cents(self.net_cents)
    }

    #[inline]
    pub fn refunded(&self) -> Money {
        Money::from_cents(self.refunded_cents)
    }

    /// The unrefunded remainder available for further refunds.
    pub fn available_for_refund(&self) -> Money {
        self.gross() - self.refunded()
    }

    /// What the seller is still owed from this escrow:
    /// `net − refunded + commission reversed`.
    ///
    /// A refund returns gross cents to the buyer but also reverses the
    /// platform's commission on that portion, so the seller's payable only
    /// shrinks by the refund net of the reversal.
    pub fn payable(&self) -> Money {
        self.net() - self.refunded() + Money::from_cents(self.commission_refunded_cents)
    }
}

// =============================================================================
// Commission Audit Trail
// =============================================================================

/// What kind of calculation a commission transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CommissionKind {
    /// The commission computed at allocation time.
    Initial,
    /// A proportional reversal emitted by a refund. Amount is negative.
    RefundAdjustment,
}

/// Which tier of the override chain supplied the rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    /// A category-level override (highest precedence).
    CategoryOverride,
    /// A seller-specific override.
    SellerOverride,
    /// The platform-wide default.
    Global,
}

/// Immutable audit record of one commission calculation.
///
/// Append-only: never updated after creation. The resolved rate is copied
/// here so later config changes cannot retroactively alter history. One
/// escrow has one `Initial` transaction plus N `RefundAdjustment`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CommissionTransaction {
    pub id: String,
    pub escrow_id: String,
    pub kind: CommissionKind,
    /// The amount the calculation applied to: escrow gross for `Initial`,
    /// refund amount for `RefundAdjustment`.
    pub basis_cents: i64,
    /// Resolved percentage in basis points, frozen at calculation time.
    pub rate_bps: i64,
    /// Resolved fixed fee, frozen at calculation time.
    pub fixed_fee_cents: i64,
    /// Resulting commission. Negative for refund adjustments.
    pub commission_cents: i64,
    pub source: RateSource,
    /// True when the commission was clamped to the gross amount.
    pub clamped: bool,
    /// Originating refund request; UNIQUE, used for refund de-duplication.
    pub refund_request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CommissionTransaction {
    #[inline]
    pub fn commission(&self) -> Money {
        Money::from_cents(self.commission_cents)
    }
}

// =============================================================================
// Payout
// =============================================================================

/// Lifecycle of a payout instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// Created by the aggregator; waiting for its scheduled date.
    Scheduled,
    /// Handed to the payment rail; awaiting the result.
    Processing,
    /// Funds transferred. Terminal.
    Paid,
    /// Rail reported failure. Retryable until attempts are exhausted.
    Failed,
}

/// One payment instruction aggregating N eligible escrows for one store.
///
/// Invariant: an escrow belongs to at most one non-failed payout at a time
/// (enforced by the conditional claim on `escrow_transactions.payout_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payout {
    pub id: String,
    pub store_id: String,
    /// Sum of the claimed escrows' payable amounts.
    pub total_cents: i64,
    pub status: PayoutStatus,
    /// When the transfer should be attempted, per the store's schedule.
    pub scheduled_date: DateTime<Utc>,
    /// Failed attempts so far.
    pub retry_count: i64,
    /// Retry budget before the payout requires manual intervention.
    pub max_retry_attempts: i64,
    /// Next automatic retry, exponential backoff. `None` once exhausted.
    pub next_retry_date: Option<DateTime<Utc>>,
    /// Reference id reported by the payment rail on success.
    pub provider_reference: Option<String>,
    /// Last rail error message, for diagnostics.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payout {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Whether a failed payout still has automatic retries left.
    pub fn can_retry(&self) -> bool {
        self.status == PayoutStatus::Failed && self.retry_count < self.max_retry_attempts
    }
}

/// How often a store is paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PayoutFrequency {
    /// `payout_day` is a day of week, 0 = Monday .. 6 = Sunday.
    Weekly,
    /// `payout_day` is a day of month, clamped to the month's length.
    Monthly,
}

/// Per-store payout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StorePayoutConfig {
    pub store_id: String,
    /// Balances below this roll over to the next cycle.
    pub minimum_payout_threshold_cents: i64,
    pub frequency: PayoutFrequency,
    /// Day-of-week (weekly) or day-of-month (monthly); see `PayoutFrequency`.
    pub payout_day: i64,
    pub max_retry_attempts: i64,
    /// Base delay for exponential retry backoff, in hours.
    pub retry_base_hours: i64,
}

impl StorePayoutConfig {
    /// Platform defaults for stores that have not configured payouts yet:
    /// $25.00 threshold, weekly on Monday, 3 retries, 24h backoff base.
    pub fn default_for(store_id: &str) -> Self {
        StorePayoutConfig {
            store_id: store_id.to_string(),
            minimum_payout_threshold_cents: 2_500,
            frequency: PayoutFrequency::Weekly,
            payout_day: 0,
            max_retry_attempts: 3,
            retry_base_hours: 24,
        }
    }

    #[inline]
    pub fn minimum_payout_threshold(&self) -> Money {
        Money::from_cents(self.minimum_payout_threshold_cents)
    }
}

// =============================================================================
// Settlement
// =============================================================================

/// Lifecycle of a settlement report.
///
/// ```text
///  Draft ──► Finalized          (one-way, admin action)
///    │           │
///    └───────────┴──► Superseded (by a newer build; nothing leaves it)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Draft,
    Finalized,
    Superseded,
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SettlementStatus::Draft => "draft",
            SettlementStatus::Finalized => "finalized",
            SettlementStatus::Superseded => "superseded",
        };
        f.write_str(s)
    }
}

/// Versioned per-store, per-period financial report.
///
/// Invariant: `net = gross_sales − refunds − commission + adjustments`.
/// Exactly one version per (store, period) has `is_current_version = true`;
/// regeneration supersedes, prior versions are retained forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Settlement {
    pub id: String,
    pub store_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub version: i64,
    pub is_current_version: bool,
    pub status: SettlementStatus,
    pub gross_sales_cents: i64,
    pub refunds_cents: i64,
    pub commission_cents: i64,
    pub adjustments_cents: i64,
    pub net_cents: i64,
    /// Link to the version this build superseded.
    pub previous_settlement_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Settlement {
    #[inline]
    pub fn net(&self) -> Money {
        Money::from_cents(self.net_cents)
    }
}

/// One order/sub-order included in a settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SettlementItem {
    pub id: String,
    pub settlement_id: String,
    pub escrow_id: String,
    pub sub_order_id: String,
    pub gross_cents: i64,
    pub refunded_cents: i64,
    pub commission_cents: i64,
    pub net_cents: i64,
}

/// Why a manual adjustment exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// Operator-entered correction.
    Manual,
    /// Platform fee outside the commission chain.
    Fee,
    /// Balance carried over from a prior period.
    CarryOver,
}

/// A manual correction, fee, or carry-over tagged to a (store, period).
///
/// Signed: positive credits the seller, negative debits them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SettlementAdjustment {
    pub id: String,
    pub store_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub amount_cents: i64,
    pub reason: String,
    pub kind: AdjustmentKind,
    /// The settlement that consumed this adjustment, once built.
    pub settlement_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
