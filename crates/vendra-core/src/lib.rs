//! # vendra-core: Pure Financial Logic for the Vendra Marketplace
//!
//! This crate is the **heart** of the Vendra settlement ledger. It contains
//! all monetary business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Vendra Settlement Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │      Collaborators (checkout, returns, cron triggers)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ in-process calls                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  vendra-ledger (pipeline services)              │   │
//! │  │    EscrowAllocator, RefundAdjuster, PayoutAggregator,           │   │
//! │  │    PayoutExecutor, SettlementBuilder                            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ vendra-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────────┐ │   │
//! │  │   │  money   │ │commission│ │allocation│ │ refund / payout /│ │   │
//! │  │   │  Money   │ │ resolver │ │  splits  │ │    settlement    │ │   │
//! │  │   │  RateBps │ │ 3-tier   │ │  escrows │ │      math        │ │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK READS • PURE FUNCTIONS       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                   vendra-db (Database Layer)                    │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (EscrowTransaction, Payout, Settlement, ...)
//! - [`money`] - Money and rate types with integer arithmetic (no floats!)
//! - [`error`] - Domain error taxonomy
//! - [`commission`] - Three-tier commission rate resolution
//! - [`allocation`] - Payment → per-seller escrow splits
//! - [`refund`] - Proportional commission reversal
//! - [`payout`] - Threshold, schedule, and retry-backoff rules
//! - [`settlement`] - Period aggregation and report versioning
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same inputs = same outputs; the clock is a
//!    parameter, never read from the system
//! 2. **No I/O**: database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: all monetary values are cents (i64); rounding is
//!    half-away-from-zero in exactly one primitive
//! 4. **Explicit Errors**: every rejected mutation is a typed `CoreError`,
//!    never a string or a panic
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use vendra_core::commission::{CommissionConfig, CommissionPolicy, CommissionRate};
//! use vendra_core::money::{Money, RateBps};
//!
//! let policy = CommissionPolicy::new().with_global(CommissionConfig {
//!     rate: CommissionRate::new(RateBps::from_bps(1_000), Money::from_cents(50)),
//!     effective_from: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
//!     effective_to: None,
//! });
//!
//! let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
//! let resolved = policy
//!     .resolve("seller-1", None, Money::from_cents(10_000), at)
//!     .unwrap();
//!
//! // $100.00 at 10% + $0.50 fixed = $10.50
//! assert_eq!(resolved.commission.cents(), 1_050);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod commission;
pub mod error;
pub mod money;
pub mod payout;
pub mod refund;
pub mod settlement;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use vendra_core::Money` instead of
// `use vendra_core::money::Money`

pub use error::{CoreError, CoreResult};
pub use money::{Money, RateBps};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default escrow hold period after payment/delivery confirmation, in days.
///
/// ## Business Reason
/// Funds stay clawback-able while the buyer's return window is open.
/// Overridable via `LedgerConfig` in vendra-ledger.
pub const DEFAULT_HOLD_DAYS: i64 = 7;
