//! # Vendra Ledger
//!
//! Settlement pipeline services for the Vendra marketplace: the stateful
//! layer that drives [`vendra_core`]'s pure money logic against the
//! [`vendra_db`] ledger tables.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  payment confirmed                                                      │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌──────────────────┐    refunds/disputes    ┌──────────────────┐      │
//! │  │ EscrowAllocator  │◄───────────────────────│  RefundAdjuster  │      │
//! │  │ split + hold     │                        │  reversal + dedup│      │
//! │  └────────┬─────────┘                        └──────────────────┘      │
//! │           │ hold elapses                                               │
//! │           ▼                                                            │
//! │  ┌──────────────────┐   threshold met   ┌──────────────────┐           │
//! │  │ PayoutAggregator │──────────────────►│  PayoutExecutor  │──► rail   │
//! │  │ promote + claim  │                   │  transfer + retry│           │
//! │  └──────────────────┘                   └────────┬─────────┘           │
//! │                                                  │ paid/failed         │
//! │                                                  ▼                     │
//! │                                     ┌────────────────────┐             │
//! │                                     │ SettlementBuilder  │             │
//! │                                     │ versioned reports  │             │
//! │                                     └────────────────────┘             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every service takes a [`Clock`] so tests pin time; production code uses
//! the [`SystemClock`] default.

pub mod allocator;
pub mod clock;
pub mod config;
pub mod error;
pub mod payout;
pub mod refund;
pub mod settlement;

pub use allocator::EscrowAllocator;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use payout::{PayoutAggregator, PayoutExecutor, PayoutRail, RailError, RailReceipt};
pub use refund::RefundAdjuster;
pub use settlement::SettlementBuilder;
