//! # Repository Implementations
//!
//! One repository per aggregate, each holding a pool clone:
//!
//! - [`escrow`] - Escrow transactions: allocation, refunds, claims, releases
//! - [`commission`] - Commission audit trail and commission configuration
//! - [`payout`] - Payouts and per-store payout configuration
//! - [`settlement`] - Versioned settlements, items, and adjustments
//!
//! ## Concurrency Guards
//! Repositories enforce the ledger's concurrency invariants with conditional
//! UPDATEs (`WHERE` clauses restating the expected state, checked via
//! `rows_affected`) and UNIQUE-index backstops; callers never need advisory
//! locks.

pub mod commission;
pub mod escrow;
pub mod payout;
pub mod settlement;
