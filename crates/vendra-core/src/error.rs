//! # Error Types
//!
//! Domain-specific error types for vendra-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  vendra-core errors (this file)                                        │
//! │  └── CoreError        - Business-rule violations                       │
//! │                                                                         │
//! │  vendra-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  vendra-ledger errors (separate crate)                                 │
//! │  └── LedgerError      - Pipeline failures (wraps both)                 │
//! │                                                                         │
//! │  Flow: CoreError ──┐                                                   │
//! │        DbError   ──┴──► LedgerError ──► caller                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (payment id, escrow id, amounts)
//! 3. Errors are enum variants, never String
//! 4. Business-rule violations are returned to the caller, never retried
//!    automatically

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business-rule violations in the settlement pipeline.
///
/// Every monetary mutation that is rejected comes back as one of these; none
/// are retried automatically and none are swallowed.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No commission configuration is in effect for the sale context.
    ///
    /// ## When This Occurs
    /// - No global config has been seeded
    /// - All candidate configs have expired (`effective_to` in the past)
    #[error("No commission configuration in effect for seller {seller_id}")]
    ConfigurationMissing { seller_id: String },

    /// The resolved commission would exceed the gross amount.
    ///
    /// `resolve` clamps and flags instead of failing; `resolve_strict`
    /// returns this for callers that must treat a clamped commission as a
    /// hard error (config validation).
    #[error("Commission {commission_cents} exceeds gross {gross_cents}")]
    CommissionExceedsGross {
        commission_cents: i64,
        gross_cents: i64,
    },

    /// Escrow allocation was invoked before the payment was captured.
    #[error("Payment {payment_id} is not confirmed; cannot allocate escrows")]
    PaymentNotConfirmed { payment_id: String },

    /// Escrows already exist for this payment (idempotency guard).
    ///
    /// ## When This Occurs
    /// - A checkout retry re-invokes allocation for the same payment
    /// - Two concurrent allocation calls race; the loser sees this
    #[error("Escrows already allocated for payment {payment_id}")]
    DuplicateAllocation { payment_id: String },

    /// The sum of allocated escrow gross amounts does not equal the payment.
    ///
    /// This indicates a reconciliation bug upstream (order data and payment
    /// amount disagree). Fatal for the payment: nothing is persisted.
    #[error(
        "Allocation mismatch for payment {payment_id}: escrows sum to {allocated_cents}, payment is {payment_cents}"
    )]
    AllocationMismatch {
        payment_id: String,
        allocated_cents: i64,
        payment_cents: i64,
    },

    /// A payment with no seller sub-orders cannot be allocated.
    #[error("Payment {payment_id} has no sub-orders to allocate")]
    NoSubOrders { payment_id: String },

    /// Refund amount must be a positive number of cents.
    #[error("Refund amount {amount_cents} for escrow {escrow_id} is not positive")]
    InvalidRefundAmount { escrow_id: String, amount_cents: i64 },

    /// Refund exceeds the unrefunded remainder of the escrow.
    #[error(
        "Refund of {requested_cents} exceeds available {available_cents} on escrow {escrow_id}"
    )]
    RefundExceedsAvailable {
        escrow_id: String,
        requested_cents: i64,
        available_cents: i64,
    },

    /// The same refund request was already applied (idempotency guard).
    #[error("Refund request {refund_request_id} was already applied")]
    DuplicateRefund { refund_request_id: String },

    /// A finalized settlement blocks regeneration unless explicitly forced.
    #[error("Settlement {settlement_id} is finalized; regeneration requires an admin override")]
    SettlementAlreadyFinalized { settlement_id: String },

    /// A settlement status transition that the state machine forbids.
    ///
    /// ## When This Occurs
    /// - Finalizing a superseded settlement
    /// - Finalizing twice
    #[error("Settlement {settlement_id} is {status}; cannot perform transition")]
    InvalidSettlementTransition { settlement_id: String, status: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::AllocationMismatch {
            payment_id: "pay-1".to_string(),
            allocated_cents: 9_900,
            payment_cents: 10_000,
        };
        assert_eq!(
            err.to_string(),
            "Allocation mismatch for payment pay-1: escrows sum to 9900, payment is 10000"
        );

        let err = CoreError::RefundExceedsAvailable {
            escrow_id: "esc-1".to_string(),
            requested_cents: 7_000,
            available_cents: 6_000,
        };
        assert_eq!(
            err.to_string(),
            "Refund of 7000 exceeds available 6000 on escrow esc-1"
        );
    }
}
