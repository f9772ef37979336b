//! # Pipeline Error Types
//!
//! Errors for the settlement pipeline services. Most failures originate in
//! vendra-core (domain rule violations) or vendra-db (storage); this enum
//! wraps both and adds the handful of orchestration-level failures the
//! services themselves detect.

use thiserror::Error;

use vendra_core::CoreError;
use vendra_db::DbError;

/// Settlement pipeline errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A domain rule rejected the operation (refund too large, payment not
    /// confirmed, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage failed.
    #[error(transparent)]
    Db(#[from] DbError),

    /// The payment's currency is not the one this deployment settles in.
    /// Multi-currency capture belongs to the payment collaborator; the
    /// ledger only ever aggregates a single currency.
    #[error("Payment {payment_id} is in {currency}; this ledger settles in {expected}")]
    UnsupportedCurrency {
        payment_id: String,
        currency: String,
        expected: String,
    },

    /// The payout is not in an executable state: already paid, already
    /// claimed by another executor, or failed with no retries left.
    #[error("Payout {payout_id} is not executable (status: {status})")]
    PayoutNotExecutable { payout_id: String, status: String },

    /// Another builder regenerated the same (store, period) settlement
    /// concurrently; this build aborted without writing anything.
    #[error("Concurrent settlement rebuild for store {store_id}; retry the build")]
    ConcurrentSettlementBuild { store_id: String },
}

/// Result type for pipeline operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
