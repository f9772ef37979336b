//! # vendra-db: Database Layer for the Vendra Settlement Ledger
//!
//! This crate provides database access for the Vendra settlement pipeline.
//! It uses SQLite for ledger storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Vendra Ledger Data Flow                            │
//! │                                                                         │
//! │  Ledger Service (EscrowAllocator, PayoutAggregator, ...)               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    vendra-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  (escrow.rs,  │    │  (embedded)  │  │   │
//! │  │   │               │    │   payout.rs,  │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│   ...)        │    │ 001_init.sql │  │   │
//! │  │   │ Connection    │    │               │    │              │  │   │
//! │  │   │ Management    │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (WAL, foreign keys on)                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (escrow, commission,
//!   payout, settlement)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vendra_db::{Database, DbConfig};
//!
//! let config = DbConfig::new("path/to/ledger.db");
//! let db = Database::new(config).await?;
//!
//! let payable = db.escrows().list_payable("store-1", Utc::now()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::commission::{CommissionConfigRepository, CommissionRepository};
pub use repository::escrow::EscrowRepository;
pub use repository::payout::PayoutRepository;
pub use repository::settlement::SettlementRepository;
