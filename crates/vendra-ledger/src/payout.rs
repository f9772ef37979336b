//! # Payout Aggregation & Execution
//!
//! Two services share this module:
//!
//! - [`PayoutAggregator`] batches a store's payable escrows into a payout
//!   when the balance clears the store's threshold.
//! - [`PayoutExecutor`] drives a payout through the payment rail and the
//!   retry/backoff state machine.
//!
//! ## Aggregation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  run_for_store(store)                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. promote held → eligible (hold elapsed)                             │
//! │  2. list payable (eligible + partially_refunded, unclaimed)            │
//! │  3. Σ payable < threshold? ──► None (rolls to next cycle)              │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │  4. insert payout, claim escrows (conditional UPDATE each)             │
//! │  5. recompute total from what was actually claimed                     │
//! │       │                                                                 │
//! │       └── claimed nothing / dropped below threshold? unwind & None     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{LedgerError, LedgerResult};
use vendra_core::payout::{payable_total, plan_payout, retry_backoff};
use vendra_core::Payout;
use vendra_db::Database;

// =============================================================================
// Payment Rail
// =============================================================================

/// Successful transfer receipt from the payment rail.
#[derive(Debug, Clone)]
pub struct RailReceipt {
    /// The rail's reference id for the transfer.
    pub provider_reference: String,
}

/// Payment rail failures.
#[derive(Debug, thiserror::Error)]
pub enum RailError {
    /// The rail rejected the transfer (bad account, compliance hold).
    #[error("transfer rejected: {0}")]
    Rejected(String),
    /// The rail could not be reached; worth retrying.
    #[error("rail unavailable: {0}")]
    Unavailable(String),
}

/// The outbound money-movement boundary.
///
/// Implementations wrap a bank/PSP transfer API. The executor treats every
/// failure as retryable up to the store's retry budget; rails that know a
/// failure is permanent should still return it and let the budget exhaust.
pub trait PayoutRail: Send + Sync {
    fn transfer(
        &self,
        payout: &Payout,
    ) -> impl std::future::Future<Output = Result<RailReceipt, RailError>> + Send;
}

// =============================================================================
// Aggregator
// =============================================================================

/// Service that batches payable escrows into payouts.
#[derive(Debug, Clone)]
pub struct PayoutAggregator<C: Clock = SystemClock> {
    db: Database,
    clock: C,
}

impl PayoutAggregator<SystemClock> {
    /// Creates an aggregator on the system clock.
    pub fn new(db: Database) -> Self {
        PayoutAggregator {
            db,
            clock: SystemClock,
        }
    }
}

impl<C: Clock> PayoutAggregator<C> {
    /// Creates an aggregator with an explicit clock (tests).
    pub fn with_clock(db: Database, clock: C) -> Self {
        PayoutAggregator { db, clock }
    }

    /// Runs one aggregation cycle for a store.
    ///
    /// Returns the created payout, or `None` when the payable balance is
    /// below the store's threshold (it rolls over; not an error) or every
    /// candidate escrow was claimed concurrently.
    pub async fn run_for_store(&self, store_id: &str) -> LedgerResult<Option<Payout>> {
        let now = self.clock.now();
        let config = self.db.payouts().config_for_store(store_id).await?;

        let promoted = self.db.escrows().promote_eligible(store_id, now, now).await?;
        if promoted > 0 {
            debug!(store_id = %store_id, promoted = promoted, "Escrows promoted to eligible");
        }

        let payable = self.db.escrows().list_payable(store_id, now).await?;
        let Some(payout) = plan_payout(&config, &payable, now) else {
            debug!(
                store_id = %store_id,
                balance_cents = payable_total(&payable).cents(),
                threshold_cents = config.minimum_payout_threshold_cents,
                "Below payout threshold, rolling over"
            );
            return Ok(None);
        };

        self.db.payouts().insert(&payout).await?;

        let candidate_ids: Vec<String> = payable.iter().map(|e| e.id.clone()).collect();
        let claimed = self
            .db
            .escrows()
            .claim_for_payout(&candidate_ids, &payout.id, now)
            .await?;

        if claimed.len() < candidate_ids.len() {
            debug!(
                store_id = %store_id,
                lost = candidate_ids.len() - claimed.len(),
                "Some escrows were claimed concurrently"
            );
        }

        // The claim is ground truth; recompute the total from what this
        // payout actually holds.
        let escrows = self.db.escrows().list_by_payout(&payout.id).await?;
        let total = payable_total(&escrows);

        if escrows.is_empty() || total < config.minimum_payout_threshold() {
            self.db.escrows().unclaim_for_payout(&payout.id, now).await?;
            self.db.payouts().delete(&payout.id).await?;
            debug!(store_id = %store_id, "Claim race left payout below threshold, unwound");
            return Ok(None);
        }

        if total.cents() != payout.total_cents {
            self.db
                .payouts()
                .update_total(&payout.id, total.cents(), now)
                .await?;
        }

        let payout = self.db.payouts().get_by_id(&payout.id).await?;
        info!(
            store_id = %store_id,
            payout_id = %payout.id,
            total_cents = payout.total_cents,
            escrows = escrows.len(),
            scheduled_date = %payout.scheduled_date,
            "Payout created"
        );
        Ok(Some(payout))
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Called when a payout exhausts its retry budget, for manual follow-up
/// (paging, ticketing). The payout stays `failed` either way.
pub type ExhaustedHook = Box<dyn Fn(&Payout) + Send + Sync>;

/// Service that drives payouts through the payment rail.
pub struct PayoutExecutor<R: PayoutRail, C: Clock = SystemClock> {
    db: Database,
    rail: R,
    clock: C,
    on_exhausted: Option<ExhaustedHook>,
}

impl<R: PayoutRail> PayoutExecutor<R, SystemClock> {
    /// Creates an executor on the system clock.
    pub fn new(db: Database, rail: R) -> Self {
        PayoutExecutor {
            db,
            rail,
            clock: SystemClock,
            on_exhausted: None,
        }
    }
}

impl<R: PayoutRail, C: Clock> PayoutExecutor<R, C> {
    /// Creates an executor with an explicit clock (tests).
    pub fn with_clock(db: Database, rail: R, clock: C) -> Self {
        PayoutExecutor {
            db,
            rail,
            clock,
            on_exhausted: None,
        }
    }

    /// Registers a hook invoked when a payout runs out of retries.
    pub fn on_exhausted(mut self, hook: ExhaustedHook) -> Self {
        self.on_exhausted = Some(hook);
        self
    }

    /// Executes one payout attempt end to end.
    ///
    /// The processing claim is a conditional UPDATE, so concurrent
    /// executors resolve to exactly one transfer per attempt. On success the
    /// payout's escrows are released; on failure the payout moves to
    /// `failed` with exponential-backoff bookkeeping.
    pub async fn execute(&self, payout_id: &str) -> LedgerResult<Payout> {
        let now = self.clock.now();

        if !self.db.payouts().mark_processing(payout_id, now).await? {
            let payout = self.db.payouts().get_by_id(payout_id).await?;
            return Err(LedgerError::PayoutNotExecutable {
                payout_id: payout_id.to_string(),
                status: format!("{:?}", payout.status).to_lowercase(),
            });
        }

        let payout = self.db.payouts().get_by_id(payout_id).await?;
        debug!(
            payout_id = %payout_id,
            total_cents = payout.total_cents,
            attempt = payout.retry_count + 1,
            "Executing payout"
        );

        match self.rail.transfer(&payout).await {
            Ok(receipt) => {
                self.db
                    .payouts()
                    .mark_paid(payout_id, &receipt.provider_reference, now)
                    .await?;
                let released = self.db.escrows().release_for_payout(payout_id, now).await?;
                info!(
                    payout_id = %payout_id,
                    provider_reference = %receipt.provider_reference,
                    escrows_released = released,
                    "Payout paid"
                );
            }
            Err(rail_err) => {
                let retry_count = payout.retry_count + 1;
                let exhausted = retry_count >= payout.max_retry_attempts;

                let next_retry_date = if exhausted {
                    None
                } else {
                    let config = self.db.payouts().config_for_store(&payout.store_id).await?;
                    Some(now + retry_backoff(config.retry_base_hours, payout.retry_count))
                };

                self.db
                    .payouts()
                    .record_failure(
                        payout_id,
                        retry_count,
                        next_retry_date,
                        &rail_err.to_string(),
                        now,
                    )
                    .await?;

                warn!(
                    payout_id = %payout_id,
                    error = %rail_err,
                    retry_count = retry_count,
                    next_retry_date = ?next_retry_date,
                    "Payout attempt failed"
                );

                if exhausted {
                    warn!(
                        payout_id = %payout_id,
                        attempts = retry_count,
                        "Payout retry budget exhausted, manual intervention required"
                    );
                    if let Some(hook) = &self.on_exhausted {
                        let payout = self.db.payouts().get_by_id(payout_id).await?;
                        hook(&payout);
                    }
                }
            }
        }

        Ok(self.db.payouts().get_by_id(payout_id).await?)
    }

    /// Executes every scheduled payout whose scheduled date has arrived.
    ///
    /// Returns the attempted payouts in execution order.
    pub async fn run_due_scheduled(&self) -> LedgerResult<Vec<Payout>> {
        let due = self
            .db
            .payouts()
            .list_due_scheduled(self.clock.now())
            .await?;
        self.execute_batch(due).await
    }

    /// Executes every failed payout whose backoff has elapsed.
    ///
    /// Returns the attempted payouts in execution order.
    pub async fn run_due_retries(&self) -> LedgerResult<Vec<Payout>> {
        let due = self.db.payouts().list_due_retries(self.clock.now()).await?;
        self.execute_batch(due).await
    }

    /// A payout claimed by a concurrent executor between the listing and the
    /// processing claim is skipped; it must not sink the rest of the batch.
    /// Infrastructure errors still abort.
    async fn execute_batch(&self, due: Vec<Payout>) -> LedgerResult<Vec<Payout>> {
        let mut results = Vec::with_capacity(due.len());
        for payout in due {
            match self.execute(&payout.id).await {
                Ok(executed) => results.push(executed),
                Err(LedgerError::PayoutNotExecutable { payout_id, status }) => {
                    debug!(
                        payout_id = %payout_id,
                        status = %status,
                        "Payout claimed concurrently, skipping"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(results)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::EscrowAllocator;
    use crate::clock::FixedClock;
    use crate::config::LedgerConfig;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use vendra_core::commission::CommissionRate;
    use vendra_core::money::{Money, RateBps};
    use vendra_core::{
        EscrowStatus, OrderLine, Payment, PaymentStatus, PayoutStatus, StorePayoutConfig, SubOrder,
    };
    use vendra_db::DbConfig;

    /// Rail stub that succeeds or fails on command.
    struct StubRail {
        fail: bool,
    }

    impl PayoutRail for StubRail {
        async fn transfer(&self, _payout: &Payout) -> Result<RailReceipt, RailError> {
            if self.fail {
                Err(RailError::Unavailable("connection reset".into()))
            } else {
                Ok(RailReceipt {
                    provider_reference: "rail-ref-1".into(),
                })
            }
        }
    }

    fn confirmed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 14, 30, 0).unwrap()
    }

    /// A moment safely past the 7-day hold.
    fn after_hold() -> DateTime<Utc> {
        confirmed_at() + Duration::days(8)
    }

    /// Seeds escrows at a 10% flat commission, one escrow per entry in
    /// `payments`, each (payment_id, store_id, gross_cents).
    async fn seeded(payments: &[(&str, &str, i64)]) -> (Database, FixedClock) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.commission_configs()
            .add_global(
                CommissionRate::new(RateBps::from_bps(1_000), Money::zero()),
                Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                None,
                confirmed_at(),
            )
            .await
            .unwrap();

        let clock = FixedClock::at(confirmed_at());
        let allocator =
            EscrowAllocator::with_clock(db.clone(), LedgerConfig::default(), clock.clone());
        for (payment_id, store_id, cents) in payments {
            let payment = Payment {
                id: (*payment_id).to_string(),
                order_id: format!("{payment_id}-ord"),
                amount_cents: *cents,
                currency: "USD".into(),
                status: PaymentStatus::Confirmed,
                confirmed_at: Some(confirmed_at()),
            };
            let subs = vec![SubOrder {
                id: format!("{payment_id}-sub"),
                order_id: format!("{payment_id}-ord"),
                store_id: (*store_id).to_string(),
                lines: vec![OrderLine {
                    category_id: "books".into(),
                    line_total_cents: *cents,
                }],
                shipping_cents: 0,
                ordered_at: confirmed_at(),
            }];
            allocator.allocate_payment(&payment, &subs).await.unwrap();
        }
        (db, clock)
    }

    async fn set_threshold(db: &Database, store_id: &str, threshold_cents: i64) {
        db.payouts()
            .upsert_config(&StorePayoutConfig {
                minimum_payout_threshold_cents: threshold_cents,
                ..StorePayoutConfig::default_for(store_id)
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_below_threshold_rolls_over() {
        // Net at 10%: $45.00 eligible against a $50.00 threshold
        let (db, clock) = seeded(&[("pay-1", "store-1", 5_000)]).await;
        set_threshold(&db, "store-1", 5_000).await;
        clock.set(after_hold());

        let aggregator = PayoutAggregator::with_clock(db.clone(), clock);
        assert!(aggregator.run_for_store("store-1").await.unwrap().is_none());

        // Escrows stay eligible and unclaimed for the next cycle
        let payable = db.escrows().list_payable("store-1", after_hold()).await.unwrap();
        assert_eq!(payable.len(), 1);
    }

    #[tokio::test]
    async fn test_aggregates_when_threshold_met() {
        // Nets at 10%: 2_700 + 3_330 = 6_030 against a $50.00 threshold
        let (db, clock) =
            seeded(&[("pay-1", "store-1", 3_000), ("pay-2", "store-1", 3_700)]).await;
        set_threshold(&db, "store-1", 5_000).await;
        clock.set(after_hold());

        let aggregator = PayoutAggregator::with_clock(db.clone(), clock);
        let payout = aggregator.run_for_store("store-1").await.unwrap().unwrap();

        assert_eq!(payout.total_cents, 6_030);
        assert_eq!(payout.status, PayoutStatus::Scheduled);

        let claimed = db.escrows().list_by_payout(&payout.id).await.unwrap();
        assert_eq!(claimed.len(), 2);

        // A second cycle finds nothing left to pay
        let aggregator2 = PayoutAggregator::with_clock(db.clone(), FixedClock::at(after_hold()));
        assert!(aggregator2.run_for_store("store-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_successful_execution_releases_escrows() {
        let (db, clock) = seeded(&[("pay-1", "store-1", 10_000)]).await;
        set_threshold(&db, "store-1", 1_000).await;
        clock.set(after_hold());

        let aggregator = PayoutAggregator::with_clock(db.clone(), clock.clone());
        let payout = aggregator.run_for_store("store-1").await.unwrap().unwrap();

        let executor = PayoutExecutor::with_clock(db.clone(), StubRail { fail: false }, clock);
        let executed = executor.execute(&payout.id).await.unwrap();

        assert_eq!(executed.status, PayoutStatus::Paid);
        assert_eq!(executed.provider_reference.as_deref(), Some("rail-ref-1"));

        let escrows = db.escrows().list_by_payout(&payout.id).await.unwrap();
        assert!(escrows.iter().all(|e| e.status == EscrowStatus::Released));
    }

    #[tokio::test]
    async fn test_failure_schedules_backoff_retry() {
        let (db, clock) = seeded(&[("pay-1", "store-1", 10_000)]).await;
        set_threshold(&db, "store-1", 1_000).await;
        clock.set(after_hold());

        let aggregator = PayoutAggregator::with_clock(db.clone(), clock.clone());
        let payout = aggregator.run_for_store("store-1").await.unwrap().unwrap();

        let executor = PayoutExecutor::with_clock(db.clone(), StubRail { fail: true }, clock.clone());
        let failed = executor.execute(&payout.id).await.unwrap();

        assert_eq!(failed.status, PayoutStatus::Failed);
        assert_eq!(failed.retry_count, 1);
        // First backoff: 24h × 2^0
        assert_eq!(
            failed.next_retry_date,
            Some(after_hold() + Duration::hours(24))
        );
        assert!(failed.last_error.is_some());

        // Escrows stay claimed while the payout can still retry
        assert!(db
            .escrows()
            .list_payable("store-1", after_hold())
            .await
            .unwrap()
            .is_empty());

        // Due once the backoff elapses, then succeeds
        clock.advance(Duration::hours(25));
        let ok_executor =
            PayoutExecutor::with_clock(db.clone(), StubRail { fail: false }, clock);
        let results = ok_executor.run_due_retries().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, PayoutStatus::Paid);
    }

    #[tokio::test]
    async fn test_exhaustion_fires_hook_and_frees_escrows() {
        let (db, clock) = seeded(&[("pay-1", "store-1", 10_000)]).await;
        set_threshold(&db, "store-1", 1_000).await;
        clock.set(after_hold());

        let aggregator = PayoutAggregator::with_clock(db.clone(), clock.clone());
        let payout = aggregator.run_for_store("store-1").await.unwrap().unwrap();
        assert_eq!(payout.max_retry_attempts, 3);

        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let executor = PayoutExecutor::with_clock(db.clone(), StubRail { fail: true }, clock.clone())
            .on_exhausted(Box::new(move |_p| flag.store(true, Ordering::SeqCst)));

        for _ in 0..3 {
            executor.execute(&payout.id).await.unwrap();
            clock.advance(Duration::days(5));
        }

        let stored = db.payouts().get_by_id(&payout.id).await.unwrap();
        assert_eq!(stored.status, PayoutStatus::Failed);
        assert_eq!(stored.retry_count, 3);
        assert!(stored.next_retry_date.is_none());
        assert!(fired.load(Ordering::SeqCst));

        // A fourth attempt is rejected
        let err = executor.execute(&payout.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::PayoutNotExecutable { .. }));

        // Exhausted payouts free their escrows for re-aggregation
        let payable = db.escrows().list_payable("store-1", clock.now()).await.unwrap();
        assert_eq!(payable.len(), 1);
    }

    #[tokio::test]
    async fn test_partially_refunded_escrow_pays_remainder() {
        let (db, clock) = seeded(&[("pay-1", "store-1", 10_000)]).await;
        set_threshold(&db, "store-1", 1_000).await;

        // Refund $40.00 before the hold elapses
        let adjuster = crate::refund::RefundAdjuster::with_clock(db.clone(), clock.clone());
        let escrow_id = db
            .escrows()
            .list_by_payment("pay-1")
            .await
            .unwrap()
            .remove(0)
            .id;
        adjuster
            .apply(&escrow_id, "ret-1", Money::from_cents(4_000))
            .await
            .unwrap();

        clock.set(after_hold());
        let aggregator = PayoutAggregator::with_clock(db.clone(), clock);
        let payout = aggregator.run_for_store("store-1").await.unwrap().unwrap();

        // net 9000 − refunded 4000 + commission reversed 400 = 5400
        assert_eq!(payout.total_cents, 5_400);
    }

    #[tokio::test]
    async fn test_scheduled_payouts_execute_on_their_date() {
        let (db, clock) = seeded(&[("pay-1", "store-1", 10_000)]).await;
        set_threshold(&db, "store-1", 1_000).await;
        clock.set(after_hold());

        let aggregator = PayoutAggregator::with_clock(db.clone(), clock.clone());
        let payout = aggregator.run_for_store("store-1").await.unwrap().unwrap();
        // Weekly Monday schedule: created Wednesday 2026-03-18, runs the 23rd
        assert_eq!(
            payout.scheduled_date,
            Utc.with_ymd_and_hms(2026, 3, 23, 0, 0, 0).unwrap()
        );

        let executor =
            PayoutExecutor::with_clock(db.clone(), StubRail { fail: false }, clock.clone());

        // Nothing is due before the scheduled date
        assert!(executor.run_due_scheduled().await.unwrap().is_empty());

        clock.set(Utc.with_ymd_and_hms(2026, 3, 23, 6, 0, 0).unwrap());
        let results = executor.run_due_scheduled().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, PayoutStatus::Paid);

        let escrows = db.escrows().list_by_payout(&payout.id).await.unwrap();
        assert!(escrows.iter().all(|e| e.status == EscrowStatus::Released));
    }

    /// Rail that, on its first transfer, pays the *other* due payout through
    /// a second executor before completing its own, reproducing a rival
    /// worker winning the processing claim mid-batch.
    struct RacingRail {
        db: Database,
        clock: FixedClock,
        payout_ids: Vec<String>,
        raced: AtomicBool,
    }

    impl PayoutRail for RacingRail {
        async fn transfer(&self, payout: &Payout) -> Result<RailReceipt, RailError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                let other = self
                    .payout_ids
                    .iter()
                    .find(|id| **id != payout.id)
                    .expect("two payouts seeded");
                PayoutExecutor::with_clock(
                    self.db.clone(),
                    StubRail { fail: false },
                    self.clock.clone(),
                )
                .execute(other)
                .await
                .expect("rival execution succeeds");
            }
            Ok(RailReceipt {
                provider_reference: "rail-ref-2".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_batch_skips_payout_claimed_by_rival_executor() {
        let (db, clock) =
            seeded(&[("pay-1", "store-1", 10_000), ("pay-2", "store-2", 10_000)]).await;
        set_threshold(&db, "store-1", 1_000).await;
        set_threshold(&db, "store-2", 1_000).await;
        clock.set(after_hold());

        let aggregator = PayoutAggregator::with_clock(db.clone(), clock.clone());
        let a = aggregator.run_for_store("store-1").await.unwrap().unwrap();
        let b = aggregator.run_for_store("store-2").await.unwrap().unwrap();

        // Fail both once so both come due together
        let failing =
            PayoutExecutor::with_clock(db.clone(), StubRail { fail: true }, clock.clone());
        failing.execute(&a.id).await.unwrap();
        failing.execute(&b.id).await.unwrap();
        clock.advance(Duration::hours(25));

        let rail = RacingRail {
            db: db.clone(),
            clock: clock.clone(),
            payout_ids: vec![a.id.clone(), b.id.clone()],
            raced: AtomicBool::new(false),
        };
        let executor = PayoutExecutor::with_clock(db.clone(), rail, clock.clone());
        let results = executor.run_due_retries().await.unwrap();

        // The rival paid one payout mid-batch; the batch skipped it instead
        // of aborting, and both ended up paid.
        assert_eq!(results.len(), 1);
        let a = db.payouts().get_by_id(&a.id).await.unwrap();
        let b = db.payouts().get_by_id(&b.id).await.unwrap();
        assert_eq!(a.status, PayoutStatus::Paid);
        assert_eq!(b.status, PayoutStatus::Paid);
    }
}
