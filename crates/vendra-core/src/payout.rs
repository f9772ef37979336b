//! # Payout Planning
//!
//! Pure decision logic for batching eligible escrows into a payout: the
//! threshold check, the schedule-date calculation, and the retry backoff.
//!
//! The aggregator in vendra-ledger owns the storage side (promoting escrows,
//! atomic claims); the payment rail owns the actual transfer. This module
//! only decides *what* to pay and *when*.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::money::Money;
use crate::types::{EscrowTransaction, Payout, PayoutFrequency, PayoutStatus, StorePayoutConfig};

// =============================================================================
// Scheduling
// =============================================================================

/// Number of days in a (year, month), accounting for leap years.
fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match (next, NaiveDate::from_ymd_opt(year, month, 1)) {
        (Some(next), Some(first)) => (next - first).num_days() as u32,
        _ => 30,
    }
}

/// Computes the next payout date on/after `as_of` per the store's schedule.
///
/// - Weekly: the next occurrence of `payout_day` (0 = Monday .. 6 = Sunday),
///   counting today as a match.
/// - Monthly: `payout_day` of this month if it has not passed, otherwise of
///   next month; clamped to the month's length (31 → Feb 28/29).
pub fn next_scheduled_date(config: &StorePayoutConfig, as_of: DateTime<Utc>) -> DateTime<Utc> {
    let today = as_of.date_naive();

    let date = match config.frequency {
        PayoutFrequency::Weekly => {
            let target = (config.payout_day.clamp(0, 6)) as u32;
            let current = today.weekday().num_days_from_monday();
            let ahead = (target + 7 - current) % 7;
            today + Duration::days(ahead as i64)
        }
        PayoutFrequency::Monthly => {
            let target = config.payout_day.clamp(1, 31) as u32;
            let this_month = target.min(days_in_month(today.year(), today.month()));
            if today.day() <= this_month {
                today.with_day(this_month).unwrap_or(today)
            } else {
                let (year, month) = if today.month() == 12 {
                    (today.year() + 1, 1)
                } else {
                    (today.year(), today.month() + 1)
                };
                let day = target.min(days_in_month(year, month));
                NaiveDate::from_ymd_opt(year, month, day).unwrap_or(today)
            }
        }
    };

    // Payouts run at the start of the scheduled day, UTC.
    DateTime::from_naive_utc_and_offset(
        date.and_hms_opt(0, 0, 0).unwrap_or_default(),
        Utc,
    )
}

// =============================================================================
// Retry Backoff
// =============================================================================

/// Exponential backoff for failed payouts: `base × 2^retry_count` hours.
///
/// The exponent is capped so a long-failing payout can't overflow the
/// duration arithmetic; after `max_retry_attempts` the executor stops
/// scheduling retries anyway.
pub fn retry_backoff(base_hours: i64, retry_count: i64) -> Duration {
    let exponent = retry_count.clamp(0, 16) as u32;
    Duration::hours(base_hours.saturating_mul(1_i64 << exponent))
}

// =============================================================================
// Planning
// =============================================================================

/// Sum of the payable amounts across a batch of escrows.
pub fn payable_total(escrows: &[EscrowTransaction]) -> Money {
    escrows.iter().map(EscrowTransaction::payable).sum()
}

/// Plans a payout for the given eligible escrows, or `None` when the balance
/// is below the store's threshold (it rolls to the next cycle; not an error).
pub fn plan_payout(
    config: &StorePayoutConfig,
    escrows: &[EscrowTransaction],
    as_of: DateTime<Utc>,
) -> Option<Payout> {
    let total = payable_total(escrows);
    if escrows.is_empty() || total < config.minimum_payout_threshold() {
        return None;
    }

    Some(Payout {
        id: Uuid::new_v4().to_string(),
        store_id: config.store_id.clone(),
        total_cents: total.cents(),
        status: PayoutStatus::Scheduled,
        scheduled_date: next_scheduled_date(config, as_of),
        retry_count: 0,
        max_retry_attempts: config.max_retry_attempts,
        next_retry_date: None,
        provider_reference: None,
        last_error: None,
        created_at: as_of,
        updated_at: as_of,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
