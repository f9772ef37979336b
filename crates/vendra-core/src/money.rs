//! # Money Module
//!
//! Provides the `Money` and `RateBps` types for handling monetary values and
//! commission rates safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  In a settlement ledger that splits one payment across many sellers,   │
//! │  a systematic rounding drift is a reconciliation incident waiting to   │
//! │  happen.                                                                │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Every amount is an i64 in the smallest currency unit. Rounding      │
//! │    happens in exactly one place (`div_round_half_away`) and is         │
//! │    half-away-from-zero, the convention used for currency amounts.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use vendra_core::money::{Money, RateBps};
//!
//! let gross = Money::from_cents(10_000); // $100.00
//! let rate = RateBps::from_bps(1_000);   // 10%
//!
//! // 10% of $100.00 plus a $0.50 fixed fee
//! let commission = rate.apply(gross) + Money::from_cents(50);
//! assert_eq!(commission.cents(), 1_050); // $10.50
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

// =============================================================================
// Rounding
// =============================================================================

/// Divides `num / den` rounding half away from zero.
///
/// This is the single rounding primitive of the ledger. Both commission
/// application (`gross * bps / 10_000`) and proportional refund reversal
/// (`commission * refund / gross`) go through here, so every rounded cent in
/// the system follows the same convention.
///
/// `den` must be positive; `num` may be negative (refund adjustments).
pub(crate) fn div_round_half_away(num: i128, den: i128) -> i64 {
    debug_assert!(den > 0, "denominator must be positive");
    let half = den / 2;
    let rounded = if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    };
    rounded as i64
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: negative values represent refunds and commission
///   reversals
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - All persisted columns store raw cents; `Money` exists at the edges of
///   every calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is strictly positive.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is strictly negative.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    /// Computes the share of `self` attributable to `part` out of `whole`,
    /// rounded half away from zero.
    ///
    /// This is the proportional-reversal primitive: refunding `part` of a
    /// `whole` gross reverses `commission.proportion(part, whole)` of the
    /// recorded commission.
    ///
    /// ## Example
    /// ```rust
    /// use vendra_core::money::Money;
    ///
    /// let commission = Money::from_cents(1_050); // $10.50 on $100.00 gross
    /// let reversal = commission.proportion(Money::from_cents(4_000), Money::from_cents(10_000));
    /// assert_eq!(reversal.cents(), 420); // $4.20 for a $40.00 refund
    /// ```
    pub fn proportion(&self, part: Money, whole: Money) -> Money {
        if whole.0 <= 0 {
            return Money::zero();
        }
        Money(div_round_half_away(
            self.0 as i128 * part.0 as i128,
            whole.0 as i128,
        ))
    }
}

// =============================================================================
// Rate Type
// =============================================================================

/// A commission rate in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000. A "10.25%" commission is 1025 bps.
/// Storing the rate as an integer keeps rate arithmetic exact; the original
/// percentage is recoverable for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBps(u32);

impl RateBps {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        RateBps(bps)
    }

    /// Creates a rate from a percentage (for convenience; display inputs).
    pub fn from_percentage(pct: f64) -> Self {
        RateBps((pct * 100.0).round() as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        RateBps(0)
    }

    /// Applies the rate to an amount, rounding half away from zero.
    ///
    /// ## Example
    /// ```rust
    /// use vendra_core::money::{Money, RateBps};
    ///
    /// let rate = RateBps::from_bps(1_025); // 10.25%
    /// let fee = rate.apply(Money::from_cents(9_999));
    /// assert_eq!(fee.cents(), 1_025); // $10.2490 rounds to $10.25
    /// ```
    pub fn apply(&self, amount: Money) -> Money {
        Money(div_round_half_away(
            amount.cents() as i128 * self.0 as i128,
            10_000,
        ))
    }
}

impl Default for RateBps {
    fn default() -> Self {
        RateBps::zero()
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
/// This is for logs and debugging, not localized UI output.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

/// Default money is zero.
impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "$5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "$0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((-a).cents(), -1000);

        let sum: Money = [a, b, b].into_iter().sum();
        assert_eq!(sum.cents(), 2000);
    }

    #[test]
    fn test_rate_apply_exact() {
        // $100.00 at 10% = $10.00
        let rate = RateBps::from_bps(1000);
        assert_eq!(rate.apply(Money::from_cents(10_000)).cents(), 1000);
    }

    #[test]
    fn test_rate_apply_rounds_half_away_from_zero() {
        // $0.05 at 10% = $0.005 → rounds up to $0.01
        let rate = RateBps::from_bps(1000);
        assert_eq!(rate.apply(Money::from_cents(5)).cents(), 1);

        // Negative basis rounds away from zero too: -$0.005 → -$0.01
        assert_eq!(rate.apply(Money::from_cents(-5)).cents(), -1);
    }

    #[test]
    fn test_rate_from_percentage() {
        assert_eq!(RateBps::from_percentage(8.25).bps(), 825);
        assert_eq!(RateBps::from_percentage(10.0).bps(), 1000);
    }

    #[test]
    fn test_proportion_spec_scenario() {
        // $10.50 commission on $100.00 gross; $40.00 refund reverses $4.20
        let commission = Money::from_cents(1050);
        let reversal = commission.proportion(Money::from_cents(4000), Money::from_cents(10_000));
        assert_eq!(reversal.cents(), 420);
    }

    #[test]
    fn test_proportion_rounds() {
        // $10.00 commission, refund 1/3 of $100.00 → $3.3333.. → $3.33
        let commission = Money::from_cents(1000);
        let reversal = commission.proportion(Money::from_cents(3333), Money::from_cents(10_000));
        assert_eq!(reversal.cents(), 333);
    }

    #[test]
    fn test_proportion_zero_denominator_is_zero() {
        let commission = Money::from_cents(1000);
        assert!(commission
            .proportion(Money::from_cents(50), Money::zero())
            .is_zero());
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        assert!(Money::from_cents(100).is_positive());
        assert!(Money::from_cents(-100).is_negative());
    }
}
