//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! Every price, cost, discount and total in Tally is an integer number of
//! minor units (cents). Tier prices, manual discounts and tax all flow
//! through this type so that `0.1 + 0.2` problems never reach a receipt.
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//!
//! let price = Money::from_cents(1099); // $10.99
//! let line = price * 3;                // $32.97
//! assert_eq!(line.cents(), 3297);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;
use crate::MAX_CURRENCY_DECIMALS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: allows negative values for savings deltas and refunds
/// - **Single field tuple struct**: zero-cost abstraction over i64
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(1099).cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -$5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Clamps the value into `[min, max]`.
    ///
    /// Used when a manual discount would push a line below zero.
    #[inline]
    pub fn clamp_between(self, min: Money, max: Money) -> Money {
        Money(self.0.max(min.0).min(max.0))
    }

    /// Multiplies money by a quantity.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(299).multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Returns `bps` basis points of this amount, rounded half up.
    ///
    /// 1000 bps = 10%. Uses i128 so large totals cannot overflow.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(1999).percentage(1000).cents(), 200);
    /// ```
    pub fn percentage(&self, bps: u32) -> Money {
        let scaled = self.0 as i128 * bps as i128;
        let rounded = if scaled >= 0 {
            (scaled + 5000) / 10000
        } else {
            (scaled - 5000) / 10000
        };
        Money(rounded as i64)
    }

    /// Tax on top of this amount (exclusive pricing).
    ///
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::types::TaxRate;
    ///
    /// let tax = Money::from_cents(1000).calculate_tax(TaxRate::from_bps(825));
    /// assert_eq!(tax.cents(), 83);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        self.percentage(rate.bps())
    }

    /// Tax already contained in this amount (inclusive pricing).
    ///
    /// `tax = gross × rate / (1 + rate)`, rounded half up.
    pub fn included_tax(&self, rate: TaxRate) -> Money {
        if rate.is_zero() {
            return Money::zero();
        }
        let numerator = self.0 as i128 * rate.bps() as i128;
        let denominator = 10000 + rate.bps() as i128;
        Money(((numerator * 2 + denominator) / (denominator * 2)) as i64)
    }

    /// Splits this amount across `weights` proportionally.
    ///
    /// The parts always sum to `self`; the last non-zero weight absorbs the
    /// rounding remainder. Zero total weight yields all-zero parts.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let parts = Money::from_cents(100).allocate(&[1, 1, 1]);
    /// let cents: Vec<i64> = parts.iter().map(|m| m.cents()).collect();
    /// assert_eq!(cents, vec![33, 33, 34]);
    /// ```
    pub fn allocate(&self, weights: &[i64]) -> Vec<Money> {
        let total_weight: i128 = weights.iter().map(|w| *w as i128).sum();
        if total_weight <= 0 {
            return vec![Money::zero(); weights.len()];
        }

        let last_index = weights.iter().rposition(|w| *w > 0);
        let mut remaining = self.0;
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| {
                if Some(i) == last_index {
                    return Money(remaining);
                }
                let share = (self.0 as i128 * *w as i128 / total_weight) as i64;
                remaining -= share;
                Money(share)
            })
            .collect()
    }

    /// Formats with a store currency symbol placed before the amount.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(-1250).format_with("Rs "), "-Rs 12.50");
    /// ```
    pub fn format_with(&self, symbol: &str) -> String {
        self.format_minor(symbol, 2)
    }

    /// Formats for a currency with `decimals` minor digits (0 for yen,
    /// 3 for dinar). Values above `MAX_CURRENCY_DECIMALS` are capped.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(150).format_minor("¥", 0), "¥150");
    /// assert_eq!(Money::from_cents(-1500).format_minor("KD ", 3), "-KD 1.500");
    /// ```
    pub fn format_minor(&self, symbol: &str, decimals: u8) -> String {
        let decimals = decimals.min(MAX_CURRENCY_DECIMALS) as u32;
        let divisor = 10_i64.pow(decimals);
        let sign = if self.0 < 0 { "-" } else { "" };
        let whole = (self.0 / divisor).unsigned_abs();

        if decimals == 0 {
            return format!("{}{}{}", sign, symbol, whole);
        }
        let frac = (self.0 % divisor).unsigned_abs();
        format!(
            "{}{}{}.{:0width$}",
            sign,
            symbol,
            whole,
            frac,
            width = decimals as usize
        )
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly display. Front ends format with the store currency.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
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

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
