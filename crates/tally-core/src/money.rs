//! # Money Module
//!
//! Integer-cent monetary values. Refund documents carry negative amounts, so
//! the representation is signed.
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//!
//! let unit_cost = Money::from_cents(250);
//! let line_total = unit_cost.multiply_quantity(4);
//! assert_eq!(line_total.cents(), 1000);
//! assert_eq!((-line_total).cents(), -1000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use ts_rs::TS;

/// A monetary value in the smallest currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
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
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Pro-rates this amount to `part` out of `whole` units.
    ///
    /// Rounds half away from zero. `part == whole` returns the amount
    /// unchanged, so a full-line refund negates exactly.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let subtotal = Money::from_cents(1000);
    /// assert_eq!(subtotal.prorate(1, 3).cents(), 333);
    /// assert_eq!(subtotal.prorate(2, 3).cents(), 667);
    /// assert_eq!(subtotal.prorate(3, 3).cents(), 1000);
    /// ```
    pub fn prorate(&self, part: i64, whole: i64) -> Money {
        if whole == 0 || part == whole {
            return *self;
        }
        // i128 keeps large receipts from overflowing
        let num = self.0 as i128 * part as i128;
        let den = whole as i128;
        let half = den / 2;
        let rounded = if num >= 0 {
            (num + half) / den
        } else {
            (num - half) / den
        };
        Money(rounded as i64)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(0).to_string(), "0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);
        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((-a).cents(), -1000);
        assert_eq!((a * 3).cents(), 3000);
        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_prorate_rounding() {
        assert_eq!(Money::from_cents(50).prorate(1, 4).cents(), 13);
        assert_eq!(Money::from_cents(-50).prorate(1, 4).cents(), -13);
        assert_eq!(Money::from_cents(200).prorate(1, 2).cents(), 100);
        assert_eq!(Money::from_cents(7).prorate(0, 3).cents(), 0);
    }

    /// Partial refunds that add up to the whole line may drift by a cent;
    /// the final refund of a line always takes the exact remainder instead.
    #[test]
    fn test_prorate_parts_may_not_sum_exactly() {
        let line = Money::from_cents(100);
        let third = line.prorate(1, 3);
        assert_eq!(third.cents(), 33);
        assert_eq!((third * 3).cents(), 99);
    }
}
