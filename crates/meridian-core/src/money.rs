//! # Money Module
//!
//! Monetary values as integer minor units (cents).
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:  0.1 + 0.2 = 0.30000000000000004  ❌                │
//! │                                                                         │
//! │  OUR SOLUTION: integer cents everywhere. The database, the wire and     │
//! │  all arithmetic use i64 cents; only the UI formats a decimal string.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Order totals are accumulated with *checked* arithmetic: an overflowing
//! cart is a validation failure, never a silent wrap.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

/// A monetary value in the smallest currency unit (cents).
///
/// Signed so refunds and compensating adjustments can be negative.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
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

    /// Zero money value.
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

    /// Checked addition; `None` on overflow.
    #[inline]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Checked multiplication by a quantity; `None` on overflow.
    ///
    /// This is the line-total operation: `unit_price.checked_mul(quantity)`.
    #[inline]
    pub fn checked_mul(self, quantity: i64) -> Option<Money> {
        self.0.checked_mul(quantity).map(Money)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), Add::add)
    }
}

impl fmt::Display for Money {
    /// Formats as a decimal string, e.g. `1099` cents -> `10.99`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents_roundtrip() {
        let price = Money::from_cents(1099);
        assert_eq!(price.cents(), 1099);
    }

    #[test]
    fn test_checked_mul_line_total() {
        let unit = Money::from_cents(1000);
        assert_eq!(unit.checked_mul(3), Some(Money::from_cents(3000)));
    }

    #[test]
    fn test_checked_mul_overflow() {
        let unit = Money::from_cents(i64::MAX);
        assert_eq!(unit.checked_mul(2), None);
    }

    #[test]
    fn test_checked_add_overflow() {
        let a = Money::from_cents(i64::MAX);
        assert_eq!(a.checked_add(Money::from_cents(1)), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 200, 300].iter().map(|c| Money::from_cents(*c)).sum();
        assert_eq!(total, Money::from_cents(600));
    }
}
