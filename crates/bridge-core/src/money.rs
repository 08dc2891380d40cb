//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  The Kounta API reports prices as JSON decimals:                        │
//! │    {"price": 10.99}                                                     │
//! │                                                                         │
//! │  Comparing those decimals with the storefront price as f64 risks        │
//! │  false "changed" detections from representation noise:                  │
//! │    0.1 + 0.2 != 0.3                                                     │
//! │                                                                         │
//! │  OUR SOLUTION: normalize to integer cents at the API boundary.          │
//! │    10.99  ──►  Money(1099)                                              │
//! │  Change detection becomes exact integer equality, and the order         │
//! │  idempotency tolerance of ±0.05 becomes an exact ±5 cents.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: allows negative values for refunds and adjustments
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Remote conversion at the boundary**: `from_remote` / `to_remote` are
///   the only places a float ever touches a price
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Normalizes a remote decimal amount (e.g. `10.99`) to cents.
    ///
    /// Rounds half away from zero, matching how the remote API formats
    /// two-decimal amounts. Non-finite inputs normalize to zero; the remote
    /// API never produces them, but a defaulted JSON field can.
    pub fn from_remote(amount: f64) -> Self {
        if !amount.is_finite() {
            return Money(0);
        }
        Money((amount * 100.0).round() as i64)
    }

    /// Converts back to the remote API's decimal representation.
    #[inline]
    pub fn to_remote(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Absolute difference between two amounts.
    ///
    /// Used by the order idempotency search: two totals "match" when their
    /// difference is within the configured tolerance.
    #[inline]
    pub const fn abs_diff(self, other: Money) -> Money {
        Money((self.0 - other.0).abs())
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

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl fmt::Display for Money {
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
    fn test_from_remote_rounds_to_cents() {
        assert_eq!(Money::from_remote(10.99).cents(), 1099);
        assert_eq!(Money::from_remote(0.1).cents(), 10);
        // Representation noise must not leak into cents
        assert_eq!(Money::from_remote(0.1 + 0.2).cents(), 30);
        assert_eq!(Money::from_remote(-5.50).cents(), -550);
    }

    #[test]
    fn test_from_remote_non_finite_is_zero() {
        assert_eq!(Money::from_remote(f64::NAN).cents(), 0);
        assert_eq!(Money::from_remote(f64::INFINITY).cents(), 0);
    }

    #[test]
    fn test_round_trip() {
        let price = Money::from_cents(1099);
        assert_eq!(Money::from_remote(price.to_remote()), price);
    }

    #[test]
    fn test_abs_diff() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(1004);
        assert_eq!(a.abs_diff(b).cents(), 4);
        assert_eq!(b.abs_diff(a).cents(), 4);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
    }

    #[test]
    fn test_arithmetic() {
        let total = Money::from_cents(1000) + Money::from_cents(250);
        assert_eq!(total.cents(), 1250);
        assert_eq!((total - Money::from_cents(250)).cents(), 1000);
    }
}
