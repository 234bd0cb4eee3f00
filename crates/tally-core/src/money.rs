//! # Money Module
//!
//! Provides the `Money` type for monetary values in integral minor units.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE BALANCING PROBLEM                                                  │
//! │                                                                         │
//! │  A journal entry must satisfy   Σ debit == Σ credit                     │
//! │                                                                         │
//! │  With floats:  0.1 + 0.2 != 0.3      → "balanced" entries rejected      │
//! │                                         or unbalanced ones accepted     │
//! │                                                                         │
//! │  With i64 minor units the comparison is exact, no epsilon needed.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Formatting money for people (symbols, separators, locales) is an adapter
//! concern; `Display` here prints the raw minor-unit integer.
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//!
//! let cost = Money::from_minor(1099);
//! let total = cost.checked_mul(3).unwrap();
//! assert_eq!(total.minor(), 3297);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// A monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: account balances can go below zero; input amounts
///   are validated as non-negative before they reach an aggregate
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Checked arithmetic**: sums of untrusted input use `checked_*` so an
///   overflow is a rejection, never a wrap
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let amount = Money::from_minor(5000);
    /// assert_eq!(amount.minor(), 5000);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds two values, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Subtracts two values, returning `None` on overflow.
    #[inline]
    pub const fn checked_sub(self, other: Money) -> Option<Money> {
        match self.0.checked_sub(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    #[inline]
    pub const fn checked_mul(self, qty: i64) -> Option<Money> {
        match self.0.checked_mul(qty) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Sums an iterator of values, returning `None` if any step overflows.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let amounts = [Money::from_minor(2000), Money::from_minor(3000)];
    /// assert_eq!(Money::checked_sum(amounts), Some(Money::from_minor(5000)));
    ///
    /// let huge = [Money::from_minor(i64::MAX), Money::from_minor(1)];
    /// assert_eq!(Money::checked_sum(huge), None);
    /// ```
    pub fn checked_sum<I>(iter: I) -> Option<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        iter.into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }
}

// =============================================================================
// Operator Implementations
// =============================================================================
// The unchecked operators are for values already bounded by validation
// (e.g. per-account deltas built from checked totals).

impl Add for Money {
    type Output = Money;

    #[inline]
    fn add(self, other: Money) -> Money {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Money) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Money;

    #[inline]
    fn sub(self, other: Money) -> Money {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Money) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Money;

    #[inline]
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl From<i64> for Money {
    #[inline]
    fn from(minor: i64) -> Self {
        Money(minor)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
