//! Exact Currency Arithmetic
//!
//! Bill totals and unlock thresholds are compared against each other, so they
//! must never drift. All amounts are stored as whole minor units (paise, cents)
//! in an `i64` - no floats anywhere in the engine.
//!
//! ```text
//! Money(22050)  ==  220.50
//!       └─ minor units (1/100 of the major unit)
//! ```

use std::fmt;
use serde::{Serialize, Deserialize};

/// Minor units per major unit (100 paise = 1 rupee).
pub const MINOR_PER_MAJOR: i64 = 100;

/// An amount of money in minor units.
///
/// Serialized as the raw minor-unit integer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Money = Money(0);

    /// Create from minor units.
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Create from whole major units (`from_major(200)` is 200.00).
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Self(major * MINOR_PER_MAJOR)
    }

    /// Raw minor units.
    #[inline]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// True if strictly greater than zero.
    #[inline]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// True if below zero.
    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Checked addition. `None` on overflow.
    #[inline]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Checked multiplication by a count (quantity, cycle number).
    #[inline]
    pub fn checked_mul(self, count: u32) -> Option<Money> {
        self.0.checked_mul(count as i64).map(Money)
    }

    /// Subtraction clamped at zero.
    #[inline]
    pub fn saturating_sub_floor(self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }

    /// `percent`% of this amount, rounded down to the minor unit.
    ///
    /// Computed in i128 so large bills cannot overflow the intermediate.
    pub fn percent_of(self, percent: u8) -> Money {
        let scaled = (self.0 as i128 * percent as i128) / 100;
        Money(scaled as i64)
    }

    /// The smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self <= other { self } else { other }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_PER_MAJOR as u64;
        write!(f, "{}{}.{:02}", sign, abs / per, abs % per)
    }
}

// =============================================================================
// TESTS
// =============================================================================
