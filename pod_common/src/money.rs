use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// Number of minor units (cents) in one major currency unit.
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

//--------------------------------------       Money         ---------------------------------------------------------
/// A monetary amount held as an integer count of minor units, so that sums and products are exact.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(minor_units: i64) -> Self {
        Self(minor_units)
    }
}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| MoneyConversionError(format!("Value {value} is too large to convert to Money")))
    }
}

impl Money {
    /// The amount in minor units.
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major(major: i64) -> Self {
        Self(major * MINOR_UNITS_PER_MAJOR)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Multiplies the amount by a line-item quantity. Returns `None` on overflow.
    pub fn checked_mul(self, quantity: i64) -> Option<Self> {
        self.0.checked_mul(quantity).map(Self)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_UNITS_PER_MAJOR.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / per, abs % per)
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    /// Parses decimal strings such as `"100"`, `"99.5"` or `"-12.05"`. More than two fractional digits is an error,
    /// since the value could not be stored without rounding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || MoneyConversionError(s.to_string());
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if whole.is_empty() || frac.len() > 2 || !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        let whole = whole.parse::<i64>().map_err(|_| err())?;
        let frac = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| err())? * 10,
            _ => frac.parse::<i64>().map_err(|_| err())?,
        };
        let minor = whole.checked_mul(MINOR_UNITS_PER_MAJOR).and_then(|w| w.checked_add(frac)).ok_or_else(err)?;
        Ok(Self(if negative { -minor } else { minor }))
    }
}
