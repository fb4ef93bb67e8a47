//! Amount
//!
//! Amounts are denominated in the unit of the token or request carrying them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Amount Error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Amount overflow
    #[error("Amount Overflow")]
    AmountOverflow,
    /// Invalid amount
    #[error("Invalid Amount: {0}")]
    InvalidAmount(String),
}

/// Amount in the smallest unit
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .parse::<u64>()
            .map_err(|_| Error::InvalidAmount(s.to_owned()))?;
        Ok(Amount(value))
    }
}

impl Amount {
    /// Amount zero
    pub const ZERO: Amount = Amount(0);

    /// Amount one
    pub const ONE: Amount = Amount(1);

    /// Split into powers of two, largest first
    ///
    /// Keysets sign one key per power of two so this is the canonical set of
    /// output denominations for an amount.
    pub fn split(&self) -> Vec<Self> {
        let mut remaining = self.0;
        let mut parts = Vec::with_capacity(remaining.count_ones() as usize);
        while remaining > 0 {
            let part = 1u64 << (63 - remaining.leading_zeros());
            parts.push(Amount(part));
            remaining -= part;
        }
        parts
    }

    /// Checked addition for Amount. Returns None if overflow occurs.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction for Amount. Returns None if overflow occurs.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Try sum to check for overflow
    pub fn try_sum<I>(iter: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Self>,
    {
        iter.into_iter().try_fold(Amount::ZERO, |acc, x| {
            acc.checked_add(x).ok_or(Error::AmountOverflow)
        })
    }

    /// Round a caller supplied number to the nearest non-negative amount
    pub fn from_rounded(value: f64) -> Result<Self, Error> {
        if !value.is_finite() {
            return Err(Error::InvalidAmount(value.to_string()));
        }
        let rounded = value.round().max(0.0);
        if rounded >= u64::MAX as f64 {
            return Err(Error::AmountOverflow);
        }
        Ok(Amount(rounded as u64))
    }

    /// Convert to u64
    pub fn to_u64(self) -> u64 {
        self.0
    }
}

/// Greedy power of two decomposition of `amount`
pub fn split_into_denominations(amount: u64) -> Vec<u64> {
    Amount(amount).split().into_iter().map(u64::from).collect()
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(width) = f.width() {
            write!(f, "{:width$}", self.0, width = width)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Amount> for u64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}
