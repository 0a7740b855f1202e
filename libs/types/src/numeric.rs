//! Fixed-point price type
//!
//! Uses `rust_decimal` for deterministic arithmetic (no floating-point
//! errors). Quantities in this system are signed contract counts and stay
//! plain `i64`; only prices need decimal precision.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A trade or quote price with exact decimal arithmetic
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Create a price from a whole number
    pub fn from_u64(v: u64) -> Self {
        Self(Decimal::from(v))
    }

    /// Create a price from a decimal value
    pub fn from_decimal(d: Decimal) -> Self {
        Self(d)
    }

    /// Parse a price from a decimal string
    pub fn from_str(s: &str) -> Result<Self, rust_decimal::Error> {
        Ok(Self(Decimal::from_str(s)?))
    }

    /// Get the inner decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Shift the price by `n` ticks of `tick_size` in `direction`
    /// (+1 for Buy, -1 for Sell).
    pub fn offset_ticks(&self, direction: Decimal, n: u32, tick_size: Decimal) -> Self {
        Self(self.0 + direction * tick_size * Decimal::from(n))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
