//! Normalized market-data records
//!
//! One `Tick` per exchange trade event and one `Orderbook` per book
//! snapshot. Both are immutable once constructed; caches hold only the
//! latest record per symbol (last-write-wins, no diffing).

use serde::{Deserialize, Serialize};

use crate::ids::Symbol;
use crate::numeric::Price;

/// A single trade print
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: Symbol,
    pub price: Price,
    /// Exchange event time, Unix nanoseconds
    pub timestamp: i64,
    /// Local arrival time, stamped when the record enters the latest-tick
    /// cache. `None` until then.
    pub receive_time: Option<i64>,
}

impl Tick {
    pub fn new(symbol: Symbol, price: Price, timestamp: i64) -> Self {
        Self {
            symbol,
            price,
            timestamp,
            receive_time: None,
        }
    }
}

/// One price level of an orderbook side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    pub size: i64,
}

/// A full orderbook snapshot for a symbol
///
/// Bids are ordered best-first (descending price), asks best-first
/// (ascending price). A new snapshot replaces the prior one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orderbook {
    pub symbol: Symbol,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    /// Exchange event time, Unix nanoseconds
    pub timestamp: i64,
    /// Local arrival time, stamped at cache update
    pub receive_time: Option<i64>,
}

impl Orderbook {
    pub fn new(
        symbol: Symbol,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
        timestamp: i64,
    ) -> Self {
        Self {
            symbol,
            bids,
            asks,
            timestamp,
            receive_time: None,
        }
    }

    /// Best bid price, if any depth exists
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    /// Best ask price, if any depth exists
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }
}
