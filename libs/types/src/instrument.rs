//! Instrument metadata and startup registry
//!
//! The registry is an explicit object built once at startup and passed by
//! reference into components that need tick-size lookups. There is no
//! process-wide table; a symbol missing from the registry is a warning
//! condition handled by the caller, never a fault.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::Symbol;

/// Static metadata for one tradeable instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: Symbol,
    /// Minimum price increment
    pub tick_size: Decimal,
    /// Minimum order quantity, in contracts
    pub lot_size: i64,
}

/// Lookup table of instrument metadata, keyed by symbol
#[derive(Debug, Clone, Default)]
pub struct InstrumentRegistry {
    instruments: BTreeMap<Symbol, Instrument>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of instruments
    pub fn from_instruments(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        Self {
            instruments: instruments
                .into_iter()
                .map(|i| (i.symbol.clone(), i))
                .collect(),
        }
    }

    /// Insert or replace an instrument
    pub fn insert(&mut self, instrument: Instrument) {
        self.instruments.insert(instrument.symbol.clone(), instrument);
    }

    /// Look up metadata for a symbol
    pub fn get(&self, symbol: &Symbol) -> Option<&Instrument> {
        self.instruments.get(symbol)
    }

    /// Number of registered instruments
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
