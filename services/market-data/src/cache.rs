//! Shared market-state cache
//!
//! The aggregator's ingestion loop is the single writer; strategies and the
//! executor read from the bus dispatch thread through `MarketView`. All
//! access goes through one mutex with short critical sections, so readers
//! never observe a half-applied rollover.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use types::bar::BarType;
use types::ids::Symbol;
use types::market::{Orderbook, Tick};

use crate::bars::Bar;

/// Current/previous bar slots for one (symbol, bar_type) subscription
#[derive(Debug, Clone, Default)]
pub(crate) struct BarPair {
    /// Bucket currently accumulating ticks. `None` until the first tick.
    pub current: Option<Bar>,
    /// Most recently closed bucket. `None` until the first rollover.
    pub previous: Option<Bar>,
}

#[derive(Debug, Default)]
pub(crate) struct MarketCache {
    pub ticks: BTreeMap<Symbol, Tick>,
    pub orderbooks: BTreeMap<Symbol, Orderbook>,
    pub bars: BTreeMap<(Symbol, BarType), BarPair>,
}

/// Read-only handle over the market cache, safe to clone into handlers and
/// other threads.
#[derive(Clone)]
pub struct MarketView {
    pub(crate) inner: Arc<Mutex<MarketCache>>,
}

impl MarketView {
    pub(crate) fn new(inner: Arc<Mutex<MarketCache>>) -> Self {
        Self { inner }
    }

    /// Latest trade print for a symbol
    pub fn latest_tick(&self, symbol: &Symbol) -> Option<Tick> {
        self.lock().ticks.get(symbol).cloned()
    }

    /// Latest orderbook snapshot for a symbol
    pub fn latest_orderbook(&self, symbol: &Symbol) -> Option<Orderbook> {
        self.lock().orderbooks.get(symbol).cloned()
    }

    /// Bucket currently accumulating ticks for (symbol, bar_type)
    pub fn current_bar(&self, symbol: &Symbol, bar_type: BarType) -> Option<Bar> {
        self.lock()
            .bars
            .get(&(symbol.clone(), bar_type))
            .and_then(|p| p.current.clone())
    }

    /// Most recently closed bucket for (symbol, bar_type)
    pub fn prev_bar(&self, symbol: &Symbol, bar_type: BarType) -> Option<Bar> {
        self.lock()
            .bars
            .get(&(symbol.clone(), bar_type))
            .and_then(|p| p.previous.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MarketCache> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
