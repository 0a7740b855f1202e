//! Naive signal-to-target aggregation
//!
//! Folds per-strategy signals into net desired positions: for each symbol,
//! the sum of its strategies' signal units times the configured multiplier.
//! A TargetPosition event is published only when some net target actually
//! changes, so the executor is not re-armed by repeated identical signals.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use event_bus::{EventBus, EventPayload};
use types::ids::Symbol;

#[derive(Default)]
struct PortfolioState {
    /// Latest signal units per (symbol, strategy instance)
    signals: BTreeMap<Symbol, BTreeMap<String, i64>>,
    /// Net targets as last published
    published: BTreeMap<Symbol, i64>,
}

/// Sums strategy signals into per-symbol net targets
pub struct NaivePortfolio {
    multipliers: BTreeMap<Symbol, i64>,
    bus: Arc<EventBus>,
    state: Mutex<PortfolioState>,
}

impl NaivePortfolio {
    pub fn new(multipliers: BTreeMap<Symbol, i64>, bus: Arc<EventBus>) -> Self {
        Self {
            multipliers,
            bus,
            state: Mutex::new(PortfolioState::default()),
        }
    }

    /// Fold one strategy signal in; publish the full target map if any net
    /// target changed.
    pub fn on_signal(&self, strategy: &str, symbol: &Symbol, target_position: i64) {
        let targets = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state
                .signals
                .entry(symbol.clone())
                .or_default()
                .insert(strategy.to_string(), target_position);

            let units: i64 = state.signals[symbol].values().sum();
            let multiplier = self.multipliers.get(symbol).copied().unwrap_or(1);
            let net = units * multiplier;

            if state.published.get(symbol).copied().unwrap_or(0) == net {
                return;
            }
            state.published.insert(symbol.clone(), net);
            state.published.clone()
        };

        info!(%symbol, target = targets[symbol], "net target changed");
        if let Err(err) = self
            .bus
            .publish(EventPayload::TargetPosition { targets })
        {
            warn!(%err, "dropping target update, bus unavailable");
        }
    }

    /// Net targets as last published
    pub fn targets(&self) -> BTreeMap<Symbol, i64> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .published
            .clone()
    }
}
