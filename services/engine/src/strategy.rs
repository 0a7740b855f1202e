//! Strategy trait and registry
//!
//! Strategies are passive: the engine calls them from bus handlers when an
//! event for their symbol arrives, and they answer by emitting Signal
//! events through their context. A callback error is caught at the dispatch
//! boundary and logged; it never takes the pipeline down.
//!
//! Implementations are looked up by kind in an explicit [`StrategyRegistry`]
//! built at startup. The shipped `bar-direction` strategy is deliberately
//! trivial (sign of the closed bar's body); real alpha lives outside this
//! workspace.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use event_bus::{EventBus, EventPayload, HandlerError};
use market_data::{Bar, MarketView};
use types::ids::Symbol;
use types::market::Tick;

use crate::config::{EngineError, StrategyConfig};

/// Per-instance view handed to every strategy callback
pub struct StrategyCtx {
    market: MarketView,
    bus: Arc<EventBus>,
    strategy: String,
    symbol: Symbol,
}

impl StrategyCtx {
    pub(crate) fn new(
        market: MarketView,
        bus: Arc<EventBus>,
        strategy: String,
        symbol: Symbol,
    ) -> Self {
        Self {
            market,
            bus,
            strategy,
            symbol,
        }
    }

    /// Read-only market state (latest ticks, orderbooks, bars)
    pub fn market(&self) -> &MarketView {
        &self.market
    }

    /// Symbol this strategy instance trades
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Publish a Signal event carrying the desired position in signal units
    pub fn emit_signal(&self, target_position: i64) {
        debug!(strategy = %self.strategy, symbol = %self.symbol, target_position, "signal");
        let payload = EventPayload::Signal {
            strategy: self.strategy.clone(),
            symbol: self.symbol.clone(),
            target_position,
        };
        if let Err(err) = self.bus.publish(payload) {
            warn!(strategy = %self.strategy, %err, "dropping signal, bus unavailable");
        }
    }
}

/// Event-driven trading strategy
///
/// All callbacks default to no-ops so an implementation only overrides the
/// events it cares about.
pub trait Strategy: Send {
    /// Called once before the engine starts
    fn on_init(&mut self, _ctx: &StrategyCtx) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called per trade print of the strategy's symbol
    fn on_tick(&mut self, _tick: &Tick, _ctx: &StrategyCtx) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called when a bar bucket of the configured width opens
    fn on_bar_open(&mut self, _bar: &Bar, _ctx: &StrategyCtx) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called when a bar bucket of the configured width closes
    fn on_bar_close(&mut self, _bar: &Bar, _ctx: &StrategyCtx) -> Result<(), HandlerError> {
        Ok(())
    }
}

type StrategyCtor =
    Box<dyn Fn(&StrategyConfig) -> Result<Box<dyn Strategy>, EngineError> + Send + Sync>;

/// Lookup table from strategy kind to constructor
#[derive(Default)]
pub struct StrategyRegistry {
    ctors: BTreeMap<String, StrategyCtor>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the strategies shipped in this crate
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("bar-direction", |cfg| {
            Ok(Box::new(BarDirectionStrategy::from_config(cfg)))
        });
        reg
    }

    /// Register a constructor under a kind name, replacing any previous one
    pub fn register<F>(&mut self, kind: impl Into<String>, ctor: F)
    where
        F: Fn(&StrategyConfig) -> Result<Box<dyn Strategy>, EngineError> + Send + Sync + 'static,
    {
        self.ctors.insert(kind.into(), Box::new(ctor));
    }

    /// Construct a strategy instance for one config entry
    pub fn build(&self, config: &StrategyConfig) -> Result<Box<dyn Strategy>, EngineError> {
        match self.ctors.get(&config.kind) {
            Some(ctor) => ctor(config),
            None => Err(EngineError::UnknownStrategy(config.kind.clone())),
        }
    }

    /// Registered kind names, sorted
    pub fn kinds(&self) -> Vec<&str> {
        self.ctors.keys().map(String::as_str).collect()
    }
}

/// Follows the sign of the closed bar's body
///
/// Long `unit` after an up bar, short `unit` after a down bar, flat after a
/// doji. Emits a signal only when the desired position changes.
pub struct BarDirectionStrategy {
    unit: i64,
    desired: i64,
}

impl BarDirectionStrategy {
    pub fn from_config(config: &StrategyConfig) -> Self {
        let unit = config
            .params
            .get("unit")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(1);
        Self { unit, desired: 0 }
    }
}

impl Strategy for BarDirectionStrategy {
    fn on_bar_close(&mut self, bar: &Bar, ctx: &StrategyCtx) -> Result<(), HandlerError> {
        let Some(close) = bar.close else {
            return Err(HandlerError::new("bar close callback with an open bar"));
        };
        let desired = if close > bar.open {
            self.unit
        } else if close < bar.open {
            -self.unit
        } else {
            0
        };
        if desired != self.desired {
            self.desired = desired;
            ctx.emit_signal(desired);
        }
        Ok(())
    }
}
