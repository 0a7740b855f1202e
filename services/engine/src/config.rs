//! Engine configuration
//!
//! One JSON document describes the whole pipeline: which symbols to track,
//! which bar widths to derive, which raw events to emit, the per-symbol
//! position multipliers, and the strategy instances to run.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use event_bus::BusError;
use types::bar::BarType;
use types::ids::Symbol;

/// Errors from engine construction and configuration
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown strategy kind: {0}")]
    UnknownStrategy(String),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Per-symbol pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub symbol: Symbol,
    /// Bar widths to derive for this symbol
    #[serde(default)]
    pub bar_types: Vec<BarType>,
    /// Emit a Tick event per trade print
    #[serde(default)]
    pub emit_ticks: bool,
    /// Emit an Orderbook event per snapshot
    #[serde(default)]
    pub emit_orderbooks: bool,
    /// Contracts per unit of strategy signal
    #[serde(default = "default_multiplier")]
    pub multiplier: i64,
}

fn default_multiplier() -> i64 {
    1
}

/// One strategy instance to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Instance name, used in Signal events and logs
    pub name: String,
    /// Registry key of the strategy implementation
    pub kind: String,
    pub symbol: Symbol,
    /// Bar width driving the bar callbacks; `None` for tick-only strategies
    #[serde(default)]
    pub bar_type: Option<BarType>,
    /// Free-form strategy parameters
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub symbols: Vec<SymbolConfig>,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
    /// Bus dispatch idle-warning window, seconds
    #[serde(default = "default_bus_idle_warn_secs")]
    pub bus_idle_warn_secs: u64,
    /// Ingestion feed idle-warning window, seconds
    #[serde(default = "default_feed_idle_warn_secs")]
    pub feed_idle_warn_secs: u64,
}

fn default_bus_idle_warn_secs() -> u64 {
    5
}

fn default_feed_idle_warn_secs() -> u64 {
    10
}

impl EngineConfig {
    /// Parse a configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Tracked symbols, in config order
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().map(|s| s.symbol.clone()).collect()
    }

    /// Per-symbol position multipliers
    pub fn multipliers(&self) -> BTreeMap<Symbol, i64> {
        self.symbols
            .iter()
            .map(|s| (s.symbol.clone(), s.multiplier))
            .collect()
    }
}
