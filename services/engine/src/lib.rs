//! Engine Service
//!
//! Orchestrates the market-data-to-decision pipeline:
//!
//! ```text
//! market feed ─► router ─► aggregator ─► bus ─► strategies ─► portfolio
//!                                         │                       │
//! account feed ─► mirrors ◄── connector ◄─┴── executor ◄── targets┘
//! ```
//!
//! Configuration comes from one JSON document; strategy implementations are
//! looked up by kind in a registry built at startup.

pub mod config;
pub mod engine;
pub mod portfolio;
pub mod strategy;

pub use config::{EngineConfig, EngineError, StrategyConfig, SymbolConfig};
pub use engine::TradingEngine;
pub use portfolio::NaivePortfolio;
pub use strategy::{BarDirectionStrategy, Strategy, StrategyCtx, StrategyRegistry};
