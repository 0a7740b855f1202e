//! Market Data Service
//!
//! Consumes normalized tick and orderbook records from the exchange
//! connector and produces:
//! - Latest-tick and latest-orderbook caches (last-write-wins per symbol)
//! - Fixed-width OHLC bars with close-then-open rollover semantics
//! - Tick / Orderbook / BarOpen / BarClose events on the bus
//!
//! # Architecture
//!
//! ```text
//! Exchange connector (external)
//!        │  bounded channel
//!    ┌───▼────┐
//!    │ Router │  ← bounded-wait receive, idle liveness warning
//!    └───┬────┘
//!        │
//!   ┌────▼───────┐     ┌──────────────┐
//!   │ Aggregator │ ──▶ │ MarketCache  │ ◀─ MarketView (readers on other
//!   └────┬───────┘     └──────────────┘    threads: strategies, executor)
//!        │
//!   EventBus (BarClose → BarOpen → Tick, in that order per rollover)
//! ```

pub mod bars;
pub mod cache;
pub mod router;

pub use bars::{Bar, BarAggregator};
pub use cache::MarketView;
pub use router::{MarketDataRouter, MarketRecord, RouterConfig};
