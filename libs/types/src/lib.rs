//! Types library for the live trading pipeline
//!
//! Provides the core domain types shared by every service crate: symbols,
//! fixed-point prices, normalized market-data records, order sides, and
//! instrument metadata.
//!
//! # Modules
//! - `ids`: symbol identifier
//! - `numeric`: fixed-point price type
//! - `market`: normalized Tick and Orderbook records
//! - `bar`: bar-type labels and bucket keys
//! - `order`: order side
//! - `instrument`: instrument metadata and startup registry
//! - `time`: wall-clock helpers

pub mod bar;
pub mod ids;
pub mod instrument;
pub mod market;
pub mod numeric;
pub mod order;
pub mod time;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bar::*;
    pub use crate::ids::*;
    pub use crate::instrument::*;
    pub use crate::market::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::time::*;
}
