//! Execution Service
//!
//! Reconciles desired ("target") positions against actual exchange state.
//! The executor consumes target-position events, reads the latest trade
//! price and the asynchronously-refreshed account mirrors, and converts any
//! delta into a cancel-all plus a single limit order with a bounded
//! slippage allowance.
//!
//! The exchange itself stays behind the [`TradingConnector`] trait; REST
//! and WebSocket wrappers live outside this crate.

pub mod account;
pub mod connector;
pub mod executor;
pub mod mock;

pub use account::{AccountFeed, AccountFeedConfig, AccountRecord, AccountView, AccountWriter, SideQty};
pub use connector::{ConnectorError, OrderResult, TradingConnector};
pub use executor::{ReconcileState, TargetPositionExecutor, SLIPPAGE_TICKS};
pub use mock::{ConnectorCall, RecordingConnector};
