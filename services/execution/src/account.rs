//! Account mirrors refreshed by the trading-connector feed
//!
//! Actual positions and per-side unfilled quantities are externally sourced
//! read-only mirrors: the trading connector pushes updates onto a bounded
//! channel, the `AccountFeed` ingestion loop applies them, and the executor
//! reads snapshots through [`AccountView`]. Same single-writer discipline
//! as the market cache.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use types::ids::Symbol;
use types::order::Side;

/// Outstanding order quantity per side for one symbol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideQty {
    pub buy: i64,
    pub sell: i64,
}

impl SideQty {
    /// Total outstanding quantity across both sides
    pub fn total(&self) -> i64 {
        self.buy.abs() + self.sell.abs()
    }
}

#[derive(Debug, Default)]
struct AccountState {
    positions: BTreeMap<Symbol, i64>,
    unfilled: BTreeMap<Symbol, SideQty>,
}

/// Read-only snapshot handle over the account mirrors
#[derive(Clone, Default)]
pub struct AccountView {
    inner: Arc<Mutex<AccountState>>,
}

impl AccountView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer handle for the trading-connector feed
    pub fn writer(&self) -> AccountWriter {
        AccountWriter {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Latest reported signed position; 0 if never reported
    pub fn actual_position(&self, symbol: &Symbol) -> i64 {
        self.lock().positions.get(symbol).copied().unwrap_or(0)
    }

    /// Latest reported outstanding quantities; zeroes if never reported
    pub fn unfilled_qty(&self, symbol: &Symbol) -> SideQty {
        self.lock().unfilled.get(symbol).copied().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AccountState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Single-writer handle applying connector updates to the mirrors
pub struct AccountWriter {
    inner: Arc<Mutex<AccountState>>,
}

impl AccountWriter {
    pub fn set_position(&self, symbol: Symbol, qty: i64) {
        debug!(%symbol, qty, "position mirror updated");
        self.lock().positions.insert(symbol, qty);
    }

    pub fn set_unfilled(&self, symbol: Symbol, side: Side, qty: i64) {
        let mut state = self.lock();
        let entry = state.unfilled.entry(symbol).or_default();
        match side {
            Side::Buy => entry.buy = qty,
            Side::Sell => entry.sell = qty,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AccountState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// An update pushed by the trading connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record_type")]
pub enum AccountRecord {
    Position { symbol: Symbol, qty: i64 },
    Unfilled { symbol: Symbol, side: Side, qty: i64 },
}

/// Feed configuration
#[derive(Debug, Clone)]
pub struct AccountFeedConfig {
    /// Idle window after which the loop logs a liveness warning
    pub idle_warn: Duration,
    /// Capacity of the feed channel
    pub feed_capacity: usize,
}

impl Default for AccountFeedConfig {
    fn default() -> Self {
        Self {
            idle_warn: Duration::from_secs(10),
            feed_capacity: 1_000,
        }
    }
}

/// Dedicated ingestion loop for the trading-connector feed
pub struct AccountFeed {
    rx: mpsc::Receiver<AccountRecord>,
    writer: AccountWriter,
    config: AccountFeedConfig,
}

impl AccountFeed {
    /// Build the feed loop and the sender half the connector pushes into
    pub fn new(
        view: &AccountView,
        config: AccountFeedConfig,
    ) -> (Self, mpsc::Sender<AccountRecord>) {
        let (tx, rx) = mpsc::channel(config.feed_capacity);
        (
            Self {
                rx,
                writer: view.writer(),
                config,
            },
            tx,
        )
    }

    /// Run until the feed channel closes. Intended to be spawned.
    pub async fn run(mut self) {
        info!("account feed started");
        loop {
            match tokio::time::timeout(self.config.idle_warn, self.rx.recv()).await {
                Ok(Some(AccountRecord::Position { symbol, qty })) => {
                    self.writer.set_position(symbol, qty)
                }
                Ok(Some(AccountRecord::Unfilled { symbol, side, qty })) => {
                    self.writer.set_unfilled(symbol, side, qty)
                }
                Ok(None) => {
                    info!("account feed closed, exiting");
                    break;
                }
                Err(_) => {
                    warn!(
                        idle_secs = self.config.idle_warn.as_secs(),
                        "no account update received within idle window"
                    );
                }
            }
        }
    }
}
