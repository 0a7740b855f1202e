//! Target-position executor
//!
//! Converts desired net positions into venue orders. A target-position
//! event arms a symbol; every subsequent tick or orderbook update for that
//! symbol drives one reconciliation pass: compare the target against the
//! account mirrors, cancel outstanding orders, and place a single limit
//! order for the delta with a bounded slippage allowance so it fills like
//! a marketable order without chasing a runaway print.
//!
//! Reconciliation is idempotent: while the account mirrors show the
//! reconciliation order resting at the venue, the executor waits for the
//! fill instead of re-issuing cancels and orders on every tick. If the
//! order vanishes unfilled, the next market update re-attempts.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use market_data::MarketView;
use types::ids::Symbol;
use types::instrument::InstrumentRegistry;
use types::order::Side;

use crate::account::AccountView;
use crate::connector::TradingConnector;

/// Slippage allowance, in ticks, added to the last trade price when
/// pricing the reconciliation order.
pub const SLIPPAGE_TICKS: u32 = 5;

/// Per-symbol reconciliation progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// No target has ever been set for the symbol
    NoTarget,
    /// A target is set and a reconciliation pass is due
    TargetSet,
    /// Cancel/order requests were issued; waiting on the account mirrors
    Reconciling,
    /// Actual position matches the target with nothing outstanding
    Reconciled,
}

/// Reconciles desired positions against actual exchange state
pub struct TargetPositionExecutor {
    symbols: BTreeSet<Symbol>,
    instruments: Arc<InstrumentRegistry>,
    market: MarketView,
    account: AccountView,
    connector: Arc<dyn TradingConnector>,
    targets: Mutex<BTreeMap<Symbol, i64>>,
    states: Mutex<BTreeMap<Symbol, ReconcileState>>,
}

impl TargetPositionExecutor {
    pub fn new(
        symbols: impl IntoIterator<Item = Symbol>,
        instruments: Arc<InstrumentRegistry>,
        market: MarketView,
        account: AccountView,
        connector: Arc<dyn TradingConnector>,
    ) -> Self {
        Self {
            symbols: symbols.into_iter().collect(),
            instruments,
            market,
            account,
            connector,
            targets: Mutex::new(BTreeMap::new()),
            states: Mutex::new(BTreeMap::new()),
        }
    }

    /// Current reconciliation state for a symbol
    pub fn state(&self, symbol: &Symbol) -> ReconcileState {
        self.lock_states()
            .get(symbol)
            .copied()
            .unwrap_or(ReconcileState::NoTarget)
    }

    /// Desired position for a symbol, if one has been set
    pub fn target(&self, symbol: &Symbol) -> Option<i64> {
        self.lock_targets().get(symbol).copied()
    }

    /// Apply a new set of desired positions
    ///
    /// Each tracked symbol whose desired quantity changed is re-armed and
    /// reconciled immediately. Repeated identical targets are skipped, so a
    /// resting reconciliation order is not cancelled by duplicate events.
    /// Tracked symbols absent from the map keep their previous target;
    /// untracked symbols are skipped with a warning.
    pub fn on_target_position(&self, targets: &BTreeMap<Symbol, i64>) {
        for (symbol, target) in targets {
            if !self.symbols.contains(symbol) {
                warn!(%symbol, target, "target for untracked symbol ignored");
                continue;
            }
            if self.target(symbol) == Some(*target) {
                debug!(%symbol, target, "target unchanged, not re-arming");
                continue;
            }
            info!(%symbol, target, "target position set");
            self.lock_targets().insert(symbol.clone(), *target);
            self.lock_states()
                .insert(symbol.clone(), ReconcileState::TargetSet);
            self.reconcile(symbol);
        }
    }

    /// Drive reconciliation from a fresh trade print
    pub fn on_tick(&self, symbol: &Symbol) {
        self.on_market_update(symbol);
    }

    /// Drive reconciliation from a fresh orderbook snapshot
    pub fn on_orderbook(&self, symbol: &Symbol) {
        self.on_market_update(symbol);
    }

    fn on_market_update(&self, symbol: &Symbol) {
        if !self.symbols.contains(symbol) {
            return;
        }
        match self.state(symbol) {
            ReconcileState::TargetSet | ReconcileState::Reconciling => {
                self.reconcile(symbol)
            }
            ReconcileState::NoTarget | ReconcileState::Reconciled => {}
        }
    }

    /// One reconciliation pass for a symbol
    ///
    /// While an order rests at the venue (`Reconciling` with outstanding
    /// quantity) this only checks for completion, so the order gets time to
    /// fill. If the mirrors show the order gone without the position
    /// reaching the target, the pass re-arms and places again.
    fn reconcile(&self, symbol: &Symbol) {
        let Some(target) = self.target(symbol) else {
            return;
        };
        let state = self.state(symbol);
        let actual = self.account.actual_position(symbol);
        let outstanding = self.account.unfilled_qty(symbol).total();

        if actual == target {
            if outstanding == 0 {
                if state != ReconcileState::Reconciled {
                    info!(%symbol, target, "target position reached");
                    self.set_state(symbol, ReconcileState::Reconciled);
                }
                return;
            }
            if state == ReconcileState::Reconciling {
                // cancel already issued; wait for the mirrors to catch up
                return;
            }
            // position is right but stale orders are resting
            match self.connector.cancel_all_orders(symbol) {
                Ok(res) if res.ok => {
                    debug!(%symbol, outstanding, "cancelled stale orders at target");
                    self.set_state(symbol, ReconcileState::Reconciling);
                }
                Ok(res) => warn!(%symbol, body = %res.body, "cancel-all refused"),
                Err(e) => warn!(%symbol, error = %e, "cancel-all failed"),
            }
            return;
        }

        if state == ReconcileState::Reconciling {
            if outstanding > 0 {
                // order resting at the venue; give it time to fill
                return;
            }
            // mirrors show no working order and the wrong position: the
            // order was cancelled or expired at the venue, re-arm
            warn!(%symbol, target, actual, "resting order vanished, re-arming");
            self.set_state(symbol, ReconcileState::TargetSet);
        }

        let Some(tick) = self.market.latest_tick(symbol) else {
            warn!(%symbol, "no last trade price, deferring reconciliation");
            return;
        };

        match self.connector.cancel_all_orders(symbol) {
            Ok(res) if res.ok => {}
            Ok(res) => {
                warn!(%symbol, body = %res.body, "cancel-all refused, aborting pass");
                return;
            }
            Err(e) => {
                warn!(%symbol, error = %e, "cancel-all failed, aborting pass");
                return;
            }
        }

        let diff = target - actual;
        let side = if diff > 0 { Side::Buy } else { Side::Sell };
        let qty = diff.abs();

        let tick_size = match self.instruments.get(symbol) {
            Some(i) => i.tick_size,
            None => {
                warn!(%symbol, "no instrument metadata, placing without slippage allowance");
                Decimal::ZERO
            }
        };
        let limit = tick
            .price
            .offset_ticks(side.direction(), SLIPPAGE_TICKS, tick_size);

        match self.connector.place_order(symbol, side, qty, limit) {
            Ok(res) if res.ok => {
                info!(%symbol, %side, qty, %limit, "reconciliation order placed");
                self.set_state(symbol, ReconcileState::Reconciling);
            }
            Ok(res) => {
                warn!(%symbol, %side, qty, body = %res.body, "order refused, will retry")
            }
            Err(e) => warn!(%symbol, %side, qty, error = %e, "order failed, will retry"),
        }
    }

    fn set_state(&self, symbol: &Symbol, state: ReconcileState) {
        self.lock_states().insert(symbol.clone(), state);
    }

    fn lock_targets(&self) -> std::sync::MutexGuard<'_, BTreeMap<Symbol, i64>> {
        self.targets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_states(&self) -> std::sync::MutexGuard<'_, BTreeMap<Symbol, ReconcileState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }
}
