//! Pipeline wiring
//!
//! The engine owns the whole object graph: bus, aggregator, ingestion
//! loops, portfolio, executor, and strategy instances. Handlers are
//! registered at construction, before the bus starts; `start` launches the
//! dispatch loop and the ingestion tasks, `stop` unwinds them in reverse —
//! feeds drain and join first so nothing publishes into a dead bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use event_bus::{BusConfig, EventBus, EventKey, EventPayload};
use execution::{
    AccountFeed, AccountFeedConfig, AccountRecord, AccountView, ReconcileState,
    TargetPositionExecutor, TradingConnector,
};
use market_data::{BarAggregator, MarketDataRouter, MarketRecord, MarketView, RouterConfig};
use types::ids::Symbol;
use types::instrument::InstrumentRegistry;

use crate::config::{EngineConfig, EngineError};
use crate::portfolio::NaivePortfolio;
use crate::strategy::{Strategy, StrategyCtx, StrategyRegistry};

/// The assembled trading pipeline
pub struct TradingEngine {
    bus: Arc<EventBus>,
    executor: Arc<TargetPositionExecutor>,
    view: MarketView,
    account: AccountView,
    market_tx: Option<mpsc::Sender<MarketRecord>>,
    account_tx: Option<mpsc::Sender<AccountRecord>>,
    router: Option<MarketDataRouter>,
    account_feed: Option<AccountFeed>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for TradingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingEngine").finish_non_exhaustive()
    }
}

impl TradingEngine {
    /// Build the pipeline from configuration. Registers every handler;
    /// nothing runs until [`start`](Self::start).
    pub fn new(
        config: &EngineConfig,
        instruments: Arc<InstrumentRegistry>,
        connector: Arc<dyn TradingConnector>,
        strategies: &StrategyRegistry,
    ) -> Result<Self, EngineError> {
        let bus = Arc::new(EventBus::new(BusConfig {
            idle_warn: Duration::from_secs(config.bus_idle_warn_secs),
        }));
        let symbols = config.symbols();

        let mut aggregator = BarAggregator::new(symbols.iter().cloned(), Arc::clone(&bus));
        for sc in &config.symbols {
            for &bar_type in &sc.bar_types {
                aggregator.register_bar(sc.symbol.clone(), bar_type);
            }
            if sc.emit_ticks {
                aggregator.register_tick_events(sc.symbol.clone());
            }
            if sc.emit_orderbooks {
                aggregator.register_orderbook_events(sc.symbol.clone());
            }
        }
        let view = aggregator.view();

        let feed_idle = Duration::from_secs(config.feed_idle_warn_secs);
        let (router, market_tx) = MarketDataRouter::new(
            aggregator,
            RouterConfig {
                idle_warn: feed_idle,
                ..RouterConfig::default()
            },
        );

        let account = AccountView::new();
        let (account_feed, account_tx) = AccountFeed::new(
            &account,
            AccountFeedConfig {
                idle_warn: feed_idle,
                ..AccountFeedConfig::default()
            },
        );

        let executor = Arc::new(TargetPositionExecutor::new(
            symbols.iter().cloned(),
            instruments,
            view.clone(),
            account.clone(),
            connector,
        ));
        Self::wire_executor(&bus, &executor, &symbols);

        let portfolio = Arc::new(NaivePortfolio::new(config.multipliers(), Arc::clone(&bus)));
        bus.register(EventKey::Signal, move |e| {
            if let EventPayload::Signal {
                strategy,
                symbol,
                target_position,
            } = &e.payload
            {
                portfolio.on_signal(strategy, symbol, *target_position);
            }
            Ok(())
        });

        for sc in &config.strategies {
            let mut instance = strategies.build(sc)?;
            let ctx = Arc::new(StrategyCtx::new(
                view.clone(),
                Arc::clone(&bus),
                sc.name.clone(),
                sc.symbol.clone(),
            ));
            if let Err(err) = instance.on_init(&ctx) {
                warn!(strategy = %sc.name, %err, "strategy init failed");
            }
            Self::wire_strategy(&bus, &view, sc, instance, ctx);
            info!(strategy = %sc.name, kind = %sc.kind, symbol = %sc.symbol, "strategy wired");
        }

        Ok(Self {
            bus,
            executor,
            view,
            account,
            market_tx: Some(market_tx),
            account_tx: Some(account_tx),
            router: Some(router),
            account_feed: Some(account_feed),
            tasks: Vec::new(),
        })
    }

    fn wire_executor(
        bus: &Arc<EventBus>,
        executor: &Arc<TargetPositionExecutor>,
        symbols: &[Symbol],
    ) {
        let exec = Arc::clone(executor);
        bus.register(EventKey::TargetPosition, move |e| {
            if let EventPayload::TargetPosition { targets } = &e.payload {
                exec.on_target_position(targets);
            }
            Ok(())
        });

        for symbol in symbols {
            let exec = Arc::clone(executor);
            let sym = symbol.clone();
            bus.register(EventKey::Tick(symbol.clone()), move |_| {
                exec.on_tick(&sym);
                Ok(())
            });

            let exec = Arc::clone(executor);
            let sym = symbol.clone();
            bus.register(EventKey::Orderbook(symbol.clone()), move |_| {
                exec.on_orderbook(&sym);
                Ok(())
            });
        }
    }

    fn wire_strategy(
        bus: &Arc<EventBus>,
        view: &MarketView,
        config: &crate::config::StrategyConfig,
        instance: Box<dyn Strategy>,
        ctx: Arc<StrategyCtx>,
    ) {
        let instance = Arc::new(Mutex::new(instance));

        {
            let instance = Arc::clone(&instance);
            let ctx = Arc::clone(&ctx);
            let view = view.clone();
            let sym = config.symbol.clone();
            bus.register(EventKey::Tick(config.symbol.clone()), move |_| {
                let Some(tick) = view.latest_tick(&sym) else {
                    return Ok(());
                };
                instance
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .on_tick(&tick, &ctx)
            });
        }

        let Some(bar_type) = config.bar_type else {
            return;
        };

        {
            let instance = Arc::clone(&instance);
            let ctx = Arc::clone(&ctx);
            let view = view.clone();
            let sym = config.symbol.clone();
            bus.register(
                EventKey::BarOpen(config.symbol.clone(), bar_type),
                move |_| {
                    let Some(bar) = view.current_bar(&sym, bar_type) else {
                        return Ok(());
                    };
                    instance
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .on_bar_open(&bar, &ctx)
                },
            );
        }

        {
            let view = view.clone();
            let sym = config.symbol.clone();
            bus.register(
                EventKey::BarClose(config.symbol.clone(), bar_type),
                move |_| {
                    let Some(bar) = view.prev_bar(&sym, bar_type) else {
                        return Ok(());
                    };
                    instance
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .on_bar_close(&bar, &ctx)
                },
            );
        }
    }

    /// Launch the dispatch loop and the ingestion tasks
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.bus.start()?;
        if let Some(router) = self.router.take() {
            self.tasks.push(tokio::spawn(router.run()));
        }
        if let Some(feed) = self.account_feed.take() {
            self.tasks.push(tokio::spawn(feed.run()));
        }
        info!("trading engine started");
        Ok(())
    }

    /// Drain and join the ingestion tasks, then stop the bus
    ///
    /// Callers must drop any sender clones first or the join waits forever.
    pub async fn stop(&mut self) -> Result<(), EngineError> {
        self.market_tx.take();
        self.account_tx.take();
        for task in self.tasks.drain(..) {
            if task.await.is_err() {
                error!("ingestion task terminated abnormally");
            }
        }
        self.bus.stop().await?;
        info!("trading engine stopped");
        Ok(())
    }

    /// Sender half of the market-data feed, for the exchange connector
    pub fn market_sender(&self) -> Option<mpsc::Sender<MarketRecord>> {
        self.market_tx.clone()
    }

    /// Sender half of the account feed, for the trading connector
    pub fn account_sender(&self) -> Option<mpsc::Sender<AccountRecord>> {
        self.account_tx.clone()
    }

    /// Read-only market state
    pub fn market(&self) -> &MarketView {
        &self.view
    }

    /// Read-only account mirrors
    pub fn account(&self) -> &AccountView {
        &self.account
    }

    /// The bus, for registering additional handlers before `start`
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Executor progress for a symbol
    pub fn reconcile_state(&self, symbol: &Symbol) -> ReconcileState {
        self.executor.state(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use execution::RecordingConnector;

    fn config() -> EngineConfig {
        EngineConfig::from_json(
            r#"{
                "symbols": [{ "symbol": "XBTUSD", "bar_types": ["1m"] }],
                "strategies": [{
                    "name": "trend-xbt",
                    "kind": "bar-direction",
                    "symbol": "XBTUSD",
                    "bar_type": "1m"
                }]
            }"#,
        )
        .unwrap()
    }

    fn connector() -> Arc<dyn TradingConnector> {
        Arc::new(RecordingConnector::new())
    }

    #[tokio::test]
    async fn test_engine_builds_and_stops_cleanly() {
        let mut engine = TradingEngine::new(
            &config(),
            Arc::new(InstrumentRegistry::new()),
            connector(),
            &StrategyRegistry::with_builtins(),
        )
        .unwrap();

        engine.start().unwrap();
        engine.stop().await.unwrap();

        assert!(engine.market_sender().is_none());
    }

    #[test]
    fn test_unknown_strategy_kind_fails_construction() {
        let mut cfg = config();
        cfg.strategies[0].kind = "no-such-strategy".to_string();

        let err = TradingEngine::new(
            &cfg,
            Arc::new(InstrumentRegistry::new()),
            connector(),
            &StrategyRegistry::with_builtins(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::UnknownStrategy(_)));
    }
}
