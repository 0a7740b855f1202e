//! Market-data router
//!
//! The dedicated ingestion loop for the market-data feed. Pulls normalized
//! records off a bounded channel with a bounded-wait receive, warns on idle
//! windows, and hands each record to the aggregator.
//!
//! Shutdown is cooperative: the exchange connector drops its sender, the
//! loop drains what is queued and exits. The owner must await the router
//! task before stopping the bus, so nothing publishes into a dead bus.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use types::market::{Orderbook, Tick};

use crate::bars::BarAggregator;

/// A normalized record pushed by the exchange connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record_type")]
pub enum MarketRecord {
    Tick(Tick),
    Orderbook(Orderbook),
}

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Idle window after which the loop logs a liveness warning
    pub idle_warn: Duration,
    /// Capacity of the feed channel
    pub feed_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            idle_warn: Duration::from_secs(10),
            feed_capacity: 10_000,
        }
    }
}

/// Dedicated ingestion loop for the market-data feed
pub struct MarketDataRouter {
    rx: mpsc::Receiver<MarketRecord>,
    aggregator: BarAggregator,
    config: RouterConfig,
}

impl MarketDataRouter {
    /// Build the router and the sender half the exchange connector pushes
    /// into.
    pub fn new(
        aggregator: BarAggregator,
        config: RouterConfig,
    ) -> (Self, mpsc::Sender<MarketRecord>) {
        let (tx, rx) = mpsc::channel(config.feed_capacity);
        (
            Self {
                rx,
                aggregator,
                config,
            },
            tx,
        )
    }

    /// Run until the feed channel closes. Intended to be spawned.
    pub async fn run(mut self) {
        info!("market-data router started");
        loop {
            match tokio::time::timeout(self.config.idle_warn, self.rx.recv()).await {
                Ok(Some(MarketRecord::Tick(tick))) => self.aggregator.process_tick(tick),
                Ok(Some(MarketRecord::Orderbook(ob))) => {
                    self.aggregator.process_orderbook(ob)
                }
                Ok(None) => {
                    info!("market feed closed, router exiting");
                    break;
                }
                Err(_) => {
                    warn!(
                        idle_secs = self.config.idle_warn.as_secs(),
                        "no market data received within idle window"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::EventBus;
    use std::sync::Arc;
    use types::ids::Symbol;
    use types::numeric::Price;
    use types::time::NANOS_PER_SEC;

    fn xbt() -> Symbol {
        Symbol::new("XBTUSD")
    }

    #[tokio::test]
    async fn test_router_feeds_aggregator_and_exits_on_close() {
        let bus = Arc::new(EventBus::with_defaults());
        let mut agg = BarAggregator::new([xbt()], Arc::clone(&bus));
        agg.register_bar(xbt(), "1m".parse().unwrap());
        let view = agg.view();

        let (router, tx) = MarketDataRouter::new(agg, RouterConfig::default());
        let handle = tokio::spawn(router.run());

        tx.send(MarketRecord::Tick(Tick::new(
            xbt(),
            Price::from_u64(100),
            0,
        )))
        .await
        .unwrap();
        tx.send(MarketRecord::Orderbook(Orderbook::new(
            xbt(),
            vec![],
            vec![],
            NANOS_PER_SEC,
        )))
        .await
        .unwrap();

        drop(tx);
        handle.await.unwrap();

        assert_eq!(
            view.latest_tick(&xbt()).unwrap().price,
            Price::from_u64(100)
        );
        assert!(view.latest_orderbook(&xbt()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_router_keeps_running() {
        let bus = Arc::new(EventBus::with_defaults());
        let agg = BarAggregator::new([xbt()], bus);
        let view = agg.view();

        let (router, tx) = MarketDataRouter::new(
            agg,
            RouterConfig {
                idle_warn: Duration::from_secs(1),
                feed_capacity: 16,
            },
        );
        let handle = tokio::spawn(router.run());

        // Several idle windows pass; the loop must survive them
        tokio::time::sleep(Duration::from_secs(5)).await;

        tx.send(MarketRecord::Tick(Tick::new(xbt(), Price::from_u64(7), 0)))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(view.latest_tick(&xbt()).unwrap().price, Price::from_u64(7));
    }
}
