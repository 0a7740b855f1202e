//! Streaming OHLC bar aggregation
//!
//! Converts irregular tick arrivals into fixed-width bars. Exactly one
//! current and one previous bar exist per registered (symbol, bar_type)
//! pair; current becomes previous on rollover.
//!
//! Rollover invariant: a bar's close is the last tick observed strictly
//! inside its own bucket, and the BarClose event is published strictly
//! before the BarOpen of the successor bucket.
//!
//! Late-data policy: a tick whose bucket key is not greater than the
//! current bar's key is folded into the current bar's high/low. It never
//! reopens or mutates the previous (closed) bar. Genuinely stale ticks
//! (timestamp before the current bucket start) are logged at debug level.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use event_bus::{EventBus, EventPayload};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use types::bar::{BarType, BucketKey};
use types::ids::Symbol;
use types::market::{Orderbook, Tick};
use types::numeric::Price;
use types::time::now_nanos;

use crate::cache::{BarPair, MarketCache, MarketView};

/// One OHLC bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: Symbol,
    pub bar_type: BarType,
    /// Bucket this bar covers; the rollover comparison key
    pub key: BucketKey,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    /// Set exactly once, at rollover. `None` while the bucket is open.
    pub close: Option<Price>,
    /// Exchange timestamp of the tick that opened the bucket
    pub open_timestamp: i64,
    /// Local time the bucket was closed
    pub close_receive_time: Option<i64>,
}

impl Bar {
    /// Open a new bucket seeded from a tick
    fn open_from(tick: &Tick, bar_type: BarType, key: BucketKey) -> Self {
        Self {
            symbol: tick.symbol.clone(),
            bar_type,
            key,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: None,
            open_timestamp: tick.timestamp,
            close_receive_time: None,
        }
    }

    /// Fold a price into the open bucket; high/low only ever widen
    fn widen(&mut self, price: Price) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
    }

    /// Whether the bucket has been closed
    pub fn is_closed(&self) -> bool {
        self.close.is_some()
    }
}

/// Streaming bar aggregation engine
///
/// Single-writer: all `process_*` calls come from the router's ingestion
/// loop. Readers go through the [`MarketView`] handle.
pub struct BarAggregator {
    /// Symbols this pipeline tracks; records for others are skipped
    symbols: BTreeSet<Symbol>,
    registered_bars: BTreeMap<Symbol, Vec<BarType>>,
    registered_ticks: BTreeSet<Symbol>,
    registered_orderbooks: BTreeSet<Symbol>,
    cache: Arc<Mutex<MarketCache>>,
    bus: Arc<EventBus>,
}

impl BarAggregator {
    pub fn new(symbols: impl IntoIterator<Item = Symbol>, bus: Arc<EventBus>) -> Self {
        Self {
            symbols: symbols.into_iter().collect(),
            registered_bars: BTreeMap::new(),
            registered_ticks: BTreeSet::new(),
            registered_orderbooks: BTreeSet::new(),
            cache: Arc::new(Mutex::new(MarketCache::default())),
            bus,
        }
    }

    /// Read-only handle over the shared cache
    pub fn view(&self) -> MarketView {
        MarketView::new(Arc::clone(&self.cache))
    }

    /// Subscribe a (symbol, bar_type) pair to derived bars. Idempotent;
    /// a symbol outside the configured set is a warning, not a fault.
    pub fn register_bar(&mut self, symbol: Symbol, bar_type: BarType) {
        if !self.symbols.contains(&symbol) {
            warn!(
                %symbol,
                %bar_type,
                "registering bar for untracked symbol, ignoring"
            );
            return;
        }
        let types = self.registered_bars.entry(symbol.clone()).or_default();
        if types.contains(&bar_type) {
            info!(%symbol, %bar_type, "bar type already registered");
            return;
        }
        types.push(bar_type);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .bars
            .insert((symbol.clone(), bar_type), BarPair::default());
        info!(%symbol, %bar_type, "registered bar subscription");
    }

    /// Opt a symbol in to raw tick event emission
    pub fn register_tick_events(&mut self, symbol: Symbol) {
        self.registered_ticks.insert(symbol);
    }

    /// Opt a symbol in to raw orderbook event emission
    pub fn register_orderbook_events(&mut self, symbol: Symbol) {
        self.registered_orderbooks.insert(symbol);
    }

    /// Bar types registered for a symbol
    pub fn registered_bar_types(&self, symbol: &Symbol) -> &[BarType] {
        self.registered_bars
            .get(symbol)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Ingest one tick: bar logic first (close-then-open on rollover), then
    /// the latest-tick cache, then the tick event if subscribed.
    pub fn process_tick(&self, tick: Tick) {
        let symbol = tick.symbol.clone();
        if !self.symbols.contains(&symbol) {
            warn!(%symbol, "tick for untracked symbol, skipping");
            return;
        }
        debug!(%symbol, price = %tick.price, timestamp = tick.timestamp, "processing tick");

        let mut emissions: Vec<EventPayload> = Vec::new();
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());

            // Last known price before this tick; the close of any bucket
            // this tick rolls over.
            let last_price = cache.ticks.get(&symbol).map(|t| t.price);

            if let Some(bar_types) = self.registered_bars.get(&symbol) {
                for &bar_type in bar_types {
                    Self::apply_tick_to_bar(
                        &mut cache,
                        &tick,
                        bar_type,
                        last_price,
                        &mut emissions,
                    );
                }
            }

            let mut stamped = tick;
            stamped.receive_time = Some(now_nanos());
            cache.ticks.insert(symbol.clone(), stamped);
        }

        if self.registered_ticks.contains(&symbol) {
            emissions.push(EventPayload::Tick {
                symbol: symbol.clone(),
            });
        }

        self.emit(emissions);
    }

    /// Ingest one orderbook snapshot: cache update plus optional event.
    /// Orderbooks never participate in bar bucketing.
    pub fn process_orderbook(&self, ob: Orderbook) {
        let symbol = ob.symbol.clone();
        if !self.symbols.contains(&symbol) {
            warn!(%symbol, "orderbook for untracked symbol, skipping");
            return;
        }
        debug!(%symbol, timestamp = ob.timestamp, "processing orderbook");

        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            let mut stamped = ob;
            stamped.receive_time = Some(now_nanos());
            cache.orderbooks.insert(symbol.clone(), stamped);
        }

        if self.registered_orderbooks.contains(&symbol) {
            self.emit(vec![EventPayload::Orderbook { symbol }]);
        }
    }

    fn apply_tick_to_bar(
        cache: &mut MarketCache,
        tick: &Tick,
        bar_type: BarType,
        last_price: Option<Price>,
        emissions: &mut Vec<EventPayload>,
    ) {
        let symbol = tick.symbol.clone();
        let incoming = BucketKey::from_timestamp(tick.timestamp, bar_type);
        let Some(pair) = cache.bars.get_mut(&(symbol.clone(), bar_type)) else {
            return;
        };

        match pair.current.as_mut() {
            None => {
                // First tick for this subscription seeds the bucket
                pair.current = Some(Bar::open_from(tick, bar_type, incoming));
                debug!(%symbol, %bar_type, td = incoming.td, "seeded first bar");
            }
            Some(current) if incoming > current.key => {
                // Rollover: close at the last price observed strictly
                // inside the outgoing bucket, then open the successor.
                current.close = Some(last_price.unwrap_or(current.open));
                current.close_receive_time = Some(now_nanos());
                let closed = pair.current.take();
                pair.previous = closed;
                emissions.push(EventPayload::BarClose {
                    symbol: symbol.clone(),
                    bar_type,
                });

                pair.current = Some(Bar::open_from(tick, bar_type, incoming));
                emissions.push(EventPayload::BarOpen {
                    symbol: symbol.clone(),
                    bar_type,
                });
            }
            Some(current) => {
                if incoming < current.key {
                    debug!(
                        %symbol,
                        %bar_type,
                        tick_ts = tick.timestamp,
                        bucket_ts = current.key.ts,
                        "stale tick folded into current bucket"
                    );
                }
                current.widen(tick.price);
            }
        }
    }

    fn emit(&self, emissions: Vec<EventPayload>) {
        for payload in emissions {
            if let Err(err) = self.bus.publish(payload) {
                warn!(%err, "dropping derived event, bus unavailable");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::{EngineEvent, HandlerError};
    use proptest::prelude::*;
    use types::time::NANOS_PER_SEC;

    fn xbt() -> Symbol {
        Symbol::new("XBTUSD")
    }

    fn m1() -> BarType {
        "1m".parse().unwrap()
    }

    fn tick_at(secs: i64, price: u64) -> Tick {
        Tick::new(xbt(), Price::from_u64(price), secs * NANOS_PER_SEC)
    }

    fn aggregator() -> BarAggregator {
        let mut agg = BarAggregator::new([xbt()], Arc::new(EventBus::with_defaults()));
        agg.register_bar(xbt(), m1());
        agg
    }

    fn collect_events(
        bus: &EventBus,
        log: &Arc<Mutex<Vec<String>>>,
    ) {
        let log = Arc::clone(log);
        bus.register_general(move |e: &EngineEvent| -> Result<(), HandlerError> {
            log.lock().unwrap().push(e.payload.kind_label().to_string());
            Ok(())
        });
    }

    #[test]
    fn test_first_tick_seeds_bar() {
        let agg = aggregator();
        agg.process_tick(tick_at(10, 100));

        let bar = agg.view().current_bar(&xbt(), m1()).unwrap();
        assert_eq!(bar.open, Price::from_u64(100));
        assert_eq!(bar.high, Price::from_u64(100));
        assert_eq!(bar.low, Price::from_u64(100));
        assert!(bar.close.is_none());
        assert_eq!(bar.key.ts, 0);
        assert!(agg.view().prev_bar(&xbt(), m1()).is_none());
    }

    #[test]
    fn test_high_low_widen_within_bucket() {
        let agg = aggregator();
        agg.process_tick(tick_at(0, 100));
        agg.process_tick(tick_at(10, 105));
        agg.process_tick(tick_at(20, 95));
        agg.process_tick(tick_at(30, 101));

        let bar = agg.view().current_bar(&xbt(), m1()).unwrap();
        assert_eq!(bar.open, Price::from_u64(100));
        assert_eq!(bar.high, Price::from_u64(105));
        assert_eq!(bar.low, Price::from_u64(95));
        assert!(bar.close.is_none());
    }

    #[test]
    fn test_rollover_scenario() {
        // Ticks at t=0 (100), t=30 (101), t=61 (102) with 1m bars
        let agg = aggregator();
        agg.process_tick(tick_at(0, 100));
        agg.process_tick(tick_at(30, 101));
        agg.process_tick(tick_at(61, 102));

        let prev = agg.view().prev_bar(&xbt(), m1()).unwrap();
        assert_eq!(prev.key.ts, 0);
        assert_eq!(prev.open, Price::from_u64(100));
        assert_eq!(prev.high, Price::from_u64(101));
        assert_eq!(prev.low, Price::from_u64(100));
        assert_eq!(prev.close, Some(Price::from_u64(101)));
        assert!(prev.close_receive_time.is_some());

        let current = agg.view().current_bar(&xbt(), m1()).unwrap();
        assert_eq!(current.key.ts, 60 * NANOS_PER_SEC);
        assert_eq!(current.open, Price::from_u64(102));
        assert!(current.close.is_none());
    }

    #[test]
    fn test_close_is_last_tick_of_own_bucket() {
        // The first tick of the new bucket must not become the old close
        let agg = aggregator();
        agg.process_tick(tick_at(0, 100));
        agg.process_tick(tick_at(59, 111));
        agg.process_tick(tick_at(60, 999));

        let prev = agg.view().prev_bar(&xbt(), m1()).unwrap();
        assert_eq!(prev.close, Some(Price::from_u64(111)));
    }

    #[test]
    fn test_stale_tick_folds_into_current_not_previous() {
        let agg = aggregator();
        agg.process_tick(tick_at(0, 100));
        agg.process_tick(tick_at(61, 102));

        // Tick stamped before the current bucket start: folded into the
        // current high/low, previous stays frozen.
        agg.process_tick(tick_at(59, 150));

        let prev = agg.view().prev_bar(&xbt(), m1()).unwrap();
        assert_eq!(prev.high, Price::from_u64(100));
        assert_eq!(prev.close, Some(Price::from_u64(100)));

        let current = agg.view().current_bar(&xbt(), m1()).unwrap();
        assert_eq!(current.key.ts, 60 * NANOS_PER_SEC);
        assert_eq!(current.high, Price::from_u64(150));
    }

    #[tokio::test]
    async fn test_close_event_precedes_open_event() {
        let bus = Arc::new(EventBus::with_defaults());
        let log = Arc::new(Mutex::new(Vec::new()));
        collect_events(&bus, &log);

        let mut agg = BarAggregator::new([xbt()], Arc::clone(&bus));
        agg.register_bar(xbt(), m1());
        agg.register_tick_events(xbt());

        bus.start().unwrap();
        agg.process_tick(tick_at(0, 100));
        agg.process_tick(tick_at(61, 102));
        bus.stop().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["Tick", "BarClose", "BarOpen", "Tick"]
        );
    }

    #[tokio::test]
    async fn test_tick_events_require_opt_in() {
        let bus = Arc::new(EventBus::with_defaults());
        let log = Arc::new(Mutex::new(Vec::new()));
        collect_events(&bus, &log);

        let mut agg = BarAggregator::new([xbt()], Arc::clone(&bus));
        agg.register_bar(xbt(), m1());
        // No register_tick_events

        bus.start().unwrap();
        agg.process_tick(tick_at(0, 100));
        agg.process_tick(tick_at(61, 102));
        bus.stop().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["BarClose", "BarOpen"]);
    }

    #[tokio::test]
    async fn test_orderbook_updates_cache_and_emits() {
        let bus = Arc::new(EventBus::with_defaults());
        let log = Arc::new(Mutex::new(Vec::new()));
        collect_events(&bus, &log);

        let mut agg = BarAggregator::new([xbt()], Arc::clone(&bus));
        agg.register_orderbook_events(xbt());

        bus.start().unwrap();
        agg.process_orderbook(Orderbook::new(xbt(), vec![], vec![], 0));
        bus.stop().await.unwrap();

        assert!(agg.view().latest_orderbook(&xbt()).is_some());
        assert_eq!(*log.lock().unwrap(), vec!["Orderbook"]);
    }

    #[test]
    fn test_orderbook_does_not_touch_bars() {
        let agg = aggregator();
        agg.process_tick(tick_at(0, 100));
        agg.process_orderbook(Orderbook::new(xbt(), vec![], vec![], 120 * NANOS_PER_SEC));

        // Orderbook with a much later timestamp must not roll the bar
        let bar = agg.view().current_bar(&xbt(), m1()).unwrap();
        assert_eq!(bar.key.ts, 0);
        assert!(bar.close.is_none());
    }

    #[test]
    fn test_untracked_symbol_is_noop() {
        let agg = aggregator();
        agg.process_tick(Tick::new(Symbol::new("DOGEUSD"), Price::from_u64(1), 0));
        assert!(agg.view().latest_tick(&Symbol::new("DOGEUSD")).is_none());
    }

    #[test]
    fn test_register_bar_idempotent() {
        let mut agg = aggregator();
        agg.register_bar(xbt(), m1());
        assert_eq!(agg.registered_bar_types(&xbt()), &[m1()]);

        agg.register_bar(Symbol::new("DOGEUSD"), m1());
        assert!(agg.registered_bar_types(&Symbol::new("DOGEUSD")).is_empty());
    }

    #[test]
    fn test_multiple_bar_types_roll_independently() {
        let mut agg = aggregator();
        let s30: BarType = "30s".parse().unwrap();
        agg.register_bar(xbt(), s30);

        agg.process_tick(tick_at(0, 100));
        agg.process_tick(tick_at(31, 101));

        // 30s bucket rolled, 1m bucket did not
        assert!(agg.view().prev_bar(&xbt(), s30).is_some());
        assert!(agg.view().prev_bar(&xbt(), m1()).is_none());
    }

    #[test]
    fn test_bar_serde_roundtrip() {
        let agg = aggregator();
        agg.process_tick(tick_at(0, 100));
        let bar = agg.view().current_bar(&xbt(), m1()).unwrap();
        let json = serde_json::to_string(&bar).unwrap();
        let back: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bar);
    }

    #[test]
    fn test_latest_tick_cache_stamped() {
        let agg = aggregator();
        agg.process_tick(tick_at(5, 100));
        let cached = agg.view().latest_tick(&xbt()).unwrap();
        assert_eq!(cached.price, Price::from_u64(100));
        assert!(cached.receive_time.is_some());
    }

    proptest! {
        #[test]
        fn prop_bucket_keys_nondecreasing_and_bounds_hold(
            prices in prop::collection::vec(1u64..1_000_000, 1..200),
            gaps in prop::collection::vec(0i64..90, 1..200),
        ) {
            let agg = aggregator();
            let mut t = 0i64;
            let mut last_key: Option<BucketKey> = None;
            let mut bucket_prices: Vec<u64> = Vec::new();

            for (price, gap) in prices.iter().zip(gaps.iter()) {
                t += gap;
                agg.process_tick(tick_at(t, *price));

                let bar = agg.view().current_bar(&xbt(), m1()).unwrap();
                // Keys never decrease
                if let Some(prev_key) = last_key {
                    prop_assert!(bar.key >= prev_key);
                }
                if Some(bar.key) != last_key {
                    last_key = Some(bar.key);
                    bucket_prices.clear();
                }
                bucket_prices.push(*price);
                // High/low bound every folded price
                let hi = *bucket_prices.iter().max().unwrap();
                let lo = *bucket_prices.iter().min().unwrap();
                prop_assert!(bar.high >= Price::from_u64(hi));
                prop_assert!(bar.low <= Price::from_u64(lo));
            }
        }
    }
}
