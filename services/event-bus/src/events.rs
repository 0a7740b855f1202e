//! Event definitions for the trading pipeline
//!
//! Every event is a tagged variant carrying strongly-typed fields. Handler
//! registration uses `EventKey`, which parameterizes subscription by symbol
//! and bar type where it matters (a tick handler for `XBTUSD` never sees
//! `ETHUSD` ticks; a bar handler is keyed by both symbol and width).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use types::bar::BarType;
use types::ids::Symbol;
use types::time::now_nanos;
use uuid::Uuid;

/// An event flowing through the bus
///
/// Immutable after construction; the bus keeps no history, so an event is
/// dropped as soon as its last handler returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Unique event identifier (UUID v7)
    pub event_id: Uuid,
    /// Local publish time, Unix nanoseconds
    pub published_at: i64,
    /// Event-specific payload
    pub payload: EventPayload,
}

impl EngineEvent {
    /// Wrap a payload, stamping identity and publish time
    pub fn new(payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            published_at: now_nanos(),
            payload,
        }
    }
}

/// Event-specific payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    /// A new latest trade price is available for the symbol
    Tick { symbol: Symbol },

    /// A new orderbook snapshot is available for the symbol
    Orderbook { symbol: Symbol },

    /// A bar bucket just opened for (symbol, bar_type)
    BarOpen { symbol: Symbol, bar_type: BarType },

    /// A bar bucket just closed for (symbol, bar_type)
    BarClose { symbol: Symbol, bar_type: BarType },

    /// A strategy produced a desired position for one symbol
    Signal {
        strategy: String,
        symbol: Symbol,
        target_position: i64,
    },

    /// Net desired positions across the portfolio changed
    TargetPosition { targets: BTreeMap<Symbol, i64> },
}

impl EventPayload {
    /// Registration key this payload dispatches under
    pub fn key(&self) -> EventKey {
        match self {
            EventPayload::Tick { symbol } => EventKey::Tick(symbol.clone()),
            EventPayload::Orderbook { symbol } => EventKey::Orderbook(symbol.clone()),
            EventPayload::BarOpen { symbol, bar_type } => {
                EventKey::BarOpen(symbol.clone(), *bar_type)
            }
            EventPayload::BarClose { symbol, bar_type } => {
                EventKey::BarClose(symbol.clone(), *bar_type)
            }
            EventPayload::Signal { .. } => EventKey::Signal,
            EventPayload::TargetPosition { .. } => EventKey::TargetPosition,
        }
    }

    /// Event kind as a string label for logging
    pub fn kind_label(&self) -> &'static str {
        match self {
            EventPayload::Tick { .. } => "Tick",
            EventPayload::Orderbook { .. } => "Orderbook",
            EventPayload::BarOpen { .. } => "BarOpen",
            EventPayload::BarClose { .. } => "BarClose",
            EventPayload::Signal { .. } => "Signal",
            EventPayload::TargetPosition { .. } => "TargetPosition",
        }
    }

    /// Symbol the event concerns, if it is symbol-scoped
    pub fn symbol(&self) -> Option<&Symbol> {
        match self {
            EventPayload::Tick { symbol }
            | EventPayload::Orderbook { symbol }
            | EventPayload::BarOpen { symbol, .. }
            | EventPayload::BarClose { symbol, .. }
            | EventPayload::Signal { symbol, .. } => Some(symbol),
            EventPayload::TargetPosition { .. } => None,
        }
    }
}

/// Subscription key for handler registration
///
/// Symbol-scoped events subscribe per symbol (and per bar type for bar
/// events); signal and target-position events are global.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKey {
    Tick(Symbol),
    Orderbook(Symbol),
    BarOpen(Symbol, BarType),
    BarClose(Symbol, BarType),
    Signal,
    TargetPosition,
}
