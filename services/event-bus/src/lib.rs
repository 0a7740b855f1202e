//! Event Bus Service
//!
//! In-process typed publish/subscribe broker with a single FIFO delivery
//! queue and a single dispatch loop. Publishers enqueue without blocking;
//! handlers run synchronously on the dispatch task in strict publish order.
//!
//! ```text
//!  publish()            ┌──────────────┐   typed handlers (registration order)
//!  ─────────▶ FIFO ───▶ │ dispatch loop│ ─▶ general handlers (registration order)
//!                       └──────────────┘
//! ```
//!
//! Handler failures are caught and logged at the dispatch boundary and never
//! abort the loop. An idle queue produces a periodic liveness warning.

pub mod bus;
pub mod events;

pub use bus::{BusConfig, BusError, EventBus, HandlerError, HandlerId};
pub use events::{EngineEvent, EventKey, EventPayload};
