//! The publish/subscribe broker
//!
//! One unbounded FIFO queue, one dispatch task. `publish` is a non-blocking
//! enqueue and may be called from any thread; handlers execute synchronously
//! on the dispatch task, so a slow handler delays everything behind it.
//!
//! `stop` closes the queue, lets the loop drain every event already
//! published, and joins the task: after it returns no handler runs again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::events::{EngineEvent, EventKey, EventPayload};

/// Errors from bus lifecycle and publishing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("event bus already started")]
    AlreadyStarted,

    #[error("event bus was never started")]
    NotStarted,

    #[error("event bus is stopped")]
    Stopped,
}

/// Failure reported by an event handler
///
/// Caught at the dispatch boundary and logged; never propagates past the
/// failing handler.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Token identifying a registered handler, used to unregister it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&EngineEvent) -> Result<(), HandlerError> + Send + Sync>;

/// Bus configuration
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Idle window after which the dispatch loop logs a liveness warning
    pub idle_warn: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            idle_warn: Duration::from_secs(5),
        }
    }
}

#[derive(Default)]
struct Registry {
    typed: HashMap<EventKey, Vec<(HandlerId, Handler)>>,
    general: Vec<(HandlerId, Handler)>,
    next_id: u64,
}

impl Registry {
    fn issue_id(&mut self) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// In-process typed publish/subscribe broker
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
    tx: Mutex<Option<mpsc::UnboundedSender<EngineEvent>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<EngineEvent>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    config: BusConfig,
}

impl EventBus {
    /// Create a bus with the given configuration. Events may be published
    /// before `start`; they queue until the dispatch loop runs.
    pub fn new(config: BusConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            task: Mutex::new(None),
            config,
        }
    }

    /// Create a bus with default configuration
    pub fn with_defaults() -> Self {
        Self::new(BusConfig::default())
    }

    /// Register a handler for one event key. Typed handlers for an event
    /// run before general handlers, in registration order.
    pub fn register<F>(&self, key: EventKey, handler: F) -> HandlerId
    where
        F: Fn(&EngineEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let mut reg = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let id = reg.issue_id();
        reg.typed
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(handler)));
        debug!(?key, handler_id = id.0, "registered typed handler");
        id
    }

    /// Remove a typed handler. Returns false if the key/id pair is unknown.
    pub fn unregister(&self, key: &EventKey, id: HandlerId) -> bool {
        let mut reg = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        match reg.typed.get_mut(key) {
            Some(handlers) => {
                let before = handlers.len();
                handlers.retain(|(hid, _)| *hid != id);
                before != handlers.len()
            }
            None => false,
        }
    }

    /// Register a handler that receives every event regardless of key
    pub fn register_general<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&EngineEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let mut reg = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let id = reg.issue_id();
        reg.general.push((id, Arc::new(handler)));
        debug!(handler_id = id.0, "registered general handler");
        id
    }

    /// Remove a general handler
    pub fn unregister_general(&self, id: HandlerId) -> bool {
        let mut reg = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let before = reg.general.len();
        reg.general.retain(|(hid, _)| *hid != id);
        before != reg.general.len()
    }

    /// Non-blocking enqueue. Fails only after `stop`.
    pub fn publish(&self, payload: EventPayload) -> Result<(), BusError> {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match tx.as_ref() {
            Some(tx) => tx
                .send(EngineEvent::new(payload))
                .map_err(|_| BusError::Stopped),
            None => Err(BusError::Stopped),
        }
    }

    /// Spawn the dispatch loop. Fails if already started.
    pub fn start(&self) -> Result<(), BusError> {
        let mut rx_slot = self.rx.lock().unwrap_or_else(|e| e.into_inner());
        let mut rx = rx_slot.take().ok_or(BusError::AlreadyStarted)?;
        drop(rx_slot);

        let registry = Arc::clone(&self.registry);
        let idle_warn = self.config.idle_warn;

        let handle = tokio::spawn(async move {
            loop {
                match tokio::time::timeout(idle_warn, rx.recv()).await {
                    Ok(Some(event)) => dispatch(&registry, &event),
                    Ok(None) => {
                        debug!("event queue closed, dispatch loop exiting");
                        break;
                    }
                    Err(_) => {
                        warn!(
                            idle_secs = idle_warn.as_secs(),
                            "no event received within idle window"
                        );
                    }
                }
            }
        });

        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Close the queue, drain in-flight events, and join the dispatch loop.
    /// After this returns no further handler invocation occurs.
    pub async fn stop(&self) -> Result<(), BusError> {
        // Dropping the sender closes the channel once drained
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();

        let handle = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(BusError::NotStarted)?;

        if handle.await.is_err() {
            error!("dispatch loop terminated abnormally");
        }
        Ok(())
    }
}

/// Run all handlers for one event: typed first, then general, each set in
/// registration order. Handler failures are logged and skipped over.
fn dispatch(registry: &Mutex<Registry>, event: &EngineEvent) {
    let (typed, general) = {
        let reg = registry.lock().unwrap_or_else(|e| e.into_inner());
        let typed: Vec<(HandlerId, Handler)> = reg
            .typed
            .get(&event.payload.key())
            .map(|v| v.to_vec())
            .unwrap_or_default();
        let general = reg.general.to_vec();
        (typed, general)
    };

    for (id, handler) in typed.iter().chain(general.iter()) {
        if let Err(err) = handler(event) {
            error!(
                event = event.payload.kind_label(),
                event_id = %event.event_id,
                handler_id = id.0,
                %err,
                "event handler failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::Symbol;

    fn tick(sym: &str) -> EventPayload {
        EventPayload::Tick {
            symbol: Symbol::new(sym),
        }
    }

    /// Collector that appends a tag per observed event
    fn collector(
        log: &Arc<Mutex<Vec<String>>>,
        tag: &str,
    ) -> impl Fn(&EngineEvent) -> Result<(), HandlerError> + Send + Sync + 'static {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        move |e| {
            log.lock().unwrap().push(format!("{}:{}", tag, e.payload.kind_label()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_order_preserved() {
        let bus = EventBus::with_defaults();
        let log = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&log);
        bus.register_general(move |e| {
            seen.lock()
                .unwrap()
                .push(e.payload.symbol().unwrap().to_string());
            Ok(())
        });

        bus.start().unwrap();
        for sym in ["A", "B", "C"] {
            bus.publish(tick(sym)).unwrap();
        }
        bus.stop().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_typed_before_general_in_registration_order() {
        let bus = EventBus::with_defaults();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.register(EventKey::Tick(Symbol::new("XBTUSD")), collector(&log, "t1"));
        bus.register_general(collector(&log, "g1"));
        bus.register(EventKey::Tick(Symbol::new("XBTUSD")), collector(&log, "t2"));
        bus.register_general(collector(&log, "g2"));

        bus.start().unwrap();
        bus.publish(tick("XBTUSD")).unwrap();
        bus.stop().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["t1:Tick", "t2:Tick", "g1:Tick", "g2:Tick"]
        );
    }

    #[tokio::test]
    async fn test_typed_handler_only_sees_its_key() {
        let bus = EventBus::with_defaults();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.register(EventKey::Tick(Symbol::new("XBTUSD")), collector(&log, "xbt"));

        bus.start().unwrap();
        bus.publish(tick("ETHUSD")).unwrap();
        bus.publish(tick("XBTUSD")).unwrap();
        bus.stop().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["xbt:Tick"]);
    }

    #[tokio::test]
    async fn test_handler_failure_does_not_stop_dispatch() {
        let bus = EventBus::with_defaults();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.register(EventKey::Tick(Symbol::new("XBTUSD")), |_| {
            Err(HandlerError::new("deliberate failure"))
        });
        bus.register(EventKey::Tick(Symbol::new("XBTUSD")), collector(&log, "ok"));

        bus.start().unwrap();
        bus.publish(tick("XBTUSD")).unwrap();
        bus.publish(tick("XBTUSD")).unwrap();
        bus.stop().await.unwrap();

        // Second handler saw both events despite the first one failing
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_drains_pending_events() {
        let bus = EventBus::with_defaults();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register_general(collector(&log, "g"));

        bus.start().unwrap();
        for _ in 0..100 {
            bus.publish(tick("XBTUSD")).unwrap();
        }
        bus.stop().await.unwrap();

        assert_eq!(log.lock().unwrap().len(), 100);
        assert_eq!(bus.publish(tick("XBTUSD")), Err(BusError::Stopped));
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let bus = EventBus::with_defaults();
        let log = Arc::new(Mutex::new(Vec::new()));

        let key = EventKey::Tick(Symbol::new("XBTUSD"));
        let id = bus.register(key.clone(), collector(&log, "t"));
        assert!(bus.unregister(&key, id));
        assert!(!bus.unregister(&key, id));

        bus.start().unwrap();
        bus.publish(tick("XBTUSD")).unwrap();
        bus.stop().await.unwrap();

        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let bus = EventBus::with_defaults();
        bus.start().unwrap();
        assert_eq!(bus.start(), Err(BusError::AlreadyStarted));
        bus.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let bus = EventBus::with_defaults();
        assert_eq!(bus.stop().await, Err(BusError::NotStarted));
    }
}
