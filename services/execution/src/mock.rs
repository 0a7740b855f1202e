//! Recording connector for tests
//!
//! Captures every order-management call in order and can be toggled to
//! simulate transport failures or exchange rejections. Used by executor
//! unit tests and the engine-level pipeline tests.

use std::sync::Mutex;

use types::ids::Symbol;
use types::numeric::Price;
use types::order::Side;

use crate::connector::{ConnectorError, OrderResult, TradingConnector};

/// One recorded order-management call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorCall {
    CancelAll {
        symbol: Symbol,
    },
    Place {
        symbol: Symbol,
        side: Side,
        qty: i64,
        limit_price: Price,
    },
}

/// Connector that records calls instead of talking to a venue
#[derive(Default)]
pub struct RecordingConnector {
    calls: Mutex<Vec<ConnectorCall>>,
    fail_transport: Mutex<bool>,
    refuse_orders: Mutex<bool>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls recorded so far, in issue order
    pub fn calls(&self) -> Vec<ConnectorCall> {
        self.lock_calls().clone()
    }

    /// Number of calls recorded so far
    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    /// When set, every call returns `ConnectorError::Transport`
    pub fn set_fail_transport(&self, fail: bool) {
        *self.fail_transport.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    /// When set, `place_order` is recorded but returns a refused result
    pub fn set_refuse_orders(&self, refuse: bool) {
        *self.refuse_orders.lock().unwrap_or_else(|e| e.into_inner()) = refuse;
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<ConnectorCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transport_down(&self) -> bool {
        *self.fail_transport.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TradingConnector for RecordingConnector {
    fn cancel_all_orders(&self, symbol: &Symbol) -> Result<OrderResult, ConnectorError> {
        if self.transport_down() {
            return Err(ConnectorError::Transport("simulated outage".to_string()));
        }
        self.lock_calls().push(ConnectorCall::CancelAll {
            symbol: symbol.clone(),
        });
        Ok(OrderResult::accepted("ok"))
    }

    fn place_order(
        &self,
        symbol: &Symbol,
        side: Side,
        qty: i64,
        limit_price: Price,
    ) -> Result<OrderResult, ConnectorError> {
        if self.transport_down() {
            return Err(ConnectorError::Transport("simulated outage".to_string()));
        }
        self.lock_calls().push(ConnectorCall::Place {
            symbol: symbol.clone(),
            side,
            qty,
            limit_price,
        });
        if *self.refuse_orders.lock().unwrap_or_else(|e| e.into_inner()) {
            return Ok(OrderResult::refused("simulated rejection"));
        }
        Ok(OrderResult::accepted("ok"))
    }
}
