//! Trading-connector interface
//!
//! The executor talks to the exchange through this trait object, injected
//! at construction. Implementations wrap the venue's order-management API;
//! this crate ships only the contract and a recording mock.
//!
//! Both operations are fire-and-forget from the executor's point of view:
//! a failure result is logged and the next triggering event re-attempts
//! reconciliation. Implementations must not block the caller on network
//! round-trips longer than an order submission.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use types::ids::Symbol;
use types::numeric::Price;
use types::order::Side;

/// Failure reaching or being refused by the exchange
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("exchange rejected request: {0}")]
    Rejected(String),
}

/// Result of an order-management request
///
/// `ok` mirrors the HTTP-level success of the venue response; `body` is the
/// raw response payload, kept for logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub ok: bool,
    pub body: String,
}

impl OrderResult {
    pub fn accepted(body: impl Into<String>) -> Self {
        Self {
            ok: true,
            body: body.into(),
        }
    }

    pub fn refused(body: impl Into<String>) -> Self {
        Self {
            ok: false,
            body: body.into(),
        }
    }
}

/// Outbound order-management operations
pub trait TradingConnector: Send + Sync {
    /// Cancel every outstanding order for a symbol
    fn cancel_all_orders(&self, symbol: &Symbol) -> Result<OrderResult, ConnectorError>;

    /// Submit a single limit order
    fn place_order(
        &self,
        symbol: &Symbol,
        side: Side,
        qty: i64,
        limit_price: Price,
    ) -> Result<OrderResult, ConnectorError>;
}
