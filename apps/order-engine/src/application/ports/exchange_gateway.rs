//! Exchange Gateway Port (Driven Port)
//!
//! Interface to a derivatives exchange: symbol and price queries, order
//! placement, cancellation and status polling. Implementations retry
//! transient failures themselves; every error that crosses this port is
//! final for that call.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::{
    ExecutionReport, Order, OrderError, OrderKind, OrderSide, SymbolMetadata, TimeInForce,
};
use crate::domain::shared::{ExchangeOrderId, OrderId, Symbol};

/// Order as sent to the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Client order ID.
    pub client_order_id: OrderId,
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Order side.
    pub side: OrderSide,
    /// Order kind.
    pub kind: OrderKind,
    /// Quantity.
    pub quantity: Decimal,
    /// Limit price.
    pub price: Option<Decimal>,
    /// Stop trigger price.
    pub stop_price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Reduce-only flag.
    pub reduce_only: bool,
}

impl From<&Order> for OrderSpec {
    fn from(order: &Order) -> Self {
        Self {
            client_order_id: order.id().clone(),
            symbol: order.symbol().clone(),
            side: order.side(),
            kind: order.kind(),
            quantity: order.quantity(),
            price: order.price(),
            stop_price: order.stop_price(),
            time_in_force: order.time_in_force(),
            reduce_only: order.reduce_only(),
        }
    }
}

/// Gateway error, classified transient vs permanent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Symbol unknown to the exchange.
    #[error("Symbol not found: {symbol}")]
    SymbolNotFound {
        /// The missing symbol.
        symbol: String,
    },

    /// Account cannot fund the order.
    #[error("Insufficient funds: {message}")]
    InsufficientFunds {
        /// Exchange message.
        message: String,
    },

    /// Quantity below the exchange minimum.
    #[error("Quantity too small: {message}")]
    QuantityTooSmall {
        /// Exchange message.
        message: String,
    },

    /// Malformed request.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Error details.
        message: String,
    },

    /// Exchange rejected the request.
    #[error("Exchange rejected request ({code}): {message}")]
    Rejected {
        /// Exchange error code.
        code: i64,
        /// Exchange message.
        message: String,
    },

    /// Rate limited after exhausting retries.
    #[error("Rate limited by exchange")]
    RateLimited,

    /// Network failure after exhausting retries.
    #[error("Network error: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// Request timed out after exhausting retries.
    #[error("Request timed out")]
    Timeout,

    /// Exchange unavailable after exhausting retries.
    #[error("Exchange unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// Credentials refused.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Error details.
        message: String,
    },

    /// The request may have taken effect but no usable answer came back.
    /// Neither retried nor treated as a rejection.
    #[error("Outcome unknown: {message}")]
    Indeterminate {
        /// Error details.
        message: String,
    },
}

impl GatewayError {
    /// Returns true for failures a retry might cure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Network { .. } | Self::Timeout | Self::Unavailable { .. }
        )
    }

    /// Returns true if the exchange refused the request itself, as opposed to
    /// the request never getting a definite answer.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::SymbolNotFound { .. }
                | Self::InsufficientFunds { .. }
                | Self::QuantityTooSmall { .. }
                | Self::InvalidRequest { .. }
                | Self::Rejected { .. }
        )
    }

    /// Map onto the orchestration error taxonomy.
    #[must_use]
    pub fn into_order_error(self, operation: &str, symbol: &Symbol, quantity: Decimal) -> OrderError {
        match self {
            Self::InsufficientFunds { message } => OrderError::InsufficientFunds { message },
            Self::QuantityTooSmall { .. } => OrderError::QuantityTooSmall {
                symbol: symbol.to_string(),
                quantity,
                minimum: Decimal::ZERO,
            },
            Self::SymbolNotFound { symbol } => {
                OrderError::validation("symbol", format!("{symbol} is not listed on the exchange"))
            }
            Self::InvalidRequest { message } => OrderError::validation("request", message),
            other => OrderError::execution(operation, other.to_string()),
        }
    }
}

/// Port for exchange interactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Check connectivity.
    async fn ping(&self) -> Result<(), GatewayError>;

    /// Trading rules for a symbol; `None` if the exchange does not list it.
    async fn get_symbol_info(&self, symbol: &Symbol) -> Result<Option<SymbolMetadata>, GatewayError>;

    /// Last traded price (always positive).
    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal, GatewayError>;

    /// Submit an order.
    async fn place_order(&self, spec: &OrderSpec) -> Result<ExecutionReport, GatewayError>;

    /// Cancel one order.
    async fn cancel_order(
        &self,
        symbol: &Symbol,
        exchange_order_id: &ExchangeOrderId,
    ) -> Result<ExecutionReport, GatewayError>;

    /// Cancel every open order for a symbol in one call.
    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<(), GatewayError>;

    /// Current status of one order.
    async fn get_order_status(
        &self,
        symbol: &Symbol,
        exchange_order_id: &ExchangeOrderId,
    ) -> Result<ExecutionReport, GatewayError>;

    /// Set leverage for a symbol.
    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc() -> Symbol {
        Symbol::parse("BTCUSDT").unwrap()
    }

    #[test]
    fn transient_classification() {
        assert!(GatewayError::RateLimited.is_transient());
        assert!(GatewayError::Timeout.is_transient());
        assert!(
            GatewayError::Network {
                message: "reset".into()
            }
            .is_transient()
        );
        assert!(
            !GatewayError::Rejected {
                code: -2010,
                message: "no".into()
            }
            .is_transient()
        );
        assert!(
            !GatewayError::Authentication {
                message: "bad key".into()
            }
            .is_rejection()
        );
    }

    #[test]
    fn maps_onto_order_taxonomy() {
        let err = GatewayError::InsufficientFunds {
            message: "Margin is insufficient.".into(),
        }
        .into_order_error("place", &btc(), dec!(1));
        assert!(matches!(err, OrderError::InsufficientFunds { .. }));

        let err = GatewayError::QuantityTooSmall {
            message: "Quantity less than zero.".into(),
        }
        .into_order_error("place", &btc(), dec!(0.0001));
        assert!(matches!(err, OrderError::QuantityTooSmall { quantity, .. } if quantity == dec!(0.0001)));
        assert!(err.is_validation());

        let err = GatewayError::Timeout.into_order_error("cancel", &btc(), dec!(1));
        assert!(matches!(err, OrderError::Execution { ref operation, .. } if operation == "cancel"));
    }

    #[test]
    fn spec_mirrors_order() {
        let order = Order::new(crate::domain::order_execution::OrderRequest::limit(
            btc(),
            OrderSide::Sell,
            dec!(2),
            dec!(100),
        ))
        .unwrap();
        let spec = OrderSpec::from(&order);
        assert_eq!(&spec.client_order_id, order.id());
        assert_eq!(spec.price, Some(dec!(100)));
        assert_eq!(spec.kind, OrderKind::Limit);
    }
}
