//! Order execution errors.
//!
//! Everything that reaches the orchestration layer is final for that call:
//! transient transport failures were already retried by the gateway.

use rust_decimal::Decimal;
use thiserror::Error;

use super::value_objects::OrderStatus;

/// Errors surfaced by order validation, placement and lifecycle management.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Bad input shape or range. Never retried.
    #[error("Invalid {field}: {message}")]
    Validation {
        /// Offending field.
        field: String,
        /// What was wrong with it.
        message: String,
    },

    /// Quantity below the exchange's minimum lot size.
    #[error("Quantity {quantity} is below minimum {minimum} for {symbol}")]
    QuantityTooSmall {
        /// Symbol being traded.
        symbol: String,
        /// Requested quantity.
        quantity: Decimal,
        /// Exchange minimum (zero when the exchange gave no figure).
        minimum: Decimal,
    },

    /// Price below the exchange's minimum price.
    #[error("{field} {price} is below minimum {minimum} for {symbol}")]
    PriceTooSmall {
        /// Symbol being traded.
        symbol: String,
        /// Which price field (`price` or `stop_price`).
        field: String,
        /// Requested price.
        price: Decimal,
        /// Exchange minimum.
        minimum: Decimal,
    },

    /// Account cannot fund the order. Never retried.
    #[error("Insufficient funds: {message}")]
    InsufficientFunds {
        /// Exchange message.
        message: String,
    },

    /// Placement, cancellation or query failed for any other reason.
    #[error("Order {operation} failed: {message}")]
    Execution {
        /// Attempted operation (`place`, `cancel`, `status`, ...).
        operation: String,
        /// Failure description.
        message: String,
    },

    /// Exchange reported a status the lifecycle does not allow.
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        /// Current status.
        from: OrderStatus,
        /// Attempted status.
        to: OrderStatus,
        /// Reason for failure.
        reason: String,
    },
}

impl OrderError {
    /// Shorthand for a `Validation` error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an `Execution` error.
    pub fn execution(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// True for input errors, including the precision-boundary specializations.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::QuantityTooSmall { .. } | Self::PriceTooSmall { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn precision_errors_count_as_validation() {
        let err = OrderError::QuantityTooSmall {
            symbol: "BTCUSDT".to_string(),
            quantity: dec!(0.0001),
            minimum: dec!(0.001),
        };
        assert!(err.is_validation());
        assert!(OrderError::validation("side", "bad").is_validation());
        assert!(!OrderError::execution("place", "boom").is_validation());
        assert!(
            !OrderError::InsufficientFunds {
                message: "margin".to_string()
            }
            .is_validation()
        );
    }

    #[test]
    fn display_carries_context() {
        let err = OrderError::QuantityTooSmall {
            symbol: "BTCUSDT".to_string(),
            quantity: dec!(0.0001),
            minimum: dec!(0.001),
        };
        assert_eq!(
            err.to_string(),
            "Quantity 0.0001 is below minimum 0.001 for BTCUSDT"
        );

        let err = OrderError::InvalidStateTransition {
            from: OrderStatus::Filled,
            to: OrderStatus::New,
            reason: "terminal".to_string(),
        };
        assert!(err.to_string().contains("FILLED to NEW"));
    }
}
