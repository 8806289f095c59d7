//! One-Cancels-Other pair definition.
//!
//! Both legs trade the group's side: leg A is a resting limit at the
//! take-profit price, leg B a stop-limit that triggers at `stop_price`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::{OrderError, OrderRequest, OrderSide, OrderValidator};
use crate::domain::shared::Symbol;

/// Parameters of an OCO group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcoParams {
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Side of both legs.
    pub side: OrderSide,
    /// Quantity of each leg.
    pub quantity: Decimal,
    /// Take-profit limit price (leg A).
    pub limit_price: Decimal,
    /// Stop trigger price (leg B).
    pub stop_price: Decimal,
    /// Limit price once the stop triggers (leg B).
    pub stop_limit_price: Decimal,
}

impl OcoParams {
    /// Check positivity and the side-dependent price ordering.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` before any placement would happen.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.quantity <= Decimal::ZERO {
            return Err(OrderError::validation(
                "quantity",
                format!("must be greater than 0, got {}", self.quantity),
            ));
        }
        for (field, value) in [
            ("limit_price", self.limit_price),
            ("stop_price", self.stop_price),
            ("stop_limit_price", self.stop_limit_price),
        ] {
            if value <= Decimal::ZERO {
                return Err(OrderError::validation(
                    field,
                    format!("must be greater than 0, got {value}"),
                ));
            }
        }
        OrderValidator::validate_oco_prices(self.side, self.limit_price, self.stop_price)
    }

    /// Leg A request.
    #[must_use]
    pub fn limit_leg(&self) -> OrderRequest {
        OrderRequest::limit(self.symbol.clone(), self.side, self.quantity, self.limit_price)
    }

    /// Leg B request.
    #[must_use]
    pub fn stop_leg(&self) -> OrderRequest {
        OrderRequest::stop_limit(
            self.symbol.clone(),
            self.side,
            self.quantity,
            self.stop_price,
            self.stop_limit_price,
        )
    }
}

/// Lifecycle of an OCO group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OcoStatus {
    /// Not placed yet.
    Pending,
    /// Both legs resting.
    Active,
    /// Leg A filled, leg B canceled (or being canceled).
    LimitFilled,
    /// Leg B filled, leg A canceled (or being canceled).
    StopFilled,
    /// Both legs filled inside the mutual-cancel window.
    BothFilled,
    /// Both legs canceled, or one leg ended without a fill.
    Canceled,
    /// Placement failed; no leg is left resting.
    Failed,
}

impl OcoStatus {
    /// Returns true when the group needs no further reconciliation.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending | Self::Active)
    }
}

impl std::fmt::Display for OcoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::LimitFilled => "LIMIT_FILLED",
            Self::StopFilled => "STOP_FILLED",
            Self::BothFilled => "BOTH_FILLED",
            Self::Canceled => "CANCELED",
            Self::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}
