//! Exchange execution report.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderStatus;
use crate::domain::shared::ExchangeOrderId;

/// Status snapshot for one exchange order.
///
/// Returned by placement, cancellation and status queries alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Exchange-assigned order id.
    pub exchange_order_id: ExchangeOrderId,
    /// Status as reported by the exchange.
    pub status: OrderStatus,
    /// Cumulative executed quantity.
    pub filled_quantity: Decimal,
    /// Average fill price (zero when nothing executed).
    pub avg_fill_price: Decimal,
    /// Commission charged so far (zero when the exchange omits it).
    pub commission: Decimal,
    /// Exchange update time, if reported.
    pub updated_at: Option<DateTime<Utc>>,
}

impl ExecutionReport {
    /// Report for a freshly accepted, unfilled order.
    #[must_use]
    pub fn accepted(exchange_order_id: ExchangeOrderId) -> Self {
        Self {
            exchange_order_id,
            status: OrderStatus::New,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            commission: Decimal::ZERO,
            updated_at: None,
        }
    }

    /// Set status and cumulative fill.
    #[must_use]
    pub fn with_fill(
        mut self,
        status: OrderStatus,
        filled_quantity: Decimal,
        avg_fill_price: Decimal,
    ) -> Self {
        self.status = status;
        self.filled_quantity = filled_quantity;
        self.avg_fill_price = avg_fill_price;
        self
    }
}
