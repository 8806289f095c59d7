//! Managed Order
//!
//! Binds one `Order` to the gateway that executes it. Every mutation of the
//! order follows a gateway call.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::application::ports::{ExchangeGateway, OrderSpec};
use crate::domain::order_execution::{Order, OrderError, OrderRequest, OrderStatus};

/// One order and its lifecycle operations.
pub struct ManagedOrder<G: ?Sized> {
    gateway: Arc<G>,
    order: Order,
}

impl<G: ?Sized> std::fmt::Debug for ManagedOrder<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedOrder")
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl<G: ExchangeGateway + ?Sized> ManagedOrder<G> {
    /// Wrap an existing order.
    pub const fn new(gateway: Arc<G>, order: Order) -> Self {
        Self { gateway, order }
    }

    /// Build a fresh `Initialized` order from a request.
    ///
    /// # Errors
    ///
    /// Returns error if the request violates the per-kind price rules.
    pub fn from_request(gateway: Arc<G>, request: OrderRequest) -> Result<Self, OrderError> {
        Ok(Self::new(gateway, Order::new(request)?))
    }

    /// Current order state.
    pub const fn order(&self) -> &Order {
        &self.order
    }

    /// Current status.
    pub const fn status(&self) -> OrderStatus {
        self.order.status()
    }

    /// Submit the order.
    ///
    /// On success the order moves to the reported status (usually `New`, or
    /// `Filled` for an immediate execution). An exchange rejection marks it
    /// `Rejected`; a transport failure leaves it `Initialized`.
    ///
    /// Returns the status the order reached.
    ///
    /// # Errors
    ///
    /// Returns the classified placement failure.
    pub async fn place(&mut self) -> Result<OrderStatus, OrderError> {
        if self.order.status() != OrderStatus::Initialized {
            return Err(OrderError::validation(
                "status",
                format!(
                    "order {} already placed ({})",
                    self.order.id(),
                    self.order.status()
                ),
            ));
        }

        let spec = OrderSpec::from(&self.order);
        tracing::info!(
            order_id = %self.order.id(),
            symbol = %spec.symbol,
            side = %spec.side,
            kind = %spec.kind,
            quantity = %spec.quantity,
            price = ?spec.price,
            stop_price = ?spec.stop_price,
            "Placing order"
        );

        match self.gateway.place_order(&spec).await {
            Ok(report) => {
                self.order.record_acceptance(&report)?;
                tracing::info!(
                    order_id = %self.order.id(),
                    exchange_order_id = %report.exchange_order_id,
                    status = %report.status,
                    filled_quantity = %report.filled_quantity,
                    "Order accepted"
                );
                Ok(self.order.status())
            }
            Err(e) => {
                if e.is_rejection() {
                    self.order.mark_rejected()?;
                }
                tracing::error!(
                    order_id = %self.order.id(),
                    operation = "place",
                    symbol = %spec.symbol,
                    side = %spec.side,
                    quantity = %spec.quantity,
                    price = ?spec.price,
                    status = %self.order.status(),
                    error = %e,
                    "Order placement failed"
                );
                Err(e.into_order_error("place", &spec.symbol, spec.quantity))
            }
        }
    }

    /// Cancel the order on the exchange.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the order is terminal or has no exchange id, or
    /// the classified cancellation failure.
    pub async fn cancel(&mut self) -> Result<(), OrderError> {
        let Some(exchange_order_id) = self.order.exchange_order_id().cloned() else {
            return Err(OrderError::validation(
                "exchange_order_id",
                format!("order {} has not been placed", self.order.id()),
            ));
        };
        if self.order.status().is_terminal() {
            return Err(OrderError::validation(
                "status",
                format!(
                    "order {} is already {}",
                    self.order.id(),
                    self.order.status()
                ),
            ));
        }

        let symbol = self.order.symbol().clone();
        match self.gateway.cancel_order(&symbol, &exchange_order_id).await {
            Ok(report) => {
                self.order.mark_canceled(Some(&report))?;
                tracing::info!(
                    order_id = %self.order.id(),
                    exchange_order_id = %exchange_order_id,
                    symbol = %symbol,
                    filled_quantity = %self.order.filled_quantity(),
                    "Order canceled"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    order_id = %self.order.id(),
                    exchange_order_id = %exchange_order_id,
                    operation = "cancel",
                    symbol = %symbol,
                    side = %self.order.side(),
                    quantity = %self.order.quantity(),
                    error = %e,
                    "Order cancellation failed"
                );
                Err(e.into_order_error("cancel", &symbol, self.order.quantity()))
            }
        }
    }

    /// Record a cancellation the exchange confirmed for a batch of orders
    /// (cancel-all for the symbol). Unplaced or terminal orders are left alone.
    ///
    /// # Errors
    ///
    /// Returns error if the local transition is illegal.
    pub fn confirm_batch_cancel(&mut self) -> Result<bool, OrderError> {
        if self.order.exchange_order_id().is_none() || self.order.status().is_terminal() {
            return Ok(false);
        }
        self.order.mark_canceled(None)?;
        Ok(true)
    }

    /// Poll the exchange and apply any change.
    ///
    /// Returns `true` if the order changed. Terminal orders are not polled.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the order was never placed, or the classified
    /// query failure.
    pub async fn refresh_status(&mut self) -> Result<bool, OrderError> {
        let Some(exchange_order_id) = self.order.exchange_order_id().cloned() else {
            return Err(OrderError::validation(
                "exchange_order_id",
                format!("order {} has not been placed", self.order.id()),
            ));
        };
        if self.order.status().is_terminal() {
            return Ok(false);
        }

        let symbol = self.order.symbol().clone();
        let report = self
            .gateway
            .get_order_status(&symbol, &exchange_order_id)
            .await
            .map_err(|e| {
                tracing::warn!(
                    exchange_order_id = %exchange_order_id,
                    symbol = %symbol,
                    operation = "status",
                    error = %e,
                    "Order status query failed"
                );
                e.into_order_error("status", &symbol, self.order.quantity())
            })?;

        let previous = self.order.status();
        let changed = self.order.apply_report(&report)?;
        if changed {
            tracing::debug!(
                exchange_order_id = %exchange_order_id,
                from = %previous,
                to = %self.order.status(),
                filled_quantity = %self.order.filled_quantity(),
                "Order status updated"
            );
        }
        Ok(changed)
    }

    /// Amend by cancel-then-replace.
    ///
    /// If the cancel succeeds but the replacement placement fails, this order
    /// stays `Canceled` and the error is returned; check `status()` afterwards.
    ///
    /// # Errors
    ///
    /// Returns error if no field changes, the amended order is invalid, or
    /// either gateway call fails.
    pub async fn modify(
        &mut self,
        quantity: Option<Decimal>,
        price: Option<Decimal>,
        stop_price: Option<Decimal>,
    ) -> Result<&Order, OrderError> {
        let replacement = self.order.replacement(quantity, price, stop_price)?;
        self.cancel().await?;

        let mut replacement = Self::new(Arc::clone(&self.gateway), replacement);
        if let Err(e) = replacement.place().await {
            tracing::error!(
                order_id = %self.order.id(),
                operation = "modify",
                symbol = %self.order.symbol(),
                quantity = ?quantity,
                price = ?price,
                stop_price = ?stop_price,
                error = %e,
                "Replacement failed after cancel; original order left canceled"
            );
            return Err(e);
        }

        self.order = replacement.order;
        Ok(&self.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{GatewayError, MockExchangeGateway};
    use crate::domain::order_execution::{ExecutionReport, OrderSide};
    use crate::domain::shared::{ExchangeOrderId, Symbol};
    use rust_decimal_macros::dec;

    fn request() -> OrderRequest {
        OrderRequest::limit(
            Symbol::parse("BTCUSDT").unwrap(),
            OrderSide::Buy,
            dec!(1),
            dec!(50000),
        )
    }

    fn new_report(id: &str) -> ExecutionReport {
        ExecutionReport::accepted(ExchangeOrderId::from(id))
    }

    #[tokio::test]
    async fn place_moves_to_new() {
        let mut gateway = MockExchangeGateway::new();
        gateway
            .expect_place_order()
            .times(1)
            .returning(|_| Ok(new_report("100")));

        let mut managed = ManagedOrder::from_request(Arc::new(gateway), request()).unwrap();
        assert_eq!(managed.place().await.unwrap(), OrderStatus::New);
        assert_eq!(managed.status(), OrderStatus::New);
        assert!(managed.place().await.is_err());
    }

    #[tokio::test]
    async fn rejection_marks_rejected() {
        let mut gateway = MockExchangeGateway::new();
        gateway.expect_place_order().returning(|_| {
            Err(GatewayError::InsufficientFunds {
                message: "Margin is insufficient.".into(),
            })
        });

        let mut managed = ManagedOrder::from_request(Arc::new(gateway), request()).unwrap();
        let err = managed.place().await.unwrap_err();
        assert!(matches!(err, OrderError::InsufficientFunds { .. }));
        assert_eq!(managed.status(), OrderStatus::Rejected);
    }

    #[tokio::test]
    async fn transport_failure_leaves_initialized() {
        let mut gateway = MockExchangeGateway::new();
        gateway
            .expect_place_order()
            .returning(|_| Err(GatewayError::Timeout));

        let mut managed = ManagedOrder::from_request(Arc::new(gateway), request()).unwrap();
        let err = managed.place().await.unwrap_err();
        assert!(matches!(err, OrderError::Execution { .. }));
        assert_eq!(managed.status(), OrderStatus::Initialized);
    }

    #[tokio::test]
    async fn unknown_outcome_leaves_initialized() {
        let mut gateway = MockExchangeGateway::new();
        gateway.expect_place_order().returning(|_| {
            Err(GatewayError::Indeterminate {
                message: "expected value at line 1 column 1".into(),
            })
        });

        let mut managed = ManagedOrder::from_request(Arc::new(gateway), request()).unwrap();
        let err = managed.place().await.unwrap_err();
        assert!(matches!(err, OrderError::Execution { .. }));
        assert_eq!(managed.status(), OrderStatus::Initialized);
    }

    #[tokio::test]
    async fn cancel_requires_exchange_id() {
        let gateway = MockExchangeGateway::new();
        let mut managed = ManagedOrder::from_request(Arc::new(gateway), request()).unwrap();
        assert!(managed.cancel().await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn refresh_applies_delta_once() {
        let mut gateway = MockExchangeGateway::new();
        gateway
            .expect_place_order()
            .returning(|_| Ok(new_report("100")));
        gateway.expect_get_order_status().times(2).returning(|_, id| {
            Ok(ExecutionReport::accepted(id.clone()).with_fill(
                OrderStatus::PartiallyFilled,
                dec!(0.4),
                dec!(50000),
            ))
        });

        let mut managed = ManagedOrder::from_request(Arc::new(gateway), request()).unwrap();
        managed.place().await.unwrap();
        assert!(managed.refresh_status().await.unwrap());
        assert!(!managed.refresh_status().await.unwrap());
        assert_eq!(managed.order().filled_quantity(), dec!(0.4));
    }

    #[tokio::test]
    async fn modify_left_canceled_when_replacement_fails() {
        let mut gateway = MockExchangeGateway::new();
        let mut seq = mockall::Sequence::new();
        gateway
            .expect_place_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(new_report("100")));
        gateway
            .expect_cancel_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, id| {
                Ok(ExecutionReport::accepted(id.clone()).with_fill(
                    OrderStatus::Canceled,
                    Decimal::ZERO,
                    Decimal::ZERO,
                ))
            });
        gateway
            .expect_place_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(GatewayError::Rejected {
                    code: -2010,
                    message: "Order would immediately trigger.".into(),
                })
            });

        let mut managed = ManagedOrder::from_request(Arc::new(gateway), request()).unwrap();
        managed.place().await.unwrap();
        assert!(managed.modify(None, Some(dec!(49000)), None).await.is_err());
        assert_eq!(managed.status(), OrderStatus::Canceled);
        assert_eq!(managed.order().price(), Some(dec!(50000)));
    }

    #[tokio::test]
    async fn modify_swaps_in_replacement() {
        let mut gateway = MockExchangeGateway::new();
        gateway
            .expect_place_order()
            .times(2)
            .returning(|spec| Ok(new_report(&format!("id-{}", spec.price.unwrap_or_default()))));
        gateway.expect_cancel_order().times(1).returning(|_, id| {
            Ok(ExecutionReport::accepted(id.clone()).with_fill(
                OrderStatus::Canceled,
                Decimal::ZERO,
                Decimal::ZERO,
            ))
        });

        let mut managed = ManagedOrder::from_request(Arc::new(gateway), request()).unwrap();
        managed.place().await.unwrap();
        let original_id = managed.order().id().clone();
        managed.modify(None, Some(dec!(49000)), None).await.unwrap();
        assert_ne!(managed.order().id(), &original_id);
        assert_eq!(managed.status(), OrderStatus::New);
        assert_eq!(managed.order().price(), Some(dec!(49000)));
    }
}
