//! Order Preparer
//!
//! Runs the validator against live exchange metadata before any placement.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::application::ports::ExchangeGateway;
use crate::domain::order_execution::{
    OrderError, OrderKind, OrderRequest, OrderValidator, SymbolMetadata,
};
use crate::domain::shared::Symbol;

/// Fetches metadata and validates requests against it.
pub struct OrderPreparer<G: ?Sized> {
    gateway: Arc<G>,
    required_permissions: Vec<String>,
}

impl<G: ExchangeGateway + ?Sized> OrderPreparer<G> {
    /// Create a preparer requiring the given symbol permissions.
    pub const fn new(gateway: Arc<G>, required_permissions: Vec<String>) -> Self {
        Self {
            gateway,
            required_permissions,
        }
    }

    /// Fetch metadata and require the symbol to be tradable.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the symbol is unknown or not tradable, or the
    /// classified query failure.
    pub async fn tradable_metadata(&self, symbol: &Symbol) -> Result<SymbolMetadata, OrderError> {
        let metadata = self
            .gateway
            .get_symbol_info(symbol)
            .await
            .map_err(|e| e.into_order_error("symbol_info", symbol, Decimal::ZERO))?;
        OrderValidator::validate_symbol(symbol, metadata.as_ref(), &self.required_permissions)?;
        metadata.ok_or_else(|| {
            OrderError::validation("symbol", format!("{symbol} is not listed on the exchange"))
        })
    }

    /// Current market price.
    ///
    /// # Errors
    ///
    /// Returns the classified query failure, or `Execution` for a non-positive price.
    pub async fn market_price(&self, symbol: &Symbol) -> Result<Decimal, OrderError> {
        let price = self
            .gateway
            .get_price(symbol)
            .await
            .map_err(|e| e.into_order_error("price", symbol, Decimal::ZERO))?;
        if price <= Decimal::ZERO {
            return Err(OrderError::execution(
                "price",
                format!("exchange returned non-positive price {price} for {symbol}"),
            ));
        }
        Ok(price)
    }

    /// Validate a request and round its quantity to the lot step.
    ///
    /// Stop-limit requests are checked against the market price; a trigger on
    /// the wrong side of the market only logs a warning.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub async fn prepare(&self, request: &OrderRequest) -> Result<OrderRequest, OrderError> {
        request.validate()?;
        let metadata = self.tradable_metadata(&request.symbol).await?;
        let prepared = OrderValidator::validate_request(request, &metadata)?;

        if prepared.kind == OrderKind::StopLimit
            && let Some(stop_price) = prepared.stop_price
        {
            match self.market_price(&prepared.symbol).await {
                Ok(market) => {
                    if let Some(warning) =
                        OrderValidator::stop_trigger_warning(prepared.side, stop_price, market)
                    {
                        tracing::warn!(symbol = %prepared.symbol, "{warning}");
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        symbol = %prepared.symbol,
                        error = %e,
                        "Could not fetch price for stop trigger check"
                    );
                }
            }
        }

        if prepared.quantity != request.quantity {
            tracing::debug!(
                symbol = %prepared.symbol,
                requested = %request.quantity,
                rounded = %prepared.quantity,
                "Quantity rounded to lot step"
            );
        }
        Ok(prepared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockExchangeGateway;
    use crate::domain::order_execution::OrderSide;
    use rust_decimal_macros::dec;

    fn btc() -> Symbol {
        Symbol::parse("BTCUSDT").unwrap()
    }

    fn gateway_with(metadata: Option<SymbolMetadata>) -> MockExchangeGateway {
        let mut gateway = MockExchangeGateway::new();
        gateway
            .expect_get_symbol_info()
            .returning(move |_| Ok(metadata.clone()));
        gateway.expect_get_price().returning(|_| Ok(dec!(50000)));
        gateway
    }

    fn preparer(gateway: MockExchangeGateway) -> OrderPreparer<MockExchangeGateway> {
        OrderPreparer::new(Arc::new(gateway), vec!["TRADING".to_string()])
    }

    #[tokio::test]
    async fn rounds_quantity_down() {
        let metadata = SymbolMetadata::trading(btc()).with_lot_size(dec!(0.001), dec!(100), dec!(0.001));
        let preparer = preparer(gateway_with(Some(metadata)));
        let request = OrderRequest::market(btc(), OrderSide::Buy, dec!(0.0159));
        let prepared = preparer.prepare(&request).await.unwrap();
        assert_eq!(prepared.quantity, dec!(0.015));
    }

    #[tokio::test]
    async fn unknown_symbol_is_validation_error() {
        let preparer = preparer(gateway_with(None));
        let request = OrderRequest::market(btc(), OrderSide::Buy, dec!(1));
        assert!(preparer.prepare(&request).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn below_minimum_lot_is_too_small() {
        let metadata = SymbolMetadata::trading(btc()).with_lot_size(dec!(0.001), dec!(100), dec!(0.001));
        let preparer = preparer(gateway_with(Some(metadata)));
        let request = OrderRequest::market(btc(), OrderSide::Buy, dec!(0.0005));
        let err = preparer.prepare(&request).await.unwrap_err();
        assert!(matches!(err, OrderError::QuantityTooSmall { .. }));
    }

    #[tokio::test]
    async fn stop_on_wrong_side_is_only_a_warning() {
        let preparer = preparer(gateway_with(Some(SymbolMetadata::trading(btc()))));
        let request = OrderRequest::stop_limit(btc(), OrderSide::Buy, dec!(1), dec!(49000), dec!(49100));
        assert!(preparer.prepare(&request).await.is_ok());
    }
}
