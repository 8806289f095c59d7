//! Order Validator Service
//!
//! Stateless checks applied before any placement call: symbol tradability,
//! quantity and price positivity, lot-size rounding and strategy price ordering.

use rust_decimal::Decimal;

use crate::domain::order_execution::aggregate::OrderRequest;
use crate::domain::order_execution::errors::OrderError;
use crate::domain::order_execution::value_objects::{
    LotSize, OrderSide, PriceFilter, SymbolMetadata,
};
use crate::domain::shared::Symbol;

/// Order Validator.
pub struct OrderValidator;

impl OrderValidator {
    /// Require the symbol to exist, be trading, and carry every required permission.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` if the symbol is unknown or not tradable.
    pub fn validate_symbol<'a>(
        symbol: &Symbol,
        metadata: Option<&'a SymbolMetadata>,
        required_permissions: &[String],
    ) -> Result<&'a SymbolMetadata, OrderError> {
        let Some(metadata) = metadata else {
            return Err(OrderError::validation(
                "symbol",
                format!("{symbol} is not listed on the exchange"),
            ));
        };

        if !metadata.is_trading() {
            return Err(OrderError::validation(
                "symbol",
                format!("{symbol} is not trading (status {})", metadata.status),
            ));
        }

        if let Some(missing) = required_permissions
            .iter()
            .find(|p| !metadata.has_permission(p))
        {
            return Err(OrderError::validation(
                "symbol",
                format!(
                    "{symbol} lacks the {missing} permission (has {:?})",
                    metadata.permissions
                ),
            ));
        }

        Ok(metadata)
    }

    /// Validate a quantity and floor-round it to the lot step.
    ///
    /// Never rounds up, so the returned quantity is always `<= quantity`.
    ///
    /// # Errors
    ///
    /// - `Validation` if the quantity is not positive or exceeds the maximum.
    /// - `QuantityTooSmall` if it is below the minimum, before or after rounding.
    pub fn validate_quantity(
        symbol: &Symbol,
        quantity: Decimal,
        lot_size: Option<&LotSize>,
    ) -> Result<Decimal, OrderError> {
        if quantity <= Decimal::ZERO {
            return Err(OrderError::validation(
                "quantity",
                format!("must be greater than 0, got {quantity}"),
            ));
        }

        let Some(lot) = lot_size else {
            return Ok(quantity);
        };

        let too_small = |quantity| OrderError::QuantityTooSmall {
            symbol: symbol.to_string(),
            quantity,
            minimum: lot.min_qty,
        };

        if quantity < lot.min_qty {
            return Err(too_small(quantity));
        }

        if lot.max_qty > Decimal::ZERO && quantity > lot.max_qty {
            return Err(OrderError::validation(
                "quantity",
                format!("{quantity} exceeds maximum {} for {symbol}", lot.max_qty),
            ));
        }

        let rounded = Self::round_to_step(quantity, lot.step_size);
        if rounded <= Decimal::ZERO || rounded < lot.min_qty {
            return Err(too_small(rounded));
        }

        Ok(rounded)
    }

    /// Floor a quantity to a multiple of `step`. A non-positive step leaves it unchanged.
    #[must_use]
    pub fn round_to_step(quantity: Decimal, step: Decimal) -> Decimal {
        if step <= Decimal::ZERO {
            return quantity;
        }
        quantity
            .checked_div(step)
            .map_or(quantity, |steps| steps.floor() * step)
    }

    /// Validate a price against positivity and the exchange price filter.
    ///
    /// # Errors
    ///
    /// - `Validation` if the price is not positive or above the maximum.
    /// - `PriceTooSmall` if below the exchange minimum.
    pub fn validate_price(
        symbol: &Symbol,
        field: &str,
        price: Decimal,
        filter: Option<&PriceFilter>,
    ) -> Result<Decimal, OrderError> {
        if price <= Decimal::ZERO {
            return Err(OrderError::validation(
                field,
                format!("must be greater than 0, got {price}"),
            ));
        }

        if let Some(filter) = filter {
            if filter.min_price > Decimal::ZERO && price < filter.min_price {
                return Err(OrderError::PriceTooSmall {
                    symbol: symbol.to_string(),
                    field: field.to_string(),
                    price,
                    minimum: filter.min_price,
                });
            }
            if filter.max_price > Decimal::ZERO && price > filter.max_price {
                return Err(OrderError::validation(
                    field,
                    format!("{price} exceeds maximum {} for {symbol}", filter.max_price),
                ));
            }
        }

        Ok(price)
    }

    /// Validate a full order request against symbol metadata.
    ///
    /// Returns the request with its quantity rounded to the lot step.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn validate_request(
        request: &OrderRequest,
        metadata: &SymbolMetadata,
    ) -> Result<OrderRequest, OrderError> {
        let quantity =
            Self::validate_quantity(&request.symbol, request.quantity, metadata.lot_size.as_ref())?;

        if let Some(price) = request.price {
            Self::validate_price(&request.symbol, "price", price, metadata.price_filter.as_ref())?;
        }
        if let Some(stop_price) = request.stop_price {
            Self::validate_price(
                &request.symbol,
                "stop_price",
                stop_price,
                metadata.price_filter.as_ref(),
            )?;
        }

        Ok(OrderRequest {
            quantity,
            ..request.clone()
        })
    }

    /// OCO price ordering: for BUY the take-profit limit sits below the stop
    /// trigger, for SELL above it.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` when the ordering is violated.
    pub fn validate_oco_prices(
        side: OrderSide,
        limit_price: Decimal,
        stop_price: Decimal,
    ) -> Result<(), OrderError> {
        let ordered = match side {
            OrderSide::Buy => limit_price < stop_price,
            OrderSide::Sell => limit_price > stop_price,
        };
        if ordered {
            Ok(())
        } else {
            let relation = match side {
                OrderSide::Buy => "below",
                OrderSide::Sell => "above",
            };
            Err(OrderError::validation(
                "limit_price",
                format!(
                    "for {side} orders, limit price ({limit_price}) must be {relation} stop price ({stop_price})"
                ),
            ))
        }
    }

    /// Stop-limit trigger sanity check against the market.
    ///
    /// A BUY stop should sit above the market, a SELL stop below. This is
    /// advisory: returns a warning message instead of failing.
    #[must_use]
    pub fn stop_trigger_warning(
        side: OrderSide,
        stop_price: Decimal,
        market_price: Decimal,
    ) -> Option<String> {
        match side {
            OrderSide::Buy if stop_price <= market_price => Some(format!(
                "BUY stop price {stop_price} is not above current price {market_price}"
            )),
            OrderSide::Sell if stop_price >= market_price => Some(format!(
                "SELL stop price {stop_price} is not below current price {market_price}"
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn btc() -> Symbol {
        Symbol::parse("BTCUSDT").unwrap()
    }

    fn lot() -> LotSize {
        LotSize {
            min_qty: dec!(0.001),
            max_qty: dec!(1000),
            step_size: dec!(0.001),
        }
    }

    #[test]
    fn quantity_is_floor_rounded_to_step() {
        let qty = OrderValidator::validate_quantity(&btc(), dec!(0.0519), Some(&lot())).unwrap();
        assert_eq!(qty, dec!(0.051));
    }

    #[test]
    fn quantity_below_minimum_is_too_small() {
        let err = OrderValidator::validate_quantity(&btc(), dec!(0.0005), Some(&lot())).unwrap_err();
        assert!(matches!(err, OrderError::QuantityTooSmall { .. }));
    }

    #[test]
    fn quantity_above_maximum_is_validation_error() {
        let err = OrderValidator::validate_quantity(&btc(), dec!(1000.5), Some(&lot())).unwrap_err();
        assert!(matches!(err, OrderError::Validation { .. }));
    }

    #[test_case(dec!(0) ; "zero")]
    #[test_case(dec!(-1) ; "negative")]
    fn non_positive_quantity_rejected(quantity: Decimal) {
        let err = OrderValidator::validate_quantity(&btc(), quantity, None).unwrap_err();
        assert!(matches!(err, OrderError::Validation { .. }));
    }

    #[test]
    fn quantity_without_metadata_passes_through() {
        let qty = OrderValidator::validate_quantity(&btc(), dec!(0.12345), None).unwrap();
        assert_eq!(qty, dec!(0.12345));
    }

    #[test]
    fn symbol_must_be_listed_trading_and_permitted() {
        let symbol = btc();
        let perms = vec!["TRADING".to_string()];
        assert!(OrderValidator::validate_symbol(&symbol, None, &perms).is_err());

        let mut metadata = SymbolMetadata::trading(symbol.clone());
        assert!(OrderValidator::validate_symbol(&symbol, Some(&metadata), &perms).is_ok());

        metadata.status = "SETTLING".to_string();
        assert!(OrderValidator::validate_symbol(&symbol, Some(&metadata), &perms).is_err());

        let metadata = SymbolMetadata::trading(symbol.clone());
        let margin = vec!["MARGIN".to_string()];
        let err = OrderValidator::validate_symbol(&symbol, Some(&metadata), &margin).unwrap_err();
        assert!(err.to_string().contains("MARGIN"));
    }

    #[test]
    fn price_below_filter_minimum_is_too_small() {
        let filter = PriceFilter {
            min_price: dec!(0.1),
            max_price: dec!(1000000),
            tick_size: dec!(0.1),
        };
        let err =
            OrderValidator::validate_price(&btc(), "price", dec!(0.05), Some(&filter)).unwrap_err();
        assert!(matches!(err, OrderError::PriceTooSmall { .. }));
        assert!(OrderValidator::validate_price(&btc(), "price", dec!(0), None).is_err());
    }

    #[test]
    fn oco_buy_requires_limit_below_stop() {
        assert!(OrderValidator::validate_oco_prices(OrderSide::Buy, dec!(49000), dec!(50000)).is_ok());
        let err = OrderValidator::validate_oco_prices(OrderSide::Buy, dec!(51000), dec!(50000))
            .unwrap_err();
        assert!(err.to_string().contains("below"));
    }

    #[test]
    fn oco_sell_requires_limit_above_stop() {
        assert!(
            OrderValidator::validate_oco_prices(OrderSide::Sell, dec!(52000), dec!(50000)).is_ok()
        );
        assert!(
            OrderValidator::validate_oco_prices(OrderSide::Sell, dec!(50000), dec!(50000)).is_err()
        );
    }

    #[test]
    fn stop_trigger_only_warns() {
        assert!(OrderValidator::stop_trigger_warning(OrderSide::Buy, dec!(51000), dec!(50000)).is_none());
        assert!(OrderValidator::stop_trigger_warning(OrderSide::Buy, dec!(49000), dec!(50000)).is_some());
        assert!(OrderValidator::stop_trigger_warning(OrderSide::Sell, dec!(49000), dec!(50000)).is_none());
        assert!(OrderValidator::stop_trigger_warning(OrderSide::Sell, dec!(50000), dec!(50000)).is_some());
    }

    proptest! {
        #[test]
        fn rounded_quantity_is_floor_multiple_of_step(
            units in 1u64..10_000_000,
            step_exp in 0u32..6,
        ) {
            let quantity = Decimal::new(units as i64, 4);
            let step = Decimal::new(1, step_exp);
            let rounded = OrderValidator::round_to_step(quantity, step);
            prop_assert!(rounded <= quantity);
            prop_assert_eq!(rounded, (quantity / step).floor() * step);
            prop_assert!(quantity - rounded < step);
        }
    }
}
