//! Order Aggregate
//!
//! One exchange-level order. Created locally in `Initialized`, moved to an
//! exchange state by the placement result, and afterwards mutated only by
//! execution reports obtained from gateway calls.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::errors::OrderError;
use crate::domain::order_execution::services::OrderStateMachine;
use crate::domain::order_execution::value_objects::{
    ExecutionReport, OrderKind, OrderSide, OrderStatus, TimeInForce,
};
use crate::domain::shared::{ExchangeOrderId, OrderId, Symbol};

/// Request to create an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Order side.
    pub side: OrderSide,
    /// Order kind.
    pub kind: OrderKind,
    /// Quantity in base asset.
    pub quantity: Decimal,
    /// Limit price (LIMIT and STOP_LIMIT).
    pub price: Option<Decimal>,
    /// Stop trigger price (STOP_LIMIT).
    pub stop_price: Option<Decimal>,
    /// Time in force.
    #[serde(default)]
    pub time_in_force: TimeInForce,
    /// Only reduce an existing position.
    #[serde(default)]
    pub reduce_only: bool,
}

impl OrderRequest {
    /// Market order request.
    #[must_use]
    pub const fn market(symbol: Symbol, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol,
            side,
            kind: OrderKind::Market,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: TimeInForce::Gtc,
            reduce_only: false,
        }
    }

    /// Limit order request.
    #[must_use]
    pub const fn limit(symbol: Symbol, side: OrderSide, quantity: Decimal, price: Decimal) -> Self {
        Self {
            symbol,
            side,
            kind: OrderKind::Limit,
            quantity,
            price: Some(price),
            stop_price: None,
            time_in_force: TimeInForce::Gtc,
            reduce_only: false,
        }
    }

    /// Stop-limit order request.
    #[must_use]
    pub const fn stop_limit(
        symbol: Symbol,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            symbol,
            side,
            kind: OrderKind::StopLimit,
            quantity,
            price: Some(limit_price),
            stop_price: Some(stop_price),
            time_in_force: TimeInForce::Gtc,
            reduce_only: false,
        }
    }

    /// Set time in force.
    #[must_use]
    pub const fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Mark as reduce-only.
    #[must_use]
    pub const fn with_reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = reduce_only;
        self
    }

    /// Check the per-kind price rules and positivity.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` naming the offending field.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.quantity <= Decimal::ZERO {
            return Err(OrderError::validation(
                "quantity",
                format!("must be greater than 0, got {}", self.quantity),
            ));
        }

        match (self.kind.requires_price(), self.price) {
            (true, None) => {
                return Err(OrderError::validation(
                    "price",
                    format!("{} orders require a price", self.kind),
                ));
            }
            (false, Some(_)) => {
                return Err(OrderError::validation(
                    "price",
                    format!("{} orders must not carry a price", self.kind),
                ));
            }
            (true, Some(price)) if price <= Decimal::ZERO => {
                return Err(OrderError::validation("price", "must be greater than 0"));
            }
            _ => {}
        }

        match (self.kind.requires_stop_price(), self.stop_price) {
            (true, None) => Err(OrderError::validation(
                "stop_price",
                format!("{} orders require a stop price", self.kind),
            )),
            (false, Some(_)) => Err(OrderError::validation(
                "stop_price",
                format!("{} orders must not carry a stop price", self.kind),
            )),
            (true, Some(stop)) if stop <= Decimal::ZERO => Err(OrderError::validation(
                "stop_price",
                "must be greater than 0",
            )),
            _ => Ok(()),
        }
    }
}

/// Order entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    symbol: Symbol,
    side: OrderSide,
    kind: OrderKind,
    quantity: Decimal,
    price: Option<Decimal>,
    stop_price: Option<Decimal>,
    time_in_force: TimeInForce,
    reduce_only: bool,
    exchange_order_id: Option<ExchangeOrderId>,
    status: OrderStatus,
    filled_quantity: Decimal,
    avg_fill_price: Decimal,
    commission: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    filled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a new order in `Initialized` state.
    ///
    /// # Errors
    ///
    /// Returns error if the request violates the per-kind price rules.
    pub fn new(request: OrderRequest) -> Result<Self, OrderError> {
        request.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: OrderId::generate(),
            symbol: request.symbol,
            side: request.side,
            kind: request.kind,
            quantity: request.quantity,
            price: request.price,
            stop_price: request.stop_price,
            time_in_force: request.time_in_force,
            reduce_only: request.reduce_only,
            exchange_order_id: None,
            status: OrderStatus::Initialized,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            commission: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            filled_at: None,
        })
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// Local order id (client order id).
    #[must_use]
    pub const fn id(&self) -> &OrderId {
        &self.id
    }

    /// Symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Kind.
    #[must_use]
    pub const fn kind(&self) -> OrderKind {
        self.kind
    }

    /// Ordered quantity.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Limit price.
    #[must_use]
    pub const fn price(&self) -> Option<Decimal> {
        self.price
    }

    /// Stop trigger price.
    #[must_use]
    pub const fn stop_price(&self) -> Option<Decimal> {
        self.stop_price
    }

    /// Time in force.
    #[must_use]
    pub const fn time_in_force(&self) -> TimeInForce {
        self.time_in_force
    }

    /// Reduce-only flag.
    #[must_use]
    pub const fn reduce_only(&self) -> bool {
        self.reduce_only
    }

    /// Exchange-assigned id, once accepted.
    #[must_use]
    pub const fn exchange_order_id(&self) -> Option<&ExchangeOrderId> {
        self.exchange_order_id.as_ref()
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Cumulative filled quantity.
    #[must_use]
    pub const fn filled_quantity(&self) -> Decimal {
        self.filled_quantity
    }

    /// Quantity still open.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    /// Average fill price.
    #[must_use]
    pub const fn avg_fill_price(&self) -> Decimal {
        self.avg_fill_price
    }

    /// Commission paid.
    #[must_use]
    pub const fn commission(&self) -> Decimal {
        self.commission
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last mutation time.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Time the order became fully filled.
    #[must_use]
    pub const fn filled_at(&self) -> Option<DateTime<Utc>> {
        self.filled_at
    }

    /// Rebuild the request this order was created from.
    #[must_use]
    pub fn to_request(&self) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            side: self.side,
            kind: self.kind,
            quantity: self.quantity,
            price: self.price,
            stop_price: self.stop_price,
            time_in_force: self.time_in_force,
            reduce_only: self.reduce_only,
        }
    }

    // ========================================================================
    // State Transitions
    // ========================================================================

    /// Record the placement result.
    ///
    /// # Errors
    ///
    /// Returns error if the order was already placed or the report is inconsistent.
    pub fn record_acceptance(&mut self, report: &ExecutionReport) -> Result<(), OrderError> {
        if self.status != OrderStatus::Initialized {
            return Err(OrderError::validation(
                "status",
                format!("order {} was already placed ({})", self.id, self.status),
            ));
        }
        self.ensure_fill_within_quantity(report.filled_quantity)?;
        OrderStateMachine::validate_transition(self.status, report.status)?;

        self.exchange_order_id = Some(report.exchange_order_id.clone());
        self.absorb(report);
        Ok(())
    }

    /// Apply a status snapshot idempotently.
    ///
    /// Returns `true` if anything changed. Re-applying the current status with
    /// no new fill is a no-op; `filled_quantity` never regresses.
    ///
    /// # Errors
    ///
    /// Returns error if the order was never placed, the report belongs to a
    /// different order, or the reported transition is illegal.
    pub fn apply_report(&mut self, report: &ExecutionReport) -> Result<bool, OrderError> {
        let Some(own_id) = &self.exchange_order_id else {
            return Err(OrderError::validation(
                "exchange_order_id",
                format!("order {} has not been placed", self.id),
            ));
        };
        if *own_id != report.exchange_order_id {
            return Err(OrderError::execution(
                "status",
                format!(
                    "report for {} applied to order {own_id}",
                    report.exchange_order_id
                ),
            ));
        }
        self.ensure_fill_within_quantity(report.filled_quantity)?;

        let status_changed = report.status != self.status;
        let fill_advanced = report.filled_quantity > self.filled_quantity;
        if !status_changed && !fill_advanced {
            return Ok(false);
        }
        if self.status.is_terminal() && !status_changed {
            // Late fill detail on a terminal order, e.g. a cancel that raced a fill.
            self.absorb_fill(report);
            self.updated_at = Utc::now();
            return Ok(true);
        }
        if status_changed {
            OrderStateMachine::validate_transition(self.status, report.status)?;
        }

        self.absorb(report);
        Ok(true)
    }

    /// Mark the order canceled after a confirmed exchange cancellation.
    ///
    /// Any fill carried by the confirmation is kept.
    ///
    /// # Errors
    ///
    /// Returns error if the order is terminal or was never placed.
    pub fn mark_canceled(&mut self, confirmation: Option<&ExecutionReport>) -> Result<(), OrderError> {
        if self.status == OrderStatus::Initialized || self.status.is_terminal() {
            return Err(OrderError::validation(
                "status",
                format!("cannot cancel order {} in status {}", self.id, self.status),
            ));
        }
        if let Some(report) = confirmation {
            self.ensure_fill_within_quantity(report.filled_quantity)?;
            self.absorb_fill(report);
        }
        self.status = OrderStatus::Canceled;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the order rejected after the exchange refused the placement.
    ///
    /// # Errors
    ///
    /// Returns error unless the order is still `Initialized`.
    pub fn mark_rejected(&mut self) -> Result<(), OrderError> {
        OrderStateMachine::validate_transition(self.status, OrderStatus::Rejected)?;
        if self.status != OrderStatus::Initialized {
            return Err(OrderError::InvalidStateTransition {
                from: self.status,
                to: OrderStatus::Rejected,
                reason: "only unplaced orders can be rejected locally".to_string(),
            });
        }
        self.status = OrderStatus::Rejected;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Build the replacement order for a cancel-then-replace amendment.
    ///
    /// # Errors
    ///
    /// Returns error if no field changes or the amended request is invalid.
    pub fn replacement(
        &self,
        quantity: Option<Decimal>,
        price: Option<Decimal>,
        stop_price: Option<Decimal>,
    ) -> Result<Self, OrderError> {
        if quantity.is_none() && price.is_none() && stop_price.is_none() {
            return Err(OrderError::validation(
                "modify",
                "must specify at least one of quantity, price or stop price",
            ));
        }
        let mut request = self.to_request();
        if let Some(quantity) = quantity {
            request.quantity = quantity;
        }
        if price.is_some() {
            request.price = price;
        }
        if stop_price.is_some() {
            request.stop_price = stop_price;
        }
        Self::new(request)
    }

    fn ensure_fill_within_quantity(&self, filled: Decimal) -> Result<(), OrderError> {
        if filled > self.quantity {
            return Err(OrderError::execution(
                "status",
                format!(
                    "reported fill {filled} exceeds order quantity {} for {}",
                    self.quantity, self.id
                ),
            ));
        }
        Ok(())
    }

    fn absorb(&mut self, report: &ExecutionReport) {
        self.absorb_fill(report);
        self.status = report.status;
        let now = Utc::now();
        if self.status == OrderStatus::Filled && self.filled_at.is_none() {
            self.filled_at = Some(report.updated_at.unwrap_or(now));
        }
        self.updated_at = now;
    }

    fn absorb_fill(&mut self, report: &ExecutionReport) {
        if report.filled_quantity > self.filled_quantity {
            self.filled_quantity = report.filled_quantity;
            if report.avg_fill_price > Decimal::ZERO {
                self.avg_fill_price = report.avg_fill_price;
            }
        }
        if report.commission > self.commission {
            self.commission = report.commission;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc() -> Symbol {
        Symbol::parse("BTCUSDT").unwrap()
    }

    fn limit_order() -> Order {
        Order::new(OrderRequest::limit(btc(), OrderSide::Buy, dec!(1), dec!(50000))).unwrap()
    }

    fn report(id: &str, status: OrderStatus, filled: Decimal) -> ExecutionReport {
        ExecutionReport::accepted(ExchangeOrderId::from(id)).with_fill(status, filled, dec!(50000))
    }

    #[test]
    fn new_order_is_initialized() {
        let order = limit_order();
        assert_eq!(order.status(), OrderStatus::Initialized);
        assert_eq!(order.filled_quantity(), Decimal::ZERO);
        assert!(order.exchange_order_id().is_none());
    }

    #[test]
    fn price_rules_per_kind() {
        let mut request = OrderRequest::market(btc(), OrderSide::Buy, dec!(1));
        request.price = Some(dec!(1));
        assert!(Order::new(request).is_err());

        let mut request = OrderRequest::limit(btc(), OrderSide::Buy, dec!(1), dec!(1));
        request.price = None;
        assert!(Order::new(request).is_err());

        let mut request = OrderRequest::stop_limit(btc(), OrderSide::Buy, dec!(1), dec!(2), dec!(3));
        request.stop_price = None;
        assert!(Order::new(request).is_err());

        let mut request = OrderRequest::limit(btc(), OrderSide::Buy, dec!(1), dec!(1));
        request.stop_price = Some(dec!(1));
        assert!(Order::new(request).is_err());

        assert!(Order::new(OrderRequest::limit(btc(), OrderSide::Buy, dec!(1), dec!(0))).is_err());
    }

    #[test]
    fn acceptance_moves_to_new_and_records_id() {
        let mut order = limit_order();
        order
            .record_acceptance(&report("42", OrderStatus::New, Decimal::ZERO))
            .unwrap();
        assert_eq!(order.status(), OrderStatus::New);
        assert_eq!(order.exchange_order_id().unwrap().as_str(), "42");
        assert!(order.record_acceptance(&report("43", OrderStatus::New, Decimal::ZERO)).is_err());
    }

    #[test]
    fn immediate_fill_sets_filled_at() {
        let mut order = limit_order();
        order
            .record_acceptance(&report("1", OrderStatus::Filled, dec!(1)))
            .unwrap();
        assert_eq!(order.status(), OrderStatus::Filled);
        assert_eq!(order.filled_quantity(), dec!(1));
        assert!(order.filled_at().is_some());
    }

    #[test]
    fn apply_report_is_idempotent() {
        let mut order = limit_order();
        order
            .record_acceptance(&report("7", OrderStatus::New, Decimal::ZERO))
            .unwrap();
        let partial = report("7", OrderStatus::PartiallyFilled, dec!(0.4));
        assert!(order.apply_report(&partial).unwrap());
        let before = order.clone();
        assert!(!order.apply_report(&partial).unwrap());
        assert_eq!(order, before);
    }

    #[test]
    fn filled_quantity_never_regresses() {
        let mut order = limit_order();
        order
            .record_acceptance(&report("7", OrderStatus::PartiallyFilled, dec!(0.5)))
            .unwrap();
        order
            .apply_report(&report("7", OrderStatus::New, dec!(0.2)))
            .unwrap();
        assert_eq!(order.status(), OrderStatus::New);
        assert_eq!(order.filled_quantity(), dec!(0.5));
    }

    #[test]
    fn terminal_status_cannot_go_back() {
        let mut order = limit_order();
        order
            .record_acceptance(&report("7", OrderStatus::Filled, dec!(1)))
            .unwrap();
        let err = order
            .apply_report(&report("7", OrderStatus::New, dec!(1)))
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidStateTransition { .. }));
    }

    #[test]
    fn overfill_is_rejected() {
        let mut order = limit_order();
        order
            .record_acceptance(&report("7", OrderStatus::New, Decimal::ZERO))
            .unwrap();
        assert!(order.apply_report(&report("7", OrderStatus::Filled, dec!(2))).is_err());
    }

    #[test]
    fn report_for_other_order_is_rejected() {
        let mut order = limit_order();
        order
            .record_acceptance(&report("7", OrderStatus::New, Decimal::ZERO))
            .unwrap();
        assert!(order.apply_report(&report("8", OrderStatus::Filled, dec!(1))).is_err());
    }

    #[test]
    fn cancel_requires_placed_non_terminal_order() {
        let mut order = limit_order();
        assert!(order.mark_canceled(None).is_err());
        order
            .record_acceptance(&report("7", OrderStatus::New, Decimal::ZERO))
            .unwrap();
        order
            .mark_canceled(Some(&report("7", OrderStatus::Canceled, dec!(0.3))))
            .unwrap();
        assert_eq!(order.status(), OrderStatus::Canceled);
        assert_eq!(order.filled_quantity(), dec!(0.3));
        assert!(order.mark_canceled(None).is_err());
    }

    #[test]
    fn only_unplaced_orders_are_rejected_locally() {
        let mut order = limit_order();
        order.mark_rejected().unwrap();
        assert_eq!(order.status(), OrderStatus::Rejected);

        let mut order = limit_order();
        order
            .record_acceptance(&report("7", OrderStatus::New, Decimal::ZERO))
            .unwrap();
        assert!(order.mark_rejected().is_err());
    }

    #[test]
    fn replacement_carries_overrides() {
        let order = limit_order();
        let replacement = order.replacement(None, Some(dec!(49000)), None).unwrap();
        assert_ne!(replacement.id(), order.id());
        assert_eq!(replacement.price(), Some(dec!(49000)));
        assert_eq!(replacement.quantity(), dec!(1));
        assert_eq!(replacement.status(), OrderStatus::Initialized);
        assert!(order.replacement(None, None, None).is_err());
    }
}
