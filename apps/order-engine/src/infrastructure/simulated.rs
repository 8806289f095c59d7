//! In-memory exchange.
//!
//! A scriptable `ExchangeGateway` for dry runs and tests. Market orders fill
//! at the configured price; limit and stop-limit orders rest until filled or
//! canceled through the control methods. Every call is journaled.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::application::ports::{ExchangeGateway, GatewayError, OrderSpec};
use crate::domain::order_execution::{ExecutionReport, OrderKind, OrderStatus, SymbolMetadata};
use crate::domain::shared::{ExchangeOrderId, Symbol};

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    /// `ping`.
    Ping,
    /// `get_symbol_info`.
    SymbolInfo(Symbol),
    /// `get_price`.
    Price(Symbol),
    /// `place_order`.
    Place(OrderSpec),
    /// `cancel_order`.
    Cancel(ExchangeOrderId),
    /// `cancel_all_orders`.
    CancelAll(Symbol),
    /// `get_order_status`.
    Status(ExchangeOrderId),
    /// `set_leverage`.
    SetLeverage(Symbol, u32),
}

#[derive(Debug, Clone)]
struct SimOrder {
    spec: OrderSpec,
    status: OrderStatus,
    filled: Decimal,
    avg_price: Decimal,
}

impl SimOrder {
    fn report(&self, id: &ExchangeOrderId) -> ExecutionReport {
        ExecutionReport {
            exchange_order_id: id.clone(),
            status: self.status,
            filled_quantity: self.filled,
            avg_fill_price: self.avg_price,
            commission: Decimal::ZERO,
            updated_at: Some(Utc::now()),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    symbols: HashMap<Symbol, SymbolMetadata>,
    prices: HashMap<Symbol, Decimal>,
    orders: HashMap<ExchangeOrderId, SimOrder>,
    next_id: u64,
    journal: Vec<GatewayCall>,
    place_failures: VecDeque<GatewayError>,
    cancel_failures: VecDeque<GatewayError>,
}

/// Scriptable in-memory exchange.
#[derive(Debug, Default)]
pub struct SimulatedExchange {
    state: Mutex<State>,
}

impl SimulatedExchange {
    /// Empty exchange with no listed symbols.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// List a symbol at a price.
    #[must_use]
    pub fn with_symbol(self, metadata: SymbolMetadata, price: Decimal) -> Self {
        {
            let mut state = self.state.lock();
            state.prices.insert(metadata.symbol.clone(), price);
            state.symbols.insert(metadata.symbol.clone(), metadata);
        }
        self
    }

    /// Move the market price.
    pub fn set_price(&self, symbol: &Symbol, price: Decimal) {
        self.state.lock().prices.insert(symbol.clone(), price);
    }

    /// Fail the next placement with `error`.
    pub fn fail_next_place(&self, error: GatewayError) {
        self.state.lock().place_failures.push_back(error);
    }

    /// Fail the next cancellation with `error`.
    pub fn fail_next_cancel(&self, error: GatewayError) {
        self.state.lock().cancel_failures.push_back(error);
    }

    /// Fill a resting order completely at its limit price.
    ///
    /// Returns false if the order is unknown or already terminal.
    pub fn fill(&self, id: &ExchangeOrderId) -> bool {
        let mut state = self.state.lock();
        let Some(order) = state.orders.get_mut(id) else {
            return false;
        };
        if order.status.is_terminal() {
            return false;
        }
        order.filled = order.spec.quantity;
        order.avg_price = order.spec.price.unwrap_or(order.avg_price);
        order.status = OrderStatus::Filled;
        true
    }

    /// Partially fill a resting order.
    pub fn partial_fill(&self, id: &ExchangeOrderId, quantity: Decimal) -> bool {
        let mut state = self.state.lock();
        let Some(order) = state.orders.get_mut(id) else {
            return false;
        };
        if order.status.is_terminal() || quantity >= order.spec.quantity {
            return false;
        }
        order.filled = quantity;
        order.avg_price = order.spec.price.unwrap_or(order.avg_price);
        order.status = OrderStatus::PartiallyFilled;
        true
    }

    /// Cancel an order from the exchange side.
    pub fn cancel_externally(&self, id: &ExchangeOrderId) -> bool {
        let mut state = self.state.lock();
        match state.orders.get_mut(id) {
            Some(order) if !order.status.is_terminal() => {
                order.status = OrderStatus::Canceled;
                true
            }
            _ => false,
        }
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().journal.clone()
    }

    /// Number of `cancel_order` calls for one order.
    pub fn cancel_calls(&self, id: &ExchangeOrderId) -> usize {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|call| matches!(call, GatewayCall::Cancel(c) if c == id))
            .count()
    }

    /// Specs of every placement attempt, in order.
    pub fn placed(&self) -> Vec<OrderSpec> {
        self.state
            .lock()
            .journal
            .iter()
            .filter_map(|call| match call {
                GatewayCall::Place(spec) => Some(spec.clone()),
                _ => None,
            })
            .collect()
    }

    /// Exchange id assigned to a client order id.
    pub fn exchange_id_of(&self, client_order_id: &str) -> Option<ExchangeOrderId> {
        self.state
            .lock()
            .orders
            .iter()
            .find(|(_, order)| order.spec.client_order_id.as_str() == client_order_id)
            .map(|(id, _)| id.clone())
    }

    /// Ids of non-terminal orders for a symbol.
    pub fn open_orders(&self, symbol: &Symbol) -> Vec<ExchangeOrderId> {
        let state = self.state.lock();
        let mut ids: Vec<_> = state
            .orders
            .iter()
            .filter(|(_, o)| &o.spec.symbol == symbol && !o.status.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    fn unknown_order() -> GatewayError {
        GatewayError::Rejected {
            code: -2011,
            message: "Unknown order sent.".to_string(),
        }
    }
}

#[async_trait]
impl ExchangeGateway for SimulatedExchange {
    async fn ping(&self) -> Result<(), GatewayError> {
        self.state.lock().journal.push(GatewayCall::Ping);
        Ok(())
    }

    async fn get_symbol_info(&self, symbol: &Symbol) -> Result<Option<SymbolMetadata>, GatewayError> {
        let mut state = self.state.lock();
        state.journal.push(GatewayCall::SymbolInfo(symbol.clone()));
        Ok(state.symbols.get(symbol).cloned())
    }

    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal, GatewayError> {
        let mut state = self.state.lock();
        state.journal.push(GatewayCall::Price(symbol.clone()));
        state
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| GatewayError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }

    async fn place_order(&self, spec: &OrderSpec) -> Result<ExecutionReport, GatewayError> {
        let mut state = self.state.lock();
        state.journal.push(GatewayCall::Place(spec.clone()));
        if let Some(error) = state.place_failures.pop_front() {
            return Err(error);
        }
        if !state.symbols.contains_key(&spec.symbol) {
            return Err(GatewayError::SymbolNotFound {
                symbol: spec.symbol.to_string(),
            });
        }

        state.next_id += 1;
        let id = ExchangeOrderId::new(format!("{:08}", state.next_id));
        let market = state.prices.get(&spec.symbol).copied().unwrap_or_default();
        let order = if spec.kind == OrderKind::Market {
            SimOrder {
                spec: spec.clone(),
                status: OrderStatus::Filled,
                filled: spec.quantity,
                avg_price: market,
            }
        } else {
            SimOrder {
                spec: spec.clone(),
                status: OrderStatus::New,
                filled: Decimal::ZERO,
                avg_price: Decimal::ZERO,
            }
        };
        let report = order.report(&id);
        state.orders.insert(id, order);
        Ok(report)
    }

    async fn cancel_order(
        &self,
        symbol: &Symbol,
        exchange_order_id: &ExchangeOrderId,
    ) -> Result<ExecutionReport, GatewayError> {
        let mut state = self.state.lock();
        state.journal.push(GatewayCall::Cancel(exchange_order_id.clone()));
        if let Some(error) = state.cancel_failures.pop_front() {
            return Err(error);
        }
        match state.orders.get_mut(exchange_order_id) {
            Some(order) if &order.spec.symbol == symbol && !order.status.is_terminal() => {
                order.status = OrderStatus::Canceled;
                Ok(order.report(exchange_order_id))
            }
            _ => Err(Self::unknown_order()),
        }
    }

    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        state.journal.push(GatewayCall::CancelAll(symbol.clone()));
        for order in state.orders.values_mut() {
            if &order.spec.symbol == symbol && !order.status.is_terminal() {
                order.status = OrderStatus::Canceled;
            }
        }
        Ok(())
    }

    async fn get_order_status(
        &self,
        symbol: &Symbol,
        exchange_order_id: &ExchangeOrderId,
    ) -> Result<ExecutionReport, GatewayError> {
        let mut state = self.state.lock();
        state.journal.push(GatewayCall::Status(exchange_order_id.clone()));
        match state.orders.get(exchange_order_id) {
            Some(order) if &order.spec.symbol == symbol => Ok(order.report(exchange_order_id)),
            _ => Err(Self::unknown_order()),
        }
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        state.journal.push(GatewayCall::SetLeverage(symbol.clone(), leverage));
        if state.symbols.contains_key(symbol) {
            Ok(())
        } else {
            Err(GatewayError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
        }
    }
}
