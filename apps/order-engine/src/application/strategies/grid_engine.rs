//! Grid Engine
//!
//! Maintains a ladder of resting limit orders that flip side on fill. The
//! engine has no timer of its own: a driver calls `update()` periodically.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::application::orders::{ManagedOrder, OrderPreparer};
use crate::application::ports::ExchangeGateway;
use crate::domain::execution_tactics::{
    GridLevelSnapshot, GridLevelStatus, GridParams, GridSnapshot, GridStatus,
};
use crate::domain::order_execution::{
    OrderError, OrderRequest, OrderSide, OrderStatus, OrderValidator,
};

/// Grid engine settings.
#[derive(Debug, Clone)]
pub struct GridEngineConfig {
    /// Permissions a symbol must carry.
    pub required_permissions: Vec<String>,
}

impl Default for GridEngineConfig {
    fn default() -> Self {
        Self {
            required_permissions: vec!["TRADING".to_string()],
        }
    }
}

struct GridLevel<G: ?Sized> {
    index: usize,
    price: Decimal,
    side: Option<OrderSide>,
    status: GridLevelStatus,
    order: Option<ManagedOrder<G>>,
    fill_count: u32,
}

/// Grid ladder coordinator.
pub struct GridEngine<G: ?Sized> {
    gateway: Arc<G>,
    config: GridEngineConfig,
    params: GridParams,
    level_quantity: Decimal,
    levels: Vec<GridLevel<G>>,
    status: GridStatus,
    last_price: Option<Decimal>,
}

impl<G: ExchangeGateway + ?Sized> GridEngine<G> {
    /// Build the ladder.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an invalid ladder shape.
    pub fn new(gateway: Arc<G>, params: GridParams, config: GridEngineConfig) -> Result<Self, OrderError> {
        params.validate()?;
        let levels = params
            .level_prices()
            .into_iter()
            .enumerate()
            .map(|(index, price)| GridLevel {
                index,
                price,
                side: None,
                status: GridLevelStatus::Pending,
                order: None,
                fill_count: 0,
            })
            .collect();
        Ok(Self {
            gateway,
            config,
            level_quantity: params.level_quantity(),
            params,
            levels,
            status: GridStatus::Initialized,
            last_price: None,
        })
    }

    /// Grid status.
    pub const fn status(&self) -> GridStatus {
        self.status
    }

    /// Seed the ladder: buys at or below market, sells above (per mode).
    ///
    /// Individual level placement failures are logged and leave the level
    /// `Pending` for the next `update()`.
    ///
    /// # Errors
    ///
    /// Returns error if the grid already started, the symbol is not tradable,
    /// the per-level quantity is below the minimum lot, or the price query fails.
    pub async fn start(&mut self) -> Result<(), OrderError> {
        if self.status != GridStatus::Initialized {
            return Err(OrderError::validation(
                "status",
                format!("grid already {:?}", self.status),
            ));
        }

        let preparer = OrderPreparer::new(
            Arc::clone(&self.gateway),
            self.config.required_permissions.clone(),
        );
        let metadata = preparer.tradable_metadata(&self.params.symbol).await?;
        self.level_quantity = OrderValidator::validate_quantity(
            &self.params.symbol,
            self.level_quantity,
            metadata.lot_size.as_ref(),
        )?;
        if let Some(filter) = metadata.price_filter.as_ref() {
            for level in &mut self.levels {
                level.price = OrderValidator::round_to_step(level.price, filter.tick_size);
                OrderValidator::validate_price(&self.params.symbol, "price", level.price, Some(filter))?;
            }
        }

        let market = preparer.market_price(&self.params.symbol).await?;
        self.last_price = Some(market);

        tracing::info!(
            symbol = %self.params.symbol,
            lower = %self.params.lower_price,
            upper = %self.params.upper_price,
            levels = self.params.grid_count,
            level_quantity = %self.level_quantity,
            mode = %self.params.mode,
            market = %market,
            "Starting grid"
        );

        for i in 0..self.levels.len() {
            let side = self.params.mode.initial_side(self.levels[i].price, market);
            self.levels[i].side = side;
            if side.is_some() {
                self.place_level(i).await;
            }
        }

        self.status = GridStatus::Running;
        Ok(())
    }

    /// Poll active levels, flip filled ones and retry pending ones.
    ///
    /// Returns the number of fills observed in this cycle.
    pub async fn update(&mut self) -> u32 {
        if self.status != GridStatus::Running {
            return 0;
        }

        match self.gateway.get_price(&self.params.symbol).await {
            Ok(price) => self.last_price = Some(price),
            Err(e) => tracing::debug!(symbol = %self.params.symbol, error = %e, "Grid price refresh failed"),
        }

        let mut fills = 0;
        for i in 0..self.levels.len() {
            match self.levels[i].status {
                GridLevelStatus::Active => {
                    if self.poll_level(i).await {
                        fills += 1;
                        self.place_level(i).await;
                    }
                }
                GridLevelStatus::Pending if self.levels[i].side.is_some() => {
                    self.place_level(i).await;
                }
                _ => {}
            }
        }
        fills
    }

    /// Cancel every open order for the symbol in one call and mark all levels
    /// `Canceled`.
    ///
    /// # Errors
    ///
    /// Returns the classified cancel-all failure; the grid keeps running.
    pub async fn stop(&mut self) -> Result<(), OrderError> {
        if self.status == GridStatus::Stopped {
            return Ok(());
        }
        let symbol = self.params.symbol.clone();
        self.gateway.cancel_all_orders(&symbol).await.map_err(|e| {
            tracing::error!(symbol = %symbol, operation = "cancel_all", error = %e, "Grid stop failed");
            e.into_order_error("cancel_all", &symbol, Decimal::ZERO)
        })?;

        for level in &mut self.levels {
            if let Some(order) = level.order.as_mut()
                && let Err(e) = order.confirm_batch_cancel()
            {
                tracing::warn!(symbol = %symbol, level = level.index, error = %e, "Could not record level cancel");
            }
            level.status = GridLevelStatus::Canceled;
        }
        self.status = GridStatus::Stopped;
        tracing::info!(symbol = %symbol, "Grid stopped");
        Ok(())
    }

    /// Serializable view.
    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            params: self.params.clone(),
            status: self.status,
            last_price: self.last_price,
            levels: self
                .levels
                .iter()
                .map(|level| GridLevelSnapshot {
                    index: level.index,
                    price: level.price,
                    quantity: self.level_quantity,
                    side: level.side,
                    status: level.status,
                    order_status: level.order.as_ref().map(ManagedOrder::status),
                    exchange_order_id: level
                        .order
                        .as_ref()
                        .and_then(|m| m.order().exchange_order_id().cloned()),
                    fill_count: level.fill_count,
                })
                .collect(),
        }
    }

    /// Refresh one active level. Returns true if it filled and was flipped.
    async fn poll_level(&mut self, i: usize) -> bool {
        let symbol = self.params.symbol.clone();
        let level = &mut self.levels[i];
        let Some(order) = level.order.as_mut() else {
            level.status = GridLevelStatus::Pending;
            return false;
        };

        if let Err(e) = order.refresh_status().await {
            tracing::warn!(symbol = %symbol, level = level.index, error = %e, "Grid level status refresh failed");
            return false;
        }

        match order.status() {
            OrderStatus::Filled => {
                let filled_side = order.order().side();
                level.fill_count += 1;
                level.side = Some(filled_side.opposite());
                level.order = None;
                level.status = GridLevelStatus::Pending;
                tracing::info!(
                    symbol = %symbol,
                    level = level.index,
                    price = %level.price,
                    filled_side = %filled_side,
                    next_side = %filled_side.opposite(),
                    "Grid level filled; flipping side"
                );
                true
            }
            OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired => {
                tracing::warn!(
                    symbol = %symbol,
                    level = level.index,
                    price = %level.price,
                    status = %order.status(),
                    "Grid level order ended without fill; level retired"
                );
                level.status = GridLevelStatus::Canceled;
                false
            }
            _ => false,
        }
    }

    async fn place_level(&mut self, i: usize) {
        let level = &mut self.levels[i];
        let Some(side) = level.side else {
            return;
        };
        let request = OrderRequest::limit(self.params.symbol.clone(), side, self.level_quantity, level.price);
        let mut order = match ManagedOrder::from_request(Arc::clone(&self.gateway), request) {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(symbol = %self.params.symbol, level = level.index, error = %e, "Invalid grid level order");
                return;
            }
        };

        match order.place().await {
            Ok(_) => {
                // An order that crossed immediately is flipped by the next update.
                level.status = GridLevelStatus::Active;
                level.order = Some(order);
            }
            Err(e) => {
                tracing::warn!(
                    symbol = %self.params.symbol,
                    level = level.index,
                    side = %side,
                    price = %level.price,
                    quantity = %self.level_quantity,
                    error = %e,
                    "Grid level placement failed; will retry next update"
                );
                level.status = GridLevelStatus::Pending;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{GatewayError, MockExchangeGateway};
    use crate::domain::execution_tactics::GridMode;
    use crate::domain::order_execution::{ExecutionReport, SymbolMetadata};
    use crate::domain::shared::{ExchangeOrderId, Symbol};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    fn params(mode: GridMode) -> GridParams {
        GridParams {
            symbol: Symbol::parse("BTCUSDT").unwrap(),
            upper_price: dec!(52000),
            lower_price: dec!(48000),
            grid_count: 5,
            total_quantity: dec!(0.4),
            mode,
        }
    }

    fn gateway(placed: Arc<Mutex<Vec<(OrderSide, Decimal)>>>) -> MockExchangeGateway {
        let mut gateway = MockExchangeGateway::new();
        gateway
            .expect_get_symbol_info()
            .returning(|s| Ok(Some(SymbolMetadata::trading(s.clone()))));
        gateway.expect_get_price().returning(|_| Ok(dec!(50000)));
        gateway.expect_place_order().returning(move |spec| {
            placed.lock().push((spec.side, spec.price.unwrap_or_default()));
            Ok(ExecutionReport::accepted(ExchangeOrderId::from(
                spec.client_order_id.as_str(),
            )))
        });
        gateway
    }

    #[tokio::test]
    async fn start_seeds_buys_below_and_sells_above() {
        let placed = Arc::new(Mutex::new(Vec::new()));
        let mut engine = GridEngine::new(
            Arc::new(gateway(Arc::clone(&placed))),
            params(GridMode::Both),
            GridEngineConfig::default(),
        )
        .unwrap();
        engine.start().await.unwrap();

        assert_eq!(
            *placed.lock(),
            vec![
                (OrderSide::Buy, dec!(48000)),
                (OrderSide::Buy, dec!(49000)),
                (OrderSide::Buy, dec!(50000)),
                (OrderSide::Sell, dec!(51000)),
                (OrderSide::Sell, dec!(52000)),
            ]
        );
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.status, GridStatus::Running);
        assert!(snapshot.levels.iter().all(|l| l.quantity == dec!(0.1)));
    }

    #[tokio::test]
    async fn short_mode_leaves_lower_levels_empty() {
        let placed = Arc::new(Mutex::new(Vec::new()));
        let mut engine = GridEngine::new(
            Arc::new(gateway(Arc::clone(&placed))),
            params(GridMode::Short),
            GridEngineConfig::default(),
        )
        .unwrap();
        engine.start().await.unwrap();
        assert_eq!(placed.lock().len(), 2);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.levels[0].side, None);
        assert_eq!(snapshot.levels[0].status, GridLevelStatus::Pending);
    }

    #[tokio::test]
    async fn stop_uses_one_batched_cancel() {
        let placed = Arc::new(Mutex::new(Vec::new()));
        let mut gateway = gateway(Arc::clone(&placed));
        gateway.expect_cancel_all_orders().times(1).returning(|_| Ok(()));
        gateway.expect_cancel_order().never();

        let mut engine = GridEngine::new(Arc::new(gateway), params(GridMode::Both), GridEngineConfig::default()).unwrap();
        engine.start().await.unwrap();
        engine.stop().await.unwrap();

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.status, GridStatus::Stopped);
        assert!(snapshot.levels.iter().all(|l| l.status == GridLevelStatus::Canceled));
        assert!(
            snapshot
                .levels
                .iter()
                .all(|l| l.order_status == Some(OrderStatus::Canceled))
        );
    }

    #[tokio::test]
    async fn failed_level_stays_pending_and_is_retried() {
        let mut gateway = MockExchangeGateway::new();
        gateway
            .expect_get_symbol_info()
            .returning(|s| Ok(Some(SymbolMetadata::trading(s.clone()))));
        gateway.expect_get_price().returning(|_| Ok(dec!(50000)));
        let calls = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&calls);
        gateway.expect_place_order().returning(move |spec| {
            let mut n = counter.lock();
            *n += 1;
            if *n == 1 {
                Err(GatewayError::Unavailable {
                    message: "503".into(),
                })
            } else {
                Ok(ExecutionReport::accepted(ExchangeOrderId::from(
                    spec.client_order_id.as_str(),
                )))
            }
        });
        gateway
            .expect_get_order_status()
            .returning(|_, id| Ok(ExecutionReport::accepted(id.clone())));

        let mut engine = GridEngine::new(Arc::new(gateway), params(GridMode::Both), GridEngineConfig::default()).unwrap();
        engine.start().await.unwrap();
        assert_eq!(engine.snapshot().levels[0].status, GridLevelStatus::Pending);

        engine.update().await;
        assert_eq!(engine.snapshot().levels[0].status, GridLevelStatus::Active);
        assert_eq!(*calls.lock(), 6);
    }
}
