//! TWAP Scheduler
//!
//! Executes a `TwapPlan` as market chunks spaced evenly over the plan's
//! duration. Each wait is measured against the schedule start rather than
//! the previous chunk, so slow placements do not accumulate drift.
//!
//! The loop checks its `CancellationToken` before every wait and every
//! placement, and the wait itself races the token.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::orders::{ManagedOrder, OrderPreparer};
use crate::application::ports::ExchangeGateway;
use crate::domain::execution_tactics::{
    ChunkOutcome, TwapParams, TwapPlan, TwapReport, TwapStatus,
};
use crate::domain::order_execution::{
    LotSize, OrderError, OrderRequest, OrderValidator,
};

/// TWAP scheduler settings.
#[derive(Debug, Clone)]
pub struct TwapSchedulerConfig {
    /// Permissions a symbol must carry.
    pub required_permissions: Vec<String>,
}

impl Default for TwapSchedulerConfig {
    fn default() -> Self {
        Self {
            required_permissions: vec!["TRADING".to_string()],
        }
    }
}

/// Drives one TWAP plan.
pub struct TwapScheduler<G: ?Sized> {
    gateway: Arc<G>,
    plan: TwapPlan,
    config: TwapSchedulerConfig,
    progress: watch::Sender<TwapReport>,
}

impl<G: ExchangeGateway + ?Sized> TwapScheduler<G> {
    /// Derive the plan.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a degenerate plan.
    pub fn new(gateway: Arc<G>, params: TwapParams, config: TwapSchedulerConfig) -> Result<Self, OrderError> {
        let plan = TwapPlan::new(params)?;
        let (progress, _) = watch::channel(TwapReport::new(&plan));
        Ok(Self {
            gateway,
            plan,
            config,
            progress,
        })
    }

    /// The derived plan.
    pub const fn plan(&self) -> &TwapPlan {
        &self.plan
    }

    /// Live progress; updated after every chunk.
    pub fn subscribe(&self) -> watch::Receiver<TwapReport> {
        self.progress.subscribe()
    }

    /// Run the schedule to completion, cancellation or failure.
    pub async fn run(&self, cancel: CancellationToken) -> TwapReport {
        let params = self.plan.params();
        let mut report = TwapReport::new(&self.plan);
        report.status = TwapStatus::Executing;
        report.started_at = Some(Utc::now());
        self.publish(&report);

        tracing::info!(
            symbol = %params.symbol,
            side = %params.side,
            total_quantity = %params.total_quantity,
            chunks = params.chunk_count,
            chunk_size = %self.plan.chunk_size(),
            interval_ms = u64::try_from(self.plan.interval().as_millis()).unwrap_or(u64::MAX),
            "Starting TWAP execution"
        );

        let preparer = OrderPreparer::new(
            Arc::clone(&self.gateway),
            self.config.required_permissions.clone(),
        );
        let lot_size = match self.preflight(&preparer).await {
            Ok(lot_size) => lot_size,
            Err(e) => return self.finish_failed(report, &e),
        };

        let mut open_chunks: Vec<(u32, ManagedOrder<G>)> = Vec::new();
        let start = Instant::now();

        for index in 1..=params.chunk_count {
            if cancel.is_cancelled() {
                return self.finish_canceled(report, &mut open_chunks).await;
            }

            let offset = self.plan.scheduled_offset(index);
            let elapsed = start.elapsed();
            if offset > elapsed {
                tokio::select! {
                    () = cancel.cancelled() => {
                        return self.finish_canceled(report, &mut open_chunks).await;
                    }
                    () = tokio::time::sleep(offset - elapsed) => {}
                }
            }
            if cancel.is_cancelled() {
                return self.finish_canceled(report, &mut open_chunks).await;
            }

            self.refresh_open_chunks(&mut report, &mut open_chunks).await;

            let wanted = self.plan.next_chunk_quantity(report.filled_quantity);
            let quantity = match OrderValidator::validate_quantity(&params.symbol, wanted, lot_size.as_ref()) {
                Ok(quantity) => quantity,
                Err(e) => {
                    tracing::warn!(
                        symbol = %params.symbol,
                        chunk = index,
                        quantity = %wanted,
                        error = %e,
                        "Skipping TWAP chunk below minimum size"
                    );
                    report.record_skipped(index, offset, wanted, ChunkOutcome::SkippedTooSmall);
                    self.publish(&report);
                    continue;
                }
            };

            if params.price_limit.is_some() {
                let market = match preparer.market_price(&params.symbol).await {
                    Ok(price) => price,
                    Err(e) => return self.finish_failed(report, &e),
                };
                if !self.plan.price_allows(market) {
                    tracing::info!(
                        symbol = %params.symbol,
                        chunk = index,
                        price = %market,
                        price_limit = ?params.price_limit,
                        "Skipping TWAP chunk outside price limit"
                    );
                    report.record_skipped(index, offset, quantity, ChunkOutcome::SkippedPriceLimit);
                    self.publish(&report);
                    continue;
                }
            }

            let request = OrderRequest::market(params.symbol.clone(), params.side, quantity);
            let mut order = match ManagedOrder::from_request(Arc::clone(&self.gateway), request) {
                Ok(order) => order,
                Err(e) => return self.finish_failed(report, &e),
            };
            if let Err(e) = order.place().await {
                tracing::error!(
                    symbol = %params.symbol,
                    side = %params.side,
                    chunk = index,
                    quantity = %quantity,
                    error = %e,
                    "TWAP chunk placement failed; aborting schedule"
                );
                return self.finish_failed(report, &e);
            }

            tracing::info!(
                symbol = %params.symbol,
                chunk = index,
                of = params.chunk_count,
                quantity = %quantity,
                filled = %order.order().filled_quantity(),
                "TWAP chunk placed"
            );
            report.record_placed(index, offset, order.order().clone());
            if !order.status().is_terminal() {
                open_chunks.push((index, order));
            }
            self.publish(&report);
        }

        self.refresh_open_chunks(&mut report, &mut open_chunks).await;
        report.status = self.plan.completion_status(report.filled_quantity);
        report.finished_at = Some(Utc::now());
        tracing::info!(
            symbol = %params.symbol,
            status = ?report.status,
            filled = %report.filled_quantity,
            average_price = %report.average_price,
            chunks_placed = report.chunks_placed,
            chunks_skipped = report.chunks_skipped,
            "TWAP execution finished"
        );
        self.publish(&report);
        report
    }

    async fn preflight(&self, preparer: &OrderPreparer<G>) -> Result<Option<LotSize>, OrderError> {
        let params = self.plan.params();
        let metadata = preparer.tradable_metadata(&params.symbol).await?;
        // The first chunk must be placeable; later remainders may be skipped.
        OrderValidator::validate_quantity(
            &params.symbol,
            self.plan.next_chunk_quantity(Decimal::ZERO),
            metadata.lot_size.as_ref(),
        )?;
        Ok(metadata.lot_size)
    }

    async fn refresh_open_chunks(&self, report: &mut TwapReport, open: &mut Vec<(u32, ManagedOrder<G>)>) {
        for (index, order) in open.iter_mut() {
            match order.refresh_status().await {
                Ok(true) => report.update_order(*index, order.order().clone()),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        symbol = %order.order().symbol(),
                        chunk = *index,
                        error = %e,
                        "TWAP chunk status refresh failed"
                    );
                }
            }
        }
        open.retain(|(_, order)| !order.status().is_terminal());
    }

    async fn finish_canceled(
        &self,
        mut report: TwapReport,
        open: &mut Vec<(u32, ManagedOrder<G>)>,
    ) -> TwapReport {
        self.refresh_open_chunks(&mut report, open).await;
        report.status = TwapStatus::Canceled;
        report.finished_at = Some(Utc::now());
        tracing::info!(
            symbol = %self.plan.params().symbol,
            filled = %report.filled_quantity,
            chunks_placed = report.chunks_placed,
            "TWAP execution canceled"
        );
        self.publish(&report);
        report
    }

    fn finish_failed(&self, mut report: TwapReport, error: &OrderError) -> TwapReport {
        report.status = TwapStatus::Failed;
        report.error = Some(error.to_string());
        report.finished_at = Some(Utc::now());
        tracing::error!(
            symbol = %self.plan.params().symbol,
            side = %self.plan.params().side,
            total_quantity = %self.plan.params().total_quantity,
            filled = %report.filled_quantity,
            error = %error,
            "TWAP execution failed"
        );
        self.publish(&report);
        report
    }

    fn publish(&self, report: &TwapReport) {
        self.progress.send_replace(report.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{GatewayError, MockExchangeGateway};
    use crate::domain::order_execution::{ExecutionReport, OrderSide, OrderStatus, SymbolMetadata};
    use crate::domain::shared::{ExchangeOrderId, Symbol};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn params(total: Decimal, chunks: u32) -> TwapParams {
        TwapParams {
            symbol: Symbol::parse("BTCUSDT").unwrap(),
            side: OrderSide::Buy,
            total_quantity: total,
            chunk_count: chunks,
            duration: Duration::from_secs(60 * u64::from(chunks)),
            price_limit: None,
        }
    }

    fn gateway() -> MockExchangeGateway {
        let mut gateway = MockExchangeGateway::new();
        gateway.expect_get_symbol_info().returning(|s| {
            Ok(Some(
                SymbolMetadata::trading(s.clone()).with_lot_size(dec!(0.001), dec!(1000), dec!(0.001)),
            ))
        });
        gateway
    }

    #[tokio::test(start_paused = true)]
    async fn failure_aborts_remaining_chunks() {
        let mut gateway = gateway();
        gateway.expect_place_order().times(1).returning(|_| {
            Err(GatewayError::Authentication {
                message: "API-key format invalid.".into(),
            })
        });

        let scheduler = TwapScheduler::new(Arc::new(gateway), params(dec!(1), 4), TwapSchedulerConfig::default()).unwrap();
        let report = scheduler.run(CancellationToken::new()).await;
        assert_eq!(report.status, TwapStatus::Failed);
        assert_eq!(report.chunks_placed, 0);
        assert!(report.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn first_chunk_below_minimum_is_fatal() {
        let mut gateway = gateway();
        gateway.expect_place_order().never();

        let scheduler = TwapScheduler::new(Arc::new(gateway), params(dec!(0.002), 4), TwapSchedulerConfig::default()).unwrap();
        let report = scheduler.run(CancellationToken::new()).await;
        assert_eq!(report.status, TwapStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_before_start_places_nothing() {
        let mut gateway = gateway();
        gateway.expect_place_order().never();

        let scheduler = TwapScheduler::new(Arc::new(gateway), params(dec!(1), 4), TwapSchedulerConfig::default()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let report = scheduler.run(token).await;
        assert_eq!(report.status, TwapStatus::Canceled);
        assert_eq!(report.chunks_placed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn price_limit_skips_chunks() {
        let mut gateway = gateway();
        gateway.expect_get_price().returning(|_| Ok(dec!(51000)));
        gateway.expect_place_order().never();

        let mut p = params(dec!(1), 2);
        p.price_limit = Some(dec!(50000));
        let scheduler = TwapScheduler::new(Arc::new(gateway), p, TwapSchedulerConfig::default()).unwrap();
        let report = scheduler.run(CancellationToken::new()).await;
        assert_eq!(report.chunks_skipped, 2);
        assert_eq!(report.status, TwapStatus::PartiallyFilled);
    }

    #[tokio::test(start_paused = true)]
    async fn all_chunks_filled_completes() {
        let mut gateway = gateway();
        gateway.expect_place_order().times(4).returning(|spec| {
            Ok(ExecutionReport::accepted(ExchangeOrderId::from(spec.client_order_id.as_str()))
                .with_fill(OrderStatus::Filled, spec.quantity, dec!(50000)))
        });

        let scheduler = TwapScheduler::new(Arc::new(gateway), params(dec!(1), 4), TwapSchedulerConfig::default()).unwrap();
        let progress = scheduler.subscribe();
        let report = scheduler.run(CancellationToken::new()).await;
        assert_eq!(report.status, TwapStatus::Completed);
        assert_eq!(report.filled_quantity, dec!(1));
        assert_eq!(report.average_price, dec!(50000));
        assert_eq!(progress.borrow().status, TwapStatus::Completed);
    }
}
