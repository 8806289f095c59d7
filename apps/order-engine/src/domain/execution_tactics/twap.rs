//! Time-Weighted Average Price plan.
//!
//! Pure scheduling arithmetic. The async loop that drives it lives in
//! `application::strategies::twap_scheduler`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::{Order, OrderError, OrderSide};
use crate::domain::shared::Symbol;

/// Fraction of the total that counts as complete.
pub const COMPLETION_THRESHOLD: Decimal = dec!(0.99);

/// Upper bound on the number of slices in one plan.
pub const MAX_CHUNKS: u32 = 100;

/// Parameters of a TWAP execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwapParams {
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Side of every chunk.
    pub side: OrderSide,
    /// Quantity to execute in total.
    pub total_quantity: Decimal,
    /// Number of slices.
    pub chunk_count: u32,
    /// Time over which the slices are spread.
    pub duration: Duration,
    /// Skip a chunk when the market trades through this price
    /// (above it for BUY, below it for SELL).
    #[serde(default)]
    pub price_limit: Option<Decimal>,
}

/// Derived schedule of a TWAP execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwapPlan {
    params: TwapParams,
    chunk_size: Decimal,
    interval: Duration,
}

impl TwapPlan {
    /// Derive chunk size and interval.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for a non-positive quantity, a chunk
    /// count outside `1..=MAX_CHUNKS`, a zero duration or a non-positive price
    /// limit.
    pub fn new(params: TwapParams) -> Result<Self, OrderError> {
        if params.total_quantity <= Decimal::ZERO {
            return Err(OrderError::validation(
                "total_quantity",
                format!("must be greater than 0, got {}", params.total_quantity),
            ));
        }
        if params.chunk_count == 0 {
            return Err(OrderError::validation("chunk_count", "must be at least 1"));
        }
        if params.chunk_count > MAX_CHUNKS {
            return Err(OrderError::validation(
                "chunk_count",
                format!("must be at most {MAX_CHUNKS}, got {}", params.chunk_count),
            ));
        }
        if params.duration.is_zero() {
            return Err(OrderError::validation("duration", "must be greater than 0"));
        }
        if let Some(limit) = params.price_limit
            && limit <= Decimal::ZERO
        {
            return Err(OrderError::validation(
                "price_limit",
                format!("must be greater than 0, got {limit}"),
            ));
        }

        let chunk_size = params.total_quantity / Decimal::from(params.chunk_count);
        let interval = params.duration / params.chunk_count;
        Ok(Self {
            params,
            chunk_size,
            interval,
        })
    }

    /// Plan parameters.
    #[must_use]
    pub const fn params(&self) -> &TwapParams {
        &self.params
    }

    /// `total_quantity / chunk_count`.
    #[must_use]
    pub const fn chunk_size(&self) -> Decimal {
        self.chunk_size
    }

    /// `duration / chunk_count`.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Offset from the start at which 1-based chunk `index` is due.
    #[must_use]
    pub fn scheduled_offset(&self, index: u32) -> Duration {
        self.interval * index.saturating_sub(1)
    }

    /// Quantity for the next chunk given what has filled so far.
    #[must_use]
    pub fn next_chunk_quantity(&self, filled_so_far: Decimal) -> Decimal {
        let remaining = self.params.total_quantity - filled_so_far;
        self.chunk_size.min(remaining).max(Decimal::ZERO)
    }

    /// Returns true if the market price is inside the configured bound.
    #[must_use]
    pub fn price_allows(&self, market_price: Decimal) -> bool {
        match (self.params.price_limit, self.params.side) {
            (None, _) => true,
            (Some(limit), OrderSide::Buy) => market_price <= limit,
            (Some(limit), OrderSide::Sell) => market_price >= limit,
        }
    }

    /// Final status for a schedule that ran to its end.
    #[must_use]
    pub fn completion_status(&self, filled: Decimal) -> TwapStatus {
        if filled >= self.params.total_quantity * COMPLETION_THRESHOLD {
            TwapStatus::Completed
        } else {
            TwapStatus::PartiallyFilled
        }
    }
}

/// Lifecycle of a TWAP execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TwapStatus {
    /// Created, not started.
    Initialized,
    /// Schedule in progress.
    Executing,
    /// At least 99% of the total filled.
    Completed,
    /// Schedule finished below 99%.
    PartiallyFilled,
    /// Stopped by request.
    Canceled,
    /// Aborted by a placement failure.
    Failed,
}

impl TwapStatus {
    /// Returns true once the schedule has stopped running.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self, Self::Initialized | Self::Executing)
    }
}

/// Outcome of one scheduled chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkOutcome {
    /// Order placed.
    Placed,
    /// Skipped because the market violated the price bound.
    SkippedPriceLimit,
    /// Skipped because the remainder rounds below the minimum lot.
    SkippedTooSmall,
}

/// Record of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwapChunk {
    /// 1-based chunk index.
    pub index: u32,
    /// Scheduled offset from start, in milliseconds.
    pub scheduled_offset_ms: u64,
    /// Quantity requested for this chunk.
    pub quantity: Decimal,
    /// What happened.
    pub outcome: ChunkOutcome,
    /// Order snapshot when placed.
    pub order: Option<Order>,
}

/// Progress and result of a TWAP execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwapReport {
    /// Symbol.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Current status.
    pub status: TwapStatus,
    /// Target quantity.
    pub total_quantity: Decimal,
    /// Quantity filled so far.
    pub filled_quantity: Decimal,
    /// Quantity-weighted average fill price.
    pub average_price: Decimal,
    /// Chunks sent to the exchange.
    pub chunks_placed: u32,
    /// Placed chunks that fully filled.
    pub chunks_filled: u32,
    /// Chunks skipped.
    pub chunks_skipped: u32,
    /// Set when the schedule starts.
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the schedule stops.
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure message when `status` is `Failed`.
    pub error: Option<String>,
    /// Per-chunk records.
    pub chunks: Vec<TwapChunk>,
}

impl TwapReport {
    /// Empty report for a plan.
    #[must_use]
    pub fn new(plan: &TwapPlan) -> Self {
        Self {
            symbol: plan.params.symbol.clone(),
            side: plan.params.side,
            status: TwapStatus::Initialized,
            total_quantity: plan.params.total_quantity,
            filled_quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            chunks_placed: 0,
            chunks_filled: 0,
            chunks_skipped: 0,
            started_at: None,
            finished_at: None,
            error: None,
            chunks: Vec::new(),
        }
    }

    /// Record a placed chunk and fold its fill into the totals.
    pub fn record_placed(&mut self, index: u32, offset: Duration, order: Order) {
        self.chunks_placed += 1;
        self.chunks.push(TwapChunk {
            index,
            scheduled_offset_ms: duration_millis(offset),
            quantity: order.quantity(),
            outcome: ChunkOutcome::Placed,
            order: Some(order),
        });
        self.recompute_fills();
    }

    /// Replace the snapshot of a placed chunk after a status refresh.
    pub fn update_order(&mut self, index: u32, order: Order) {
        if let Some(chunk) = self.chunks.iter_mut().find(|c| c.index == index) {
            chunk.order = Some(order);
            self.recompute_fills();
        }
    }

    /// Record a skipped chunk.
    pub fn record_skipped(
        &mut self,
        index: u32,
        offset: Duration,
        quantity: Decimal,
        outcome: ChunkOutcome,
    ) {
        self.chunks_skipped += 1;
        self.chunks.push(TwapChunk {
            index,
            scheduled_offset_ms: duration_millis(offset),
            quantity,
            outcome,
            order: None,
        });
    }

    /// Sum of quantities sent to the exchange.
    #[must_use]
    pub fn placed_quantity(&self) -> Decimal {
        self.chunks
            .iter()
            .filter(|c| c.outcome == ChunkOutcome::Placed)
            .map(|c| c.quantity)
            .sum()
    }

    fn recompute_fills(&mut self) {
        let mut filled = Decimal::ZERO;
        let mut notional = Decimal::ZERO;
        let mut chunks_filled = 0;
        for order in self.chunks.iter().filter_map(|c| c.order.as_ref()) {
            let quantity = order.filled_quantity();
            filled += quantity;
            notional += quantity * order.avg_fill_price();
            if quantity > Decimal::ZERO && quantity >= order.quantity() {
                chunks_filled += 1;
            }
        }
        self.filled_quantity = filled;
        self.chunks_filled = chunks_filled;
        self.average_price = if filled > Decimal::ZERO {
            notional / filled
        } else {
            Decimal::ZERO
        };
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::{ExecutionReport, OrderRequest, OrderStatus};
    use crate::domain::shared::ExchangeOrderId;

    fn params(total: Decimal, chunks: u32, minutes: u64) -> TwapParams {
        TwapParams {
            symbol: Symbol::parse("BTCUSDT").unwrap(),
            side: OrderSide::Buy,
            total_quantity: total,
            chunk_count: chunks,
            duration: Duration::from_secs(minutes * 60),
            price_limit: None,
        }
    }

    fn filled_order(quantity: Decimal, price: Decimal) -> Order {
        let mut order = Order::new(OrderRequest::market(
            Symbol::parse("BTCUSDT").unwrap(),
            OrderSide::Buy,
            quantity,
        ))
        .unwrap();
        order
            .record_acceptance(
                &ExecutionReport::accepted(ExchangeOrderId::from("1")).with_fill(
                    OrderStatus::Filled,
                    quantity,
                    price,
                ),
            )
            .unwrap();
        order
    }

    #[test]
    fn two_chunks_over_two_minutes() {
        let plan = TwapPlan::new(params(dec!(0.1), 2, 2)).unwrap();
        assert_eq!(plan.chunk_size(), dec!(0.05));
        assert_eq!(plan.interval(), Duration::from_secs(60));
        assert_eq!(plan.scheduled_offset(1), Duration::ZERO);
        assert_eq!(plan.scheduled_offset(2), Duration::from_secs(60));
    }

    #[test]
    fn rejects_degenerate_plans() {
        assert!(TwapPlan::new(params(Decimal::ZERO, 2, 2)).is_err());
        assert!(TwapPlan::new(params(dec!(1), 0, 2)).is_err());
        assert!(TwapPlan::new(params(dec!(1), 2, 0)).is_err());
    }

    #[test]
    fn chunk_count_is_capped() {
        assert!(TwapPlan::new(params(dec!(1), MAX_CHUNKS, 100)).is_ok());
        let err = TwapPlan::new(params(dec!(1), MAX_CHUNKS + 1, 100)).unwrap_err();
        assert!(err.is_validation());
        assert!(TwapPlan::new(params(dec!(1), 5000, 100)).is_err());
    }

    #[test]
    fn next_chunk_absorbs_remainder() {
        let plan = TwapPlan::new(params(dec!(0.1), 2, 2)).unwrap();
        assert_eq!(plan.next_chunk_quantity(Decimal::ZERO), dec!(0.05));
        assert_eq!(plan.next_chunk_quantity(dec!(0.07)), dec!(0.03));
        assert_eq!(plan.next_chunk_quantity(dec!(0.1)), Decimal::ZERO);
        assert_eq!(plan.next_chunk_quantity(dec!(0.2)), Decimal::ZERO);
    }

    #[test]
    fn price_bound_depends_on_side() {
        let mut p = params(dec!(1), 2, 2);
        p.price_limit = Some(dec!(50000));
        let buy = TwapPlan::new(p.clone()).unwrap();
        assert!(buy.price_allows(dec!(49999)));
        assert!(!buy.price_allows(dec!(50001)));

        p.side = OrderSide::Sell;
        let sell = TwapPlan::new(p).unwrap();
        assert!(sell.price_allows(dec!(50001)));
        assert!(!sell.price_allows(dec!(49999)));
    }

    #[test]
    fn completion_tolerates_rounding() {
        let plan = TwapPlan::new(params(dec!(1), 4, 4)).unwrap();
        assert_eq!(plan.completion_status(dec!(0.99)), TwapStatus::Completed);
        assert_eq!(plan.completion_status(dec!(0.98)), TwapStatus::PartiallyFilled);
    }

    #[test]
    fn report_tracks_vwap() {
        let plan = TwapPlan::new(params(dec!(0.2), 2, 2)).unwrap();
        let mut report = TwapReport::new(&plan);
        report.record_placed(1, Duration::ZERO, filled_order(dec!(0.1), dec!(100)));
        report.record_placed(2, Duration::from_secs(60), filled_order(dec!(0.1), dec!(200)));
        assert_eq!(report.filled_quantity, dec!(0.2));
        assert_eq!(report.average_price, dec!(150));
        assert_eq!(report.chunks_filled, 2);
        assert_eq!(report.chunks[1].scheduled_offset_ms, 60_000);
        assert_eq!(report.placed_quantity(), dec!(0.2));
    }
}
