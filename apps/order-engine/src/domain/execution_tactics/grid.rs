//! Grid ladder definition.
//!
//! `grid_count` evenly spaced rungs between `lower` and `upper` inclusive,
//! each holding at most one resting order that flips side on fill.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::{OrderError, OrderSide, OrderStatus};
use crate::domain::shared::{ExchangeOrderId, Symbol};

/// Which sides the grid seeds at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GridMode {
    /// Buys at or below market, sells above.
    #[default]
    Both,
    /// Buys at every level.
    Long,
    /// Sells above market only.
    Short,
}

impl GridMode {
    /// Side of the initial order at a level, if any.
    #[must_use]
    pub fn initial_side(&self, level_price: Decimal, market_price: Decimal) -> Option<OrderSide> {
        let above_market = level_price > market_price;
        match self {
            Self::Both if above_market => Some(OrderSide::Sell),
            Self::Both | Self::Long => Some(OrderSide::Buy),
            Self::Short if above_market => Some(OrderSide::Sell),
            Self::Short => None,
        }
    }
}

impl fmt::Display for GridMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Both => write!(f, "BOTH"),
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

impl FromStr for GridMode {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BOTH" => Ok(Self::Both),
            "LONG" => Ok(Self::Long),
            "SHORT" => Ok(Self::Short),
            _ => Err(OrderError::validation(
                "mode",
                format!("unknown grid mode '{s}', expected BOTH, LONG or SHORT"),
            )),
        }
    }
}

/// Parameters of a grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridParams {
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Highest rung.
    pub upper_price: Decimal,
    /// Lowest rung.
    pub lower_price: Decimal,
    /// Number of rungs, at least 2.
    pub grid_count: u32,
    /// Quantity spread across the ladder.
    pub total_quantity: Decimal,
    /// Seeding mode.
    #[serde(default)]
    pub mode: GridMode,
}

impl GridParams {
    /// Validate the ladder shape.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for an inverted range, fewer than two
    /// levels or a non-positive quantity.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.lower_price <= Decimal::ZERO {
            return Err(OrderError::validation(
                "lower_price",
                format!("must be greater than 0, got {}", self.lower_price),
            ));
        }
        if self.upper_price <= self.lower_price {
            return Err(OrderError::validation(
                "upper_price",
                format!(
                    "must be above lower price ({} <= {})",
                    self.upper_price, self.lower_price
                ),
            ));
        }
        if self.grid_count < 2 {
            return Err(OrderError::validation(
                "grid_count",
                format!("must be at least 2, got {}", self.grid_count),
            ));
        }
        if self.total_quantity <= Decimal::ZERO {
            return Err(OrderError::validation(
                "total_quantity",
                format!("must be greater than 0, got {}", self.total_quantity),
            ));
        }
        Ok(())
    }

    /// Distance between adjacent rungs.
    #[must_use]
    pub fn spacing(&self) -> Decimal {
        (self.upper_price - self.lower_price) / Decimal::from(self.grid_count.saturating_sub(1).max(1))
    }

    /// Rung prices from lowest to highest.
    ///
    /// The last rung is pinned to `upper_price` so division residue never
    /// shifts the top of the ladder.
    #[must_use]
    pub fn level_prices(&self) -> Vec<Decimal> {
        let spacing = self.spacing();
        let last = self.grid_count.saturating_sub(1);
        (0..self.grid_count)
            .map(|i| {
                if i == last {
                    self.upper_price
                } else {
                    self.lower_price + spacing * Decimal::from(i)
                }
            })
            .collect()
    }

    /// Live quantity per rung: `total_quantity / (grid_count - 1)`.
    #[must_use]
    pub fn level_quantity(&self) -> Decimal {
        self.total_quantity / Decimal::from(self.grid_count.saturating_sub(1).max(1))
    }
}

/// State of one rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GridLevelStatus {
    /// No resting order; waiting for (re-)placement.
    Pending,
    /// Order resting on the exchange.
    Active,
    /// Stopped; never re-placed.
    Canceled,
}

/// Lifecycle of the grid as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GridStatus {
    /// Built, not started.
    Initialized,
    /// Orders seeded.
    Running,
    /// Stopped.
    Stopped,
}

/// Serializable view of one rung.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLevelSnapshot {
    /// 0-based index, lowest price first.
    pub index: usize,
    /// Rung price.
    pub price: Decimal,
    /// Order quantity.
    pub quantity: Decimal,
    /// Side of the current or next order.
    pub side: Option<OrderSide>,
    /// Rung state.
    pub status: GridLevelStatus,
    /// Status of the current order, if one exists.
    pub order_status: Option<OrderStatus>,
    /// Exchange id of the current order.
    pub exchange_order_id: Option<ExchangeOrderId>,
    /// Number of fills captured at this rung.
    pub fill_count: u32,
}

/// Serializable view of the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSnapshot {
    /// Parameters.
    pub params: GridParams,
    /// Grid state.
    pub status: GridStatus,
    /// Last market price seen.
    pub last_price: Option<Decimal>,
    /// Rungs, lowest first.
    pub levels: Vec<GridLevelSnapshot>,
}
