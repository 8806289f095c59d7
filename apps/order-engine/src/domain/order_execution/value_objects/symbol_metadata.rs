//! Exchange trading rules for a symbol.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::Symbol;

/// Status string the exchange uses for tradable contracts.
pub const TRADING_STATUS: &str = "TRADING";

/// Quantity granularity rules (`LOT_SIZE` filter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotSize {
    /// Minimum order quantity.
    pub min_qty: Decimal,
    /// Maximum order quantity.
    pub max_qty: Decimal,
    /// Quantity step; zero means no step constraint.
    pub step_size: Decimal,
}

/// Price rules (`PRICE_FILTER` filter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFilter {
    /// Minimum price; zero means unconstrained.
    pub min_price: Decimal,
    /// Maximum price; zero means unconstrained.
    pub max_price: Decimal,
    /// Price tick.
    pub tick_size: Decimal,
}

/// Tradability and precision metadata for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolMetadata {
    /// Symbol.
    pub symbol: Symbol,
    /// Exchange status (`TRADING` when tradable).
    pub status: String,
    /// Trading permissions the symbol supports.
    pub permissions: Vec<String>,
    /// Lot size filter, if published.
    pub lot_size: Option<LotSize>,
    /// Price filter, if published.
    pub price_filter: Option<PriceFilter>,
}

impl SymbolMetadata {
    /// Metadata for a tradable symbol with no filters.
    #[must_use]
    pub fn trading(symbol: Symbol) -> Self {
        Self {
            symbol,
            status: TRADING_STATUS.to_string(),
            permissions: vec![TRADING_STATUS.to_string()],
            lot_size: None,
            price_filter: None,
        }
    }

    /// Attach a lot size filter.
    #[must_use]
    pub fn with_lot_size(mut self, min_qty: Decimal, max_qty: Decimal, step_size: Decimal) -> Self {
        self.lot_size = Some(LotSize {
            min_qty,
            max_qty,
            step_size,
        });
        self
    }

    /// Attach a price filter.
    #[must_use]
    pub fn with_price_filter(
        mut self,
        min_price: Decimal,
        max_price: Decimal,
        tick_size: Decimal,
    ) -> Self {
        self.price_filter = Some(PriceFilter {
            min_price,
            max_price,
            tick_size,
        });
        self
    }

    /// Returns true if the exchange reports the symbol as trading.
    #[must_use]
    pub fn is_trading(&self) -> bool {
        self.status == TRADING_STATUS
    }

    /// Returns true if the symbol carries the given permission.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p.eq_ignore_ascii_case(permission))
    }
}
