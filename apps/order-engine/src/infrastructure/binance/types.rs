//! Wire types for the futures REST API.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Error body: `{"code": -2019, "msg": "Margin is insufficient."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceErrorResponse {
    /// Exchange error code.
    pub code: i64,
    /// Exchange message.
    pub msg: String,
}

/// `GET /fapi/v1/exchangeInfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfoResponse {
    /// Listed contracts.
    pub symbols: Vec<SymbolInfo>,
}

/// One listed contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    /// Symbol.
    pub symbol: String,
    /// Trading status.
    pub status: String,
    /// Permissions (absent on futures, present on some mirrors).
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    /// Trading rule filters.
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

/// Trading rule filter. Only the two the engine enforces are decoded.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    /// Quantity rules.
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize {
        /// Minimum quantity.
        min_qty: Decimal,
        /// Maximum quantity.
        max_qty: Decimal,
        /// Step size.
        step_size: Decimal,
    },
    /// Price rules.
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    PriceFilter {
        /// Minimum price.
        min_price: Decimal,
        /// Maximum price.
        max_price: Decimal,
        /// Tick size.
        tick_size: Decimal,
    },
    /// Anything else.
    #[serde(other)]
    Other,
}

/// `GET /fapi/v1/ticker/price`.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPriceResponse {
    /// Symbol.
    pub symbol: String,
    /// Last price.
    pub price: Decimal,
}

/// Order endpoints (`POST`, `GET`, `DELETE /fapi/v1/order`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    /// Exchange order id.
    pub order_id: i64,
    /// Client order id echoed back.
    #[serde(default)]
    pub client_order_id: Option<String>,
    /// Order status.
    pub status: String,
    /// Executed quantity.
    #[serde(default)]
    pub executed_qty: Decimal,
    /// Average fill price.
    #[serde(default)]
    pub avg_price: Decimal,
    /// Last update, Unix milliseconds.
    #[serde(default)]
    pub update_time: Option<i64>,
}

/// `POST /fapi/v1/leverage`.
#[derive(Debug, Clone, Deserialize)]
pub struct LeverageResponse {
    /// Leverage now in effect.
    pub leverage: u32,
    /// Symbol.
    pub symbol: String,
}
