//! Binance USDⓈ-M futures gateway implementing `ExchangeGateway`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::Method;
use rust_decimal::Decimal;

use crate::application::ports::{ExchangeGateway, GatewayError, OrderSpec};
use crate::domain::order_execution::{
    ExecutionReport, LotSize, OrderKind, OrderStatus, PriceFilter, SymbolMetadata,
};
use crate::domain::shared::{ExchangeOrderId, Symbol};

use super::config::{BinanceConfig, BinanceEnvironment};
use super::error::BinanceError;
use super::http_client::BinanceHttpClient;
use super::types::{
    ExchangeInfoResponse, LeverageResponse, OrderResponse, SymbolFilter, SymbolInfo,
    TickerPriceResponse,
};

const PING: &str = "/fapi/v1/ping";
const EXCHANGE_INFO: &str = "/fapi/v1/exchangeInfo";
const TICKER_PRICE: &str = "/fapi/v1/ticker/price";
const ORDER: &str = "/fapi/v1/order";
const ALL_OPEN_ORDERS: &str = "/fapi/v1/allOpenOrders";
const LEVERAGE: &str = "/fapi/v1/leverage";

/// Binance futures gateway.
///
/// Symbol metadata is fetched once per symbol and cached for the adapter's
/// lifetime.
#[derive(Debug)]
pub struct BinanceFuturesGateway {
    client: BinanceHttpClient,
    environment: BinanceEnvironment,
    default_permissions: Vec<String>,
    metadata_cache: RwLock<HashMap<Symbol, SymbolMetadata>>,
}

impl BinanceFuturesGateway {
    /// Create a gateway.
    pub fn new(config: &BinanceConfig) -> Result<Self, BinanceError> {
        Ok(Self {
            client: BinanceHttpClient::new(config)?,
            environment: config.environment,
            default_permissions: config.default_permissions.clone(),
            metadata_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Environment this gateway trades on.
    #[must_use]
    pub const fn environment(&self) -> BinanceEnvironment {
        self.environment
    }

    fn order_params(spec: &OrderSpec) -> Vec<(&'static str, String)> {
        let order_type = match spec.kind {
            OrderKind::Market => "MARKET",
            OrderKind::Limit => "LIMIT",
            OrderKind::StopLimit => "STOP",
        };

        let mut params = vec![
            ("symbol", spec.symbol.to_string()),
            ("side", spec.side.as_str().to_string()),
            ("type", order_type.to_string()),
            ("quantity", spec.quantity.normalize().to_string()),
            ("newClientOrderId", spec.client_order_id.to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if spec.kind != OrderKind::Market {
            params.push(("timeInForce", spec.time_in_force.wire_code().to_string()));
        }
        if let Some(price) = spec.price {
            params.push(("price", price.normalize().to_string()));
        }
        if let Some(stop_price) = spec.stop_price {
            params.push(("stopPrice", stop_price.normalize().to_string()));
        }
        if spec.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }
        params
    }

    fn to_metadata(&self, info: SymbolInfo) -> Result<SymbolMetadata, GatewayError> {
        let symbol = Symbol::parse(&info.symbol).map_err(|e| GatewayError::InvalidRequest {
            message: e.to_string(),
        })?;
        let mut lot_size = None;
        let mut price_filter = None;
        for filter in info.filters {
            match filter {
                SymbolFilter::LotSize {
                    min_qty,
                    max_qty,
                    step_size,
                } => {
                    lot_size = Some(LotSize {
                        min_qty,
                        max_qty,
                        step_size,
                    });
                }
                SymbolFilter::PriceFilter {
                    min_price,
                    max_price,
                    tick_size,
                } => {
                    price_filter = Some(PriceFilter {
                        min_price,
                        max_price,
                        tick_size,
                    });
                }
                SymbolFilter::Other => {}
            }
        }
        Ok(SymbolMetadata {
            symbol,
            status: info.status,
            permissions: info
                .permissions
                .unwrap_or_else(|| self.default_permissions.clone()),
            lot_size,
            price_filter,
        })
    }
}

/// Map the exchange's status string.
fn parse_status(status: &str) -> Result<OrderStatus, GatewayError> {
    match status {
        "NEW" => Ok(OrderStatus::New),
        "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
        "FILLED" => Ok(OrderStatus::Filled),
        "CANCELED" => Ok(OrderStatus::Canceled),
        "REJECTED" => Ok(OrderStatus::Rejected),
        "EXPIRED" | "EXPIRED_IN_MATCH" => Ok(OrderStatus::Expired),
        other => Err(GatewayError::Indeterminate {
            message: format!("unknown order status '{other}'"),
        }),
    }
}

fn to_report(response: OrderResponse) -> Result<ExecutionReport, GatewayError> {
    Ok(ExecutionReport {
        exchange_order_id: ExchangeOrderId::new(response.order_id.to_string()),
        status: parse_status(&response.status)?,
        filled_quantity: response.executed_qty,
        avg_fill_price: response.avg_price,
        commission: Decimal::ZERO,
        updated_at: response.update_time.and_then(DateTime::<Utc>::from_timestamp_millis),
    })
}

fn order_id_params(symbol: &Symbol, id: &ExchangeOrderId) -> Vec<(&'static str, String)> {
    vec![
        ("symbol", symbol.to_string()),
        ("orderId", id.to_string()),
    ]
}

#[async_trait]
impl ExchangeGateway for BinanceFuturesGateway {
    async fn ping(&self) -> Result<(), GatewayError> {
        let _: serde_json::Value = self.client.get(PING, &[]).await?;
        Ok(())
    }

    async fn get_symbol_info(&self, symbol: &Symbol) -> Result<Option<SymbolMetadata>, GatewayError> {
        if let Some(cached) = self.metadata_cache.read().get(symbol) {
            return Ok(Some(cached.clone()));
        }

        let info: ExchangeInfoResponse = self.client.get(EXCHANGE_INFO, &[]).await?;
        let Some(found) = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol.as_str())
        else {
            return Ok(None);
        };

        let metadata = self.to_metadata(found)?;
        self.metadata_cache
            .write()
            .insert(symbol.clone(), metadata.clone());
        Ok(Some(metadata))
    }

    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal, GatewayError> {
        let ticker: TickerPriceResponse = self
            .client
            .get(TICKER_PRICE, &[("symbol", symbol.to_string())])
            .await?;
        if ticker.price <= Decimal::ZERO {
            return Err(GatewayError::InvalidRequest {
                message: format!("non-positive price {} for {}", ticker.price, ticker.symbol),
            });
        }
        Ok(ticker.price)
    }

    async fn place_order(&self, spec: &OrderSpec) -> Result<ExecutionReport, GatewayError> {
        let params = Self::order_params(spec);
        let response: OrderResponse = self.client.signed(Method::POST, ORDER, &params).await?;
        if let Some(echoed) = response.client_order_id.as_deref()
            && echoed != spec.client_order_id.as_str()
        {
            tracing::warn!(
                client_order_id = %spec.client_order_id,
                echoed,
                exchange_order_id = response.order_id,
                "Exchange echoed a different client order id"
            );
        }
        to_report(response)
    }

    async fn cancel_order(
        &self,
        symbol: &Symbol,
        exchange_order_id: &ExchangeOrderId,
    ) -> Result<ExecutionReport, GatewayError> {
        let response: OrderResponse = self
            .client
            .signed(Method::DELETE, ORDER, &order_id_params(symbol, exchange_order_id))
            .await?;
        to_report(response)
    }

    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .client
            .signed(Method::DELETE, ALL_OPEN_ORDERS, &[("symbol", symbol.to_string())])
            .await?;
        Ok(())
    }

    async fn get_order_status(
        &self,
        symbol: &Symbol,
        exchange_order_id: &ExchangeOrderId,
    ) -> Result<ExecutionReport, GatewayError> {
        let response: OrderResponse = self
            .client
            .signed(Method::GET, ORDER, &order_id_params(symbol, exchange_order_id))
            .await?;
        to_report(response)
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<(), GatewayError> {
        let response: LeverageResponse = self
            .client
            .signed(
                Method::POST,
                LEVERAGE,
                &[
                    ("symbol", symbol.to_string()),
                    ("leverage", leverage.to_string()),
                ],
            )
            .await?;
        tracing::info!(symbol = %response.symbol, leverage = response.leverage, "Leverage set");
        Ok(())
    }
}
