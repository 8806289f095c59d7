//! Command-line interface.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use crate::application::strategies::StrategySpec;
use crate::config::StrategiesConfig;
use crate::domain::execution_tactics::{GridMode, GridParams, MAX_CHUNKS, OcoParams, TwapParams};
use crate::domain::order_execution::{OrderRequest, OrderSide, TimeInForce};
use crate::domain::shared::Symbol;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "order-engine")]
#[command(version)]
#[command(about = "Order orchestration for Binance USDⓈ-M futures", long_about = None)]
pub struct Cli {
    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,

    /// Config file path (defaults to config.yaml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Use the futures testnet
    #[arg(long, global = true)]
    pub testnet: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Leverage to set before placing (overrides config)
    #[arg(short, long, global = true)]
    pub leverage: Option<u32>,
}

/// Operations.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Place a market order
    Market {
        /// Trading pair, e.g. BTCUSDT
        #[arg(value_parser = parse_symbol)]
        symbol: Symbol,
        /// BUY or SELL
        side: OrderSide,
        /// Order quantity
        quantity: Decimal,
        /// Only reduce an existing position
        #[arg(long)]
        reduce_only: bool,
    },
    /// Place a limit order
    Limit {
        /// Trading pair
        #[arg(value_parser = parse_symbol)]
        symbol: Symbol,
        /// BUY or SELL
        side: OrderSide,
        /// Order quantity
        quantity: Decimal,
        /// Limit price
        price: Decimal,
        /// GTC, IOC, FOK or POST_ONLY
        #[arg(long, default_value = "GTC")]
        time_in_force: TimeInForce,
    },
    /// Place a stop-limit order
    StopLimit {
        /// Trading pair
        #[arg(value_parser = parse_symbol)]
        symbol: Symbol,
        /// BUY or SELL
        side: OrderSide,
        /// Order quantity
        quantity: Decimal,
        /// Trigger price
        stop_price: Decimal,
        /// Limit price once triggered
        limit_price: Decimal,
    },
    /// Place a take-profit / stop-loss pair; one fill cancels the other
    Oco {
        /// Trading pair
        #[arg(value_parser = parse_symbol)]
        symbol: Symbol,
        /// BUY or SELL
        side: OrderSide,
        /// Quantity for each leg
        quantity: Decimal,
        /// Take-profit limit price
        limit_price: Decimal,
        /// Stop trigger price
        stop_price: Decimal,
        /// Stop leg limit price
        stop_limit_price: Decimal,
    },
    /// Slice a quantity into evenly spaced chunks
    Twap {
        /// Trading pair
        #[arg(value_parser = parse_symbol)]
        symbol: Symbol,
        /// BUY or SELL
        side: OrderSide,
        /// Total quantity
        quantity: Decimal,
        /// Duration in minutes
        #[arg(long)]
        duration: Option<u64>,
        /// Number of chunks (1-100)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_CHUNKS)))]
        chunks: Option<u32>,
        /// Skip chunks when the market is worse than this
        #[arg(long)]
        price_limit: Option<Decimal>,
    },
    /// Run a ladder of resting limit orders
    Grid {
        /// Trading pair
        #[arg(value_parser = parse_symbol)]
        symbol: Symbol,
        /// Upper bound of the ladder
        upper_price: Decimal,
        /// Lower bound of the ladder
        lower_price: Decimal,
        /// Number of levels
        grid_count: u32,
        /// Quantity spread across the ladder
        quantity: Decimal,
        /// BOTH, LONG or SHORT
        #[arg(long)]
        mode: Option<GridMode>,
    },
}

impl Command {
    /// Symbol the command trades.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        match self {
            Self::Market { symbol, .. }
            | Self::Limit { symbol, .. }
            | Self::StopLimit { symbol, .. }
            | Self::Oco { symbol, .. }
            | Self::Twap { symbol, .. }
            | Self::Grid { symbol, .. } => symbol,
        }
    }

    /// Strategy to launch, filling omitted values from configuration.
    #[must_use]
    pub fn into_spec(self, defaults: &StrategiesConfig) -> StrategySpec {
        match self {
            Self::Market {
                symbol,
                side,
                quantity,
                reduce_only,
            } => StrategySpec::Order(
                OrderRequest::market(symbol, side, quantity).with_reduce_only(reduce_only),
            ),
            Self::Limit {
                symbol,
                side,
                quantity,
                price,
                time_in_force,
            } => StrategySpec::Order(
                OrderRequest::limit(symbol, side, quantity, price).with_time_in_force(time_in_force),
            ),
            Self::StopLimit {
                symbol,
                side,
                quantity,
                stop_price,
                limit_price,
            } => StrategySpec::Order(OrderRequest::stop_limit(
                symbol,
                side,
                quantity,
                stop_price,
                limit_price,
            )),
            Self::Oco {
                symbol,
                side,
                quantity,
                limit_price,
                stop_price,
                stop_limit_price,
            } => StrategySpec::Oco(OcoParams {
                symbol,
                side,
                quantity,
                limit_price,
                stop_price,
                stop_limit_price,
            }),
            Self::Twap {
                symbol,
                side,
                quantity,
                duration,
                chunks,
                price_limit,
            } => StrategySpec::Twap(TwapParams {
                symbol,
                side,
                total_quantity: quantity,
                chunk_count: chunks.unwrap_or(defaults.twap.chunks),
                duration: duration.map_or_else(
                    || defaults.twap.duration(),
                    |minutes| Duration::from_secs(minutes * 60),
                ),
                price_limit,
            }),
            Self::Grid {
                symbol,
                upper_price,
                lower_price,
                grid_count,
                quantity,
                mode,
            } => StrategySpec::Grid(GridParams {
                symbol,
                upper_price,
                lower_price,
                grid_count,
                total_quantity: quantity,
                mode: mode.unwrap_or(defaults.grid.mode),
            }),
        }
    }
}

fn parse_symbol(value: &str) -> Result<Symbol, String> {
    Symbol::parse(value).map_err(|e| e.to_string())
}
