//! Binance USDⓈ-M Futures Gateway
//!
//! REST implementation of `ExchangeGateway` with:
//! - HMAC-SHA256 request signing
//! - Retry with exponential backoff on transient failures
//! - Exchange error codes mapped onto the gateway taxonomy

mod adapter;
mod config;
mod error;
mod http_client;
mod retry;
mod signing;
mod types;

pub use adapter::BinanceFuturesGateway;
pub use config::{BinanceConfig, BinanceEnvironment};
pub use error::BinanceError;
pub use retry::{ExponentialBackoff, RetryPolicy};
