//! Infrastructure Layer
//!
//! Implementations of the exchange gateway port.

pub mod binance;
pub mod simulated;

pub use binance::{BinanceConfig, BinanceEnvironment, BinanceError, BinanceFuturesGateway};
pub use simulated::{GatewayCall, SimulatedExchange};
