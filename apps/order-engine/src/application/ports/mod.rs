//! Application Ports
//!
//! Interfaces the orchestration layer consumes from external systems.

mod exchange_gateway;

#[cfg(test)]
pub use exchange_gateway::MockExchangeGateway;
pub use exchange_gateway::{ExchangeGateway, GatewayError, OrderSpec};
