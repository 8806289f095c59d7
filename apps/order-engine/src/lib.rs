// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Order Engine - Futures Order Orchestration
//!
//! Places and tracks orders on Binance USDⓈ-M futures and runs synthetic
//! strategies the exchange does not offer natively.
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: pure types and rules
//!   - `order_execution`: Order aggregate, status lifecycle, validator
//!   - `execution_tactics`: OCO, TWAP and Grid parameters and reports
//!   - `shared`: Symbol and identifiers
//!
//! - **Application**: orchestration over the gateway port
//!   - `ports`: `ExchangeGateway`
//!   - `orders`: managed order lifecycle and pre-placement checks
//!   - `strategies`: OCO engine, TWAP scheduler, Grid engine, supervisor
//!
//! - **Infrastructure**: gateway implementations
//!   - `binance`: signed REST adapter with retry
//!   - `simulated`: in-memory exchange

#![forbid(unsafe_code)]

/// Domain layer - Core types and rules with no I/O.
pub mod domain;

/// Application layer - Orchestration and port definitions.
pub mod application;

/// Infrastructure layer - Exchange adapters.
pub mod infrastructure;

/// Configuration loading.
pub mod config;

/// Tracing subscriber setup.
pub mod telemetry;

/// Command-line interface.
pub mod cli;

pub use application::ports::{ExchangeGateway, GatewayError, OrderSpec};
pub use application::strategies::{
    StrategySnapshot, StrategySpec, StrategySupervisor, SupervisorConfig, SupervisorError,
};
pub use domain::order_execution::{
    Order, OrderError, OrderKind, OrderRequest, OrderSide, OrderStatus, TimeInForce,
};
pub use domain::shared::{ExchangeOrderId, OrderId, StrategyHandle, Symbol};
