//! Application Layer
//!
//! Orchestrates domain logic against the exchange:
//!
//! - **Ports**: the exchange gateway contract
//! - **Orders**: single-order lifecycle and pre-placement validation
//! - **Strategies**: OCO, TWAP and grid engines and their supervisor

pub mod orders;
pub mod ports;
pub mod strategies;
