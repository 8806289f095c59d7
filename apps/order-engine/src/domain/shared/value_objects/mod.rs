//! Shared Value Objects

mod identifiers;
mod symbol;

pub use identifiers::{ExchangeOrderId, OrderId, StrategyHandle};
pub use symbol::Symbol;
