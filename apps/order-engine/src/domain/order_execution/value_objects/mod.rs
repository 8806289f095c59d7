//! Order Execution Value Objects

mod execution_report;
mod order_kind;
mod order_side;
mod order_status;
mod symbol_metadata;
mod time_in_force;

pub use execution_report::ExecutionReport;
pub use order_kind::OrderKind;
pub use order_side::OrderSide;
pub use order_status::OrderStatus;
pub use symbol_metadata::{LotSize, PriceFilter, SymbolMetadata, TRADING_STATUS};
pub use time_in_force::TimeInForce;
