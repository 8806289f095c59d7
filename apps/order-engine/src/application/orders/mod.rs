//! Single-order lifecycle on top of the gateway port.

mod managed_order;
mod order_preparer;

pub use managed_order::ManagedOrder;
pub use order_preparer::OrderPreparer;
