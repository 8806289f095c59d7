//! Order Aggregate

mod order;

pub use order::{Order, OrderRequest};
