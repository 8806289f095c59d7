//! Order Execution Bounded Context
//!
//! Lifecycle of a single exchange order: the request, the entity tracking
//! exchange state, the transition table and the pre-placement validator.

pub mod aggregate;
pub mod errors;
pub mod services;
pub mod value_objects;

pub use aggregate::{Order, OrderRequest};
pub use errors::OrderError;
pub use services::{OrderStateMachine, OrderValidator};
pub use value_objects::{
    ExecutionReport, LotSize, OrderKind, OrderSide, OrderStatus, PriceFilter, SymbolMetadata,
    TimeInForce,
};
