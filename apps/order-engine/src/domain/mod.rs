//! Domain Layer
//!
//! Pure types and rules. No I/O.

pub mod execution_tactics;
pub mod order_execution;
pub mod shared;
