//! Order Execution Domain Services

mod order_state_machine;
mod order_validator;

pub use order_state_machine::OrderStateMachine;
pub use order_validator::OrderValidator;
