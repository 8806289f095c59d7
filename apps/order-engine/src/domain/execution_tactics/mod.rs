//! Execution Tactics Bounded Context
//!
//! Definitions of the synthetic strategies built from plain exchange orders:
//! OCO pairs, TWAP schedules and grid ladders.

pub mod grid;
pub mod oco;
pub mod twap;

pub use grid::{
    GridLevelSnapshot, GridLevelStatus, GridMode, GridParams, GridSnapshot, GridStatus,
};
pub use oco::{OcoParams, OcoStatus};
pub use twap::{
    ChunkOutcome, MAX_CHUNKS, TwapChunk, TwapParams, TwapPlan, TwapReport, TwapStatus,
};
