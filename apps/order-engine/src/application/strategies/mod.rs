//! Strategy Engines
//!
//! Coordinators that turn one trading intent into several exchange orders,
//! plus the supervisor that owns them.

pub mod grid_engine;
pub mod oco_engine;
pub mod supervisor;
pub mod twap_scheduler;

pub use grid_engine::{GridEngine, GridEngineConfig};
pub use oco_engine::{OcoEngine, OcoEngineConfig, OcoSnapshot};
pub use supervisor::{
    StrategySnapshot, StrategySpec, StrategySupervisor, SupervisorConfig, SupervisorError,
};
pub use twap_scheduler::{TwapScheduler, TwapSchedulerConfig};
