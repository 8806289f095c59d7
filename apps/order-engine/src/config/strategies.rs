//! Strategy defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::execution_tactics::GridMode;

/// Strategy configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategiesConfig {
    /// OCO settings.
    #[serde(default)]
    pub oco: OcoConfig,
    /// TWAP defaults.
    #[serde(default)]
    pub twap: TwapConfig,
    /// Grid settings.
    #[serde(default)]
    pub grid: GridConfig,
}

/// OCO settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcoConfig {
    /// Pause between the two leg submissions.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Reconcile interval when driven from the CLI.
    #[serde(default = "default_oco_poll_secs")]
    pub poll_interval_secs: u64,
}

impl Default for OcoConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            poll_interval_secs: default_oco_poll_secs(),
        }
    }
}

impl OcoConfig {
    /// Settle delay as a duration.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// TWAP defaults used when the CLI omits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwapConfig {
    /// Plan duration in minutes.
    #[serde(default = "default_twap_minutes")]
    pub duration_minutes: u64,
    /// Number of chunks.
    #[serde(default = "default_twap_chunks")]
    pub chunks: u32,
}

impl Default for TwapConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_twap_minutes(),
            chunks: default_twap_chunks(),
        }
    }
}

impl TwapConfig {
    /// Plan duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_minutes * 60)
    }
}

/// Grid settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Update interval when driven from the CLI.
    #[serde(default = "default_grid_poll_secs")]
    pub poll_interval_secs: u64,
    /// Default ladder mode.
    #[serde(default)]
    pub mode: GridMode,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_grid_poll_secs(),
            mode: GridMode::default(),
        }
    }
}

impl GridConfig {
    /// Poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

const fn default_settle_delay_ms() -> u64 {
    500
}

const fn default_oco_poll_secs() -> u64 {
    5
}

const fn default_twap_minutes() -> u64 {
    60
}

const fn default_twap_chunks() -> u32 {
    12
}

const fn default_grid_poll_secs() -> u64 {
    10
}
