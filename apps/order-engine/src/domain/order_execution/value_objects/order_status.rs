//! Lifecycle status of a single order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status.
///
/// `Initialized` is local only; every other state follows a successful
/// placement call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Built locally, not yet submitted.
    Initialized,
    /// Accepted by the exchange and resting.
    New,
    /// Some quantity has executed.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Canceled.
    Canceled,
    /// Rejected by the exchange.
    Rejected,
    /// Expired (IOC/FOK remainder, or exchange expiry).
    Expired,
}

impl OrderStatus {
    /// Filled, canceled, rejected or expired. No further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Canceled | Self::Rejected | Self::Expired
        )
    }

    /// Live on the exchange.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::New | Self::PartiallyFilled)
    }

    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "INITIALIZED",
            Self::New => "NEW",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Canceled => "CANCELED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
