//! Order kind (market, limit, stop-limit).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange-level order kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    /// Execute immediately at the best available price.
    Market,
    /// Rest at a limit price.
    Limit,
    /// Becomes a limit order once the stop price trades.
    StopLimit,
}

impl OrderKind {
    /// Returns true if this kind needs a limit price.
    #[must_use]
    pub const fn requires_price(&self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit)
    }

    /// Returns true if this kind needs a stop trigger price.
    #[must_use]
    pub const fn requires_stop_price(&self) -> bool {
        matches!(self, Self::StopLimit)
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
            Self::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_requirements_per_kind() {
        assert!(!OrderKind::Market.requires_price());
        assert!(!OrderKind::Market.requires_stop_price());
        assert!(OrderKind::Limit.requires_price());
        assert!(!OrderKind::Limit.requires_stop_price());
        assert!(OrderKind::StopLimit.requires_price());
        assert!(OrderKind::StopLimit.requires_stop_price());
    }

    #[test]
    fn order_kind_display() {
        assert_eq!(OrderKind::StopLimit.to_string(), "STOP_LIMIT");
        assert_eq!(
            serde_json::to_string(&OrderKind::StopLimit).unwrap(),
            "\"STOP_LIMIT\""
        );
    }
}
