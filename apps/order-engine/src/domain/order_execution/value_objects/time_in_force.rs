//! Time in force for orders.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::order_execution::OrderError;

/// How long a resting order stays active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Good-til-canceled.
    #[default]
    Gtc,
    /// Immediate-or-cancel (fill immediately, cancel remainder).
    Ioc,
    /// Fill-or-kill (all or nothing).
    Fok,
    /// Post-only; rejected instead of taking liquidity.
    PostOnly,
}

impl TimeInForce {
    /// Returns true if the order requires immediate execution.
    #[must_use]
    pub const fn is_immediate(&self) -> bool {
        matches!(self, Self::Ioc | Self::Fok)
    }

    /// Exchange wire code. Binance calls post-only `GTX`.
    #[must_use]
    pub const fn wire_code(&self) -> &'static str {
        match self {
            Self::Gtc => "GTC",
            Self::Ioc => "IOC",
            Self::Fok => "FOK",
            Self::PostOnly => "GTX",
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gtc => write!(f, "GTC"),
            Self::Ioc => write!(f, "IOC"),
            Self::Fok => write!(f, "FOK"),
            Self::PostOnly => write!(f, "POST_ONLY"),
        }
    }
}

impl FromStr for TimeInForce {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GTC" => Ok(Self::Gtc),
            "IOC" => Ok(Self::Ioc),
            "FOK" => Ok(Self::Fok),
            "POST_ONLY" | "GTX" => Ok(Self::PostOnly),
            other => Err(OrderError::validation(
                "time_in_force",
                format!("unsupported time in force {other:?}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_gtc() {
        assert_eq!(TimeInForce::default(), TimeInForce::Gtc);
    }

    #[test]
    fn post_only_maps_to_gtx() {
        assert_eq!(TimeInForce::PostOnly.wire_code(), "GTX");
        assert_eq!("gtx".parse::<TimeInForce>().unwrap(), TimeInForce::PostOnly);
        assert_eq!(TimeInForce::PostOnly.to_string(), "POST_ONLY");
    }

    #[test]
    fn immediate_policies() {
        assert!(TimeInForce::Ioc.is_immediate());
        assert!(TimeInForce::Fok.is_immediate());
        assert!(!TimeInForce::Gtc.is_immediate());
        assert!("DAY".parse::<TimeInForce>().is_err());
    }
}
