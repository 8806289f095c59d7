//! Strongly-typed identifiers.
//!
//! These prevent mixing up local, exchange and strategy IDs.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from a string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(
    OrderId,
    "Locally generated order identifier, sent to the exchange as the client order id."
);
define_id!(
    ExchangeOrderId,
    "Opaque identifier the exchange assigns when it accepts an order."
);
define_id!(StrategyHandle, "Handle for a running strategy instance.");

impl OrderId {
    /// Generate a fresh client order id.
    ///
    /// Binance caps client ids at 36 characters, so the UUID is sent without hyphens.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl StrategyHandle {
    /// Generate a new unique handle.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_order_ids_are_unique_and_compact() {
        let a = OrderId::generate();
        let b = OrderId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(!a.as_str().contains('-'));
    }

    #[test]
    fn exchange_order_id_display() {
        let id = ExchangeOrderId::from("8389765");
        assert_eq!(id.to_string(), "8389765");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"8389765\"");
    }

    #[test]
    fn strategy_handles_are_unique() {
        assert_ne!(StrategyHandle::generate(), StrategyHandle::generate());
    }
}
