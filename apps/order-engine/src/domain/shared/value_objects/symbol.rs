//! Symbol value object for futures contracts.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::OrderError;

/// An exchange-normalized contract symbol (e.g. `BTCUSDT`).
///
/// Always uppercase, 5-20 ASCII letters or digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` if the symbol is not 5-20 alphanumerics.
    pub fn parse(value: impl AsRef<str>) -> Result<Self, OrderError> {
        let normalized = value.as_ref().trim().to_uppercase();
        if symbol_pattern().is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(OrderError::validation(
                "symbol",
                format!("invalid symbol format: {:?}", value.as_ref()),
            ))
        }
    }

    /// Get the symbol string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[allow(clippy::expect_used)] // Pattern is a compile-time constant
fn symbol_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]{5,20}$").expect("symbol regex is valid"))
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = OrderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

impl std::str::FromStr for Symbol {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
