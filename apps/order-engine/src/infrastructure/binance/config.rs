//! Binance adapter configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;

/// Binance USDⓈ-M futures environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BinanceEnvironment {
    /// Futures testnet.
    Testnet,
    /// Production.
    #[default]
    Mainnet,
}

impl BinanceEnvironment {
    /// REST base URL.
    #[must_use]
    pub const fn base_url(&self) -> &'static str {
        match self {
            Self::Testnet => "https://testnet.binancefuture.com",
            Self::Mainnet => "https://fapi.binance.com",
        }
    }

    /// Check if this trades real funds.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Mainnet)
    }
}

impl fmt::Display for BinanceEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Testnet => write!(f, "TESTNET"),
            Self::Mainnet => write!(f, "MAINNET"),
        }
    }
}

/// Configuration for the Binance gateway.
#[derive(Clone)]
pub struct BinanceConfig {
    /// API key.
    pub api_key: String,
    /// API secret.
    pub api_secret: String,
    /// Environment.
    pub environment: BinanceEnvironment,
    /// Base URL override (tests, proxies).
    pub base_url: Option<String>,
    /// `recvWindow` for signed requests, in milliseconds.
    pub recv_window_ms: u64,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Retry policy.
    pub retry: RetryPolicy,
    /// Permissions assumed for symbols whose metadata lists none.
    pub default_permissions: Vec<String>,
}

impl fmt::Debug for BinanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("recv_window_ms", &self.recv_window_ms)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl BinanceConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new(api_key: String, api_secret: String, environment: BinanceEnvironment) -> Self {
        Self {
            api_key,
            api_secret,
            environment,
            base_url: None,
            recv_window_ms: 5000,
            timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            default_permissions: vec!["TRADING".to_string()],
        }
    }

    /// Override the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Effective base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
    }
}
