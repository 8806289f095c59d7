//! Exchange connection configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::infrastructure::binance::{BinanceConfig, BinanceEnvironment, RetryPolicy};

/// Exchange configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Testnet or mainnet.
    #[serde(default)]
    pub environment: BinanceEnvironment,
    /// Base URL override.
    #[serde(default)]
    pub base_url: Option<String>,
    /// `recvWindow` for signed requests.
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Leverage set before placing.
    #[serde(default = "default_leverage")]
    pub default_leverage: u32,
    /// Permissions a symbol must carry to be traded.
    #[serde(default = "default_required_permissions")]
    pub required_permissions: Vec<String>,
    /// Retry policy for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
    /// API credentials.
    #[serde(default)]
    pub credentials: Credentials,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            environment: BinanceEnvironment::default(),
            base_url: None,
            recv_window_ms: default_recv_window_ms(),
            timeout_secs: default_timeout_secs(),
            default_leverage: default_leverage(),
            required_permissions: default_required_permissions(),
            retry: RetryConfig::default(),
            credentials: Credentials::default(),
        }
    }
}

impl ExchangeConfig {
    /// Build the Binance gateway configuration.
    #[must_use]
    pub fn binance_config(&self) -> BinanceConfig {
        let mut config = BinanceConfig::new(
            self.credentials.api_key.clone(),
            self.credentials.api_secret.clone(),
            self.environment,
        )
        .with_retry(self.retry.policy())
        .with_timeout(Duration::from_secs(self.timeout_secs));
        config.recv_window_ms = self.recv_window_ms;
        config.default_permissions.clone_from(&self.required_permissions);
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.clone());
        }
        config
    }
}

/// Retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff growth factor.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Backoff cap in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Random jitter as a fraction of the delay.
    #[serde(default)]
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            multiplier: default_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    /// Convert to the HTTP client's retry policy.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
            jitter_factor: self.jitter_factor,
        }
    }
}

/// API key and secret.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// API key.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// API secret.
    #[serde(default, skip_serializing)]
    pub api_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    const KEY_LENGTH: usize = 64;

    /// Create credentials.
    #[must_use]
    pub const fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// Require both values to be 64 alphanumeric characters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.api_key.is_empty() {
            missing.push("BINANCE_API_KEY");
        }
        if self.api_secret.is_empty() {
            missing.push("BINANCE_API_SECRET");
        }
        if !missing.is_empty() {
            return Err(ConfigError::MissingCredentials(missing.join(", ")));
        }

        for (name, value) in [("api_key", &self.api_key), ("api_secret", &self.api_secret)] {
            if value.len() != Self::KEY_LENGTH || !value.chars().all(|c| c.is_ascii_alphanumeric())
            {
                return Err(ConfigError::Validation(format!(
                    "{name} must be {} alphanumeric characters",
                    Self::KEY_LENGTH
                )));
            }
        }
        Ok(())
    }
}

const fn default_recv_window_ms() -> u64 {
    5000
}

const fn default_timeout_secs() -> u64 {
    15
}

const fn default_leverage() -> u32 {
    10
}

fn default_required_permissions() -> Vec<String> {
    vec!["TRADING".to_string()]
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::new("k".repeat(64), "s".repeat(64));
        let debug = format!("{creds:?}");
        assert!(!debug.contains("kkkk"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn credentials_require_64_alphanumerics() {
        assert!(Credentials::new("a".repeat(64), "B1".repeat(32)).validate().is_ok());

        let err = Credentials::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentials(_)));

        let err = Credentials::new("a".repeat(63), "b".repeat(64)).validate().unwrap_err();
        assert!(err.to_string().contains("api_key"));

        let err = Credentials::new("a".repeat(64), format!("{}-", "b".repeat(63)))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("api_secret"));
    }

    #[test]
    fn binance_config_carries_overrides() {
        let config = ExchangeConfig {
            environment: BinanceEnvironment::Testnet,
            base_url: Some("http://127.0.0.1:9000".to_string()),
            recv_window_ms: 7000,
            ..ExchangeConfig::default()
        };
        let binance = config.binance_config();
        assert_eq!(binance.base_url(), "http://127.0.0.1:9000");
        assert_eq!(binance.recv_window_ms, 7000);
        assert_eq!(binance.retry.max_attempts, 3);
        assert_eq!(binance.default_permissions, vec!["TRADING".to_string()]);
    }
}
