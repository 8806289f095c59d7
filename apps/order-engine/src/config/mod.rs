//! Configuration for the order engine.
//!
//! YAML file with `${VAR}` / `${VAR:-default}` interpolation, then
//! environment overrides, then validation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use order_engine::config::load_config;
//!
//! let mut config = load_config(None)?;
//! config.apply_env_overrides()?;
//! let gateway = BinanceFuturesGateway::new(&config.exchange.binance_config())?;
//! ```

mod exchange;
mod observability;
mod strategies;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use exchange::{Credentials, ExchangeConfig, RetryConfig};
pub use observability::{LOG_FORMATS, LOG_LEVELS, LoggingConfig};
pub use strategies::{GridConfig, OcoConfig, StrategiesConfig, TwapConfig};

use crate::application::strategies::{
    GridEngineConfig, OcoEngineConfig, SupervisorConfig, TwapSchedulerConfig,
};
use crate::domain::execution_tactics::MAX_CHUNKS;
use crate::infrastructure::binance::BinanceEnvironment;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Leverage accepted by the exchange.
const LEVERAGE_RANGE: std::ops::RangeInclusive<u32> = 1..=125;

/// TWAP chunk counts accepted.
const TWAP_CHUNK_RANGE: std::ops::RangeInclusive<u32> = 1..=MAX_CHUNKS;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    Validation(String),

    /// API credentials missing.
    #[error("Missing API credentials: {0}")]
    MissingCredentials(String),
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Exchange connection.
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Strategy defaults.
    #[serde(default)]
    pub strategies: StrategiesConfig,
}

impl Config {
    /// Overlay process environment variables.
    ///
    /// `FUTURES_API_KEY`/`FUTURES_API_SECRET` win over `BINANCE_API_KEY`/
    /// `BINANCE_API_SECRET`. `TESTNET`, `LOG_LEVEL`, `LOG_FILE` and
    /// `DEFAULT_LEVERAGE` are also honored. The result is re-validated.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    /// Overlay values from an arbitrary lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("FUTURES_API_KEY").or_else(|| lookup("BINANCE_API_KEY")) {
            self.exchange.credentials.api_key = key;
        }
        if let Some(secret) = lookup("FUTURES_API_SECRET").or_else(|| lookup("BINANCE_API_SECRET"))
        {
            self.exchange.credentials.api_secret = secret;
        }
        if let Some(testnet) = lookup("TESTNET") {
            self.exchange.environment = if is_truthy(&testnet) {
                BinanceEnvironment::Testnet
            } else {
                BinanceEnvironment::Mainnet
            };
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(file) = lookup("LOG_FILE") {
            self.logging.file = Some(file.into());
        }
        if let Some(leverage) = lookup("DEFAULT_LEVERAGE") {
            self.exchange.default_leverage = leverage.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("DEFAULT_LEVERAGE must be an integer, got {leverage}"))
            })?;
        }
        validate_config(self)
    }

    /// Supervisor settings derived from this configuration.
    #[must_use]
    pub fn supervisor_config(&self) -> SupervisorConfig {
        let permissions = self.exchange.required_permissions.clone();
        SupervisorConfig {
            required_permissions: permissions.clone(),
            oco: OcoEngineConfig {
                settle_delay: self.strategies.oco.settle_delay(),
                required_permissions: permissions.clone(),
            },
            twap: TwapSchedulerConfig {
                required_permissions: permissions.clone(),
            },
            grid: GridEngineConfig {
                required_permissions: permissions,
            },
        }
    }
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file.
///
/// With no path, `config.yaml` is used if present and defaults otherwise.
/// An explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let (path, explicit) = match path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_PATH), false),
    };

    if !explicit && !path.exists() {
        let config = Config::default();
        validate_config(&config)?;
        return Ok(config);
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = if interpolated.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate `${VAR}` and `${VAR:-default}` references.
#[allow(clippy::expect_used)] // constant pattern
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let default_value = caps.get(2).map_or("", |m| m.as_str());
        match caps.get(1).map(|m| std::env::var(m.as_str())) {
            Some(Ok(value)) if !value.is_empty() => value,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let retry = &config.exchange.retry;
    if retry.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "exchange.retry.max_attempts must be at least 1".to_string(),
        ));
    }
    if retry.multiplier < 1.0 {
        return Err(ConfigError::Validation(
            "exchange.retry.multiplier must be at least 1.0".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&retry.jitter_factor) {
        return Err(ConfigError::Validation(
            "exchange.retry.jitter_factor must be between 0.0 and 1.0".to_string(),
        ));
    }

    if !LEVERAGE_RANGE.contains(&config.exchange.default_leverage) {
        return Err(ConfigError::Validation(format!(
            "exchange.default_leverage must be between {} and {}",
            LEVERAGE_RANGE.start(),
            LEVERAGE_RANGE.end()
        )));
    }

    if !TWAP_CHUNK_RANGE.contains(&config.strategies.twap.chunks) {
        return Err(ConfigError::Validation(format!(
            "strategies.twap.chunks must be between {} and {}",
            TWAP_CHUNK_RANGE.start(),
            TWAP_CHUNK_RANGE.end()
        )));
    }

    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::Validation(format!(
            "logging.level must be one of: {LOG_LEVELS:?}"
        )));
    }
    if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
        return Err(ConfigError::Validation(format!(
            "logging.format must be one of: {LOG_FORMATS:?}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution_tactics::GridMode;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn defaults() {
        let config = load_config_from_string("").unwrap();
        assert_eq!(config.exchange.environment, BinanceEnvironment::Mainnet);
        assert_eq!(config.exchange.recv_window_ms, 5000);
        assert_eq!(config.exchange.default_leverage, 10);
        assert_eq!(config.exchange.retry.max_attempts, 3);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.strategies.oco.settle_delay(), Duration::from_millis(500));
        assert_eq!(config.strategies.twap.chunks, 12);
        assert_eq!(config.strategies.grid.mode, GridMode::Both);
    }

    #[test]
    fn full_config_parse() {
        let yaml = r#"
exchange:
  environment: TESTNET
  default_leverage: 20
  retry:
    max_attempts: 5
    initial_backoff_ms: 200
logging:
  level: debug
  format: json
  file: "/tmp/order-engine.log"
strategies:
  oco:
    settle_delay_ms: 250
  twap:
    duration_minutes: 30
    chunks: 6
  grid:
    mode: LONG
"#;
        let config = load_config_from_string(yaml).unwrap();
        assert_eq!(config.exchange.environment, BinanceEnvironment::Testnet);
        assert_eq!(config.exchange.default_leverage, 20);
        assert_eq!(config.exchange.retry.max_attempts, 5);
        assert!((config.exchange.retry.multiplier - 2.0).abs() < f64::EPSILON);
        assert!(config.logging.is_json());
        assert_eq!(config.strategies.twap.duration(), Duration::from_secs(1800));
        assert_eq!(config.strategies.grid.mode, GridMode::Long);

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor.oco.settle_delay, Duration::from_millis(250));
        assert_eq!(supervisor.grid.required_permissions, vec!["TRADING".to_string()]);
    }

    #[test]
    fn env_var_with_default_when_missing() {
        let input = "level: ${ORDER_ENGINE_CONFIG_TEST_NONEXISTENT:-warn}";
        assert_eq!(interpolate_env_vars(input), "level: warn");
    }

    #[test]
    fn env_var_without_default_becomes_empty() {
        let input = "api_key: ${ORDER_ENGINE_CONFIG_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "api_key: ");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)]
    fn env_var_uses_existing_value() {
        let result = interpolate_env_vars("path: ${PATH:-default}");
        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let cases = [
            ("exchange:\n  default_leverage: 200\n", "default_leverage"),
            ("exchange:\n  retry:\n    max_attempts: 0\n", "max_attempts"),
            ("exchange:\n  retry:\n    multiplier: 0.5\n", "multiplier"),
            ("strategies:\n  twap:\n    chunks: 0\n", "chunks"),
            ("logging:\n  level: loud\n", "logging.level"),
            ("logging:\n  format: xml\n", "logging.format"),
        ];
        for (yaml, needle) in cases {
            let Err(err) = load_config_from_string(yaml) else {
                panic!("expected error for {needle}");
            };
            assert!(err.to_string().contains(needle), "{err}");
        }
    }

    #[test]
    fn futures_credentials_win_over_binance() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("BINANCE_API_KEY", "binance-key"),
            ("BINANCE_API_SECRET", "binance-secret"),
            ("FUTURES_API_KEY", "futures-key"),
            ("TESTNET", "true"),
            ("LOG_LEVEL", "DEBUG"),
            ("DEFAULT_LEVERAGE", "5"),
        ]);
        let mut config = Config::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.exchange.credentials.api_key, "futures-key");
        assert_eq!(config.exchange.credentials.api_secret, "binance-secret");
        assert_eq!(config.exchange.environment, BinanceEnvironment::Testnet);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.exchange.default_leverage, 5);
    }

    #[test]
    fn bad_leverage_override_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|name| (name == "DEFAULT_LEVERAGE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("DEFAULT_LEVERAGE"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "exchange:\n  timeout_secs: 3").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.exchange.timeout_secs, 3);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn credentials_are_not_serialized() {
        let mut config = Config::default();
        config.exchange.credentials = Credentials::new("k".repeat(64), "s".repeat(64));
        let yaml = serde_yaml_bw::to_string(&config).unwrap();
        assert!(!yaml.contains("kkkk"));
    }
}
