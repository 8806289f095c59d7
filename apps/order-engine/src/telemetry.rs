//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to this
//! crate and `warn` to dependencies. Output is text or JSON, to stderr or
//! appended to a file.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::LoggingConfig;

/// Errors from subscriber installation.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Filter directive did not parse.
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    /// Log file could not be opened.
    #[error("Failed to open log file '{path}': {source}")]
    LogFile {
        /// Path of the log file.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// A global subscriber is already installed.
    #[error("Failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Build the filter for a configured level.
pub fn env_filter(level: &str) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    Ok(EnvFilter::try_new(format!("warn,order_engine={level}"))?)
}

/// Install the global subscriber.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(&config.level)?;

    let (writer, ansi) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| TelemetryError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);

    let installed = if config.is_json() {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.with_ansi(ansi).try_init()
    };
    installed.map_err(|e| TelemetryError::Install(e.to_string()))
}
