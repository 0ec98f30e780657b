//! Tracing subscriber setup
//!
//! The library only emits `tracing` events; hosts that have no subscriber of
//! their own can install one here. `RUST_LOG` takes precedence over the
//! configured level.

use crate::error::GovernError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// The `logging` section of the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "pacekeeper=debug"
    pub level: String,
    /// Output format; unset lets the host pick
    pub format: Option<LogFormat>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), GovernError> {
        EnvFilter::try_new(&self.level)
            .map(|_| ())
            .map_err(|e| GovernError::Config(format!("logging.level {:?}: {e}", self.level)))
    }
}

/// Install a global `fmt` subscriber
///
/// Returns `Ok(false)` when a subscriber was already installed, which is not
/// treated as an error.
pub fn init_tracing(level: &str, format: LogFormat) -> Result<bool, GovernError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| GovernError::Config(format!("logging.level {level:?}: {e}")))?,
    };

    let installed = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    Ok(installed.is_ok())
}
