//! Logging initialization
//!
//! TigerStyle: Explicit telemetry configuration.
//!
//! Sets up a `tracing-subscriber` fmt subscriber. `RUST_LOG` wins over the
//! configured level when set.

use crate::error::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, logged once at startup
    pub service_name: String,
    /// Log level filter (used when `RUST_LOG` is unset)
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "warren".to_string(),
            log_level: "info".to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration with the given service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the log level filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Emit JSON lines
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Map a `-v` count to a log level
    pub fn level_for_verbosity(verbose: u8) -> &'static str {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Initialize the global tracing subscriber
///
/// # Errors
/// Returns `Internal` if a global subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::internal(format!("failed to initialize tracing: {}", e)))?;

    tracing::info!(
        service = %config.service_name,
        level = %config.log_level,
        "Telemetry initialized"
    );
    Ok(())
}
