//! Structured logging for muxd.
//!
//! Thin wrapper over `tracing-subscriber`: pretty output for interactive use,
//! JSON lines for machine consumers. Initialize once at startup; repeated
//! calls are no-ops.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGING_INITIALIZED: OnceLock<bool> = OnceLock::new();

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-friendly output for interactive use.
    #[default]
    Pretty,
    /// JSON lines for control-mode or CI consumers.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level filter (trace, debug, info, warn, error). `RUST_LOG` wins.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging(config: &LogConfig) {
    if LOGGING_INITIALIZED.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match config.format {
        LogFormat::Pretty => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false))
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .try_init();
        }
    }

    let _ = LOGGING_INITIALIZED.set(true);
}
