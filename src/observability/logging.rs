//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive for dishmatch.
pub const LOG_ENV: &str = "DISHMATCH_LOG";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, defaulting to pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Optional log file; stderr when absent.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds the logging config from file settings and the verbose flag.
    ///
    /// The filter is taken from the first of: `--verbose` (debug for this
    /// crate), `DISHMATCH_LOG`, `RUST_LOG`, the configured level, and `warn`.
    /// An unparsable directive falls back to `warn`.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let directive = if verbose {
            "dishmatch=debug,info".to_string()
        } else {
            std::env::var(LOG_ENV)
                .ok()
                .or_else(|| std::env::var(EnvFilter::DEFAULT_ENV).ok())
                .or_else(|| settings.and_then(|s| s.level.clone()))
                .unwrap_or_else(|| "warn".to_string())
        };

        Self {
            format: settings
                .and_then(|s| s.format.as_deref())
                .map(LogFormat::parse)
                .unwrap_or_default(),
            filter: parse_filter(&directive),
            file: settings.and_then(|s| s.file.clone()),
        }
    }
}

fn parse_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"))
}
