//! Configuration management.

mod threshold;

pub use threshold::{DEFAULT_THRESHOLD, ThresholdSetting, validate_threshold};

use crate::embedding::ColorHistogramExtractor;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DISHMATCH_DATA_DIR";

/// Main configuration for dishmatch.
#[derive(Debug, Clone)]
pub struct DishmatchConfig {
    /// Directory holding the template document, threshold, and images.
    pub data_dir: PathBuf,
    /// Template document file name, relative to `data_dir`.
    pub store_file: PathBuf,
    /// Image artifact directory, relative to `data_dir`.
    pub artifact_dir: PathBuf,
    /// Required embedding length, if fixed up front.
    pub dimensions: Option<usize>,
    /// Threshold used until one is persisted.
    pub default_threshold: f32,
    /// Number of matches returned by default.
    pub top_k: usize,
    /// Per-channel quantization of the built-in extractor.
    pub histogram_bins: usize,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Logging settings from the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Output format: `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `info` or `dishmatch=debug`.
    pub level: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Template document file name.
    pub store_file: Option<String>,
    /// Image artifact directory.
    pub artifact_dir: Option<String>,
    /// Required embedding length.
    pub dimensions: Option<usize>,
    /// Default threshold.
    pub default_threshold: Option<f32>,
    /// Default number of matches.
    pub top_k: Option<usize>,
    /// Histogram bins per channel.
    pub histogram_bins: Option<usize>,
    /// Logging configuration.
    pub logging: Option<LoggingSettings>,
}

impl Default for DishmatchConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".dishmatch"),
            store_file: PathBuf::from("templates.json"),
            artifact_dir: PathBuf::from("templates"),
            dimensions: None,
            default_threshold: DEFAULT_THRESHOLD,
            top_k: 3,
            histogram_bins: ColorHistogramExtractor::DEFAULT_BINS,
            logging: LoggingSettings::default(),
        }
    }
}

impl DishmatchConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the file cannot be read or parsed,
    /// or holds invalid values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidInput(format!("cannot read config {}: {e}", path.display()))
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| {
            Error::InvalidInput(format!("cannot parse config {}: {e}", path.display()))
        })?;

        let config = Self::from_config_file(file);
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/dishmatch/` on macOS)
    /// 2. XDG config dir (`~/.config/dishmatch/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the first existing file cannot be
    /// read or parsed.
    pub fn load_default() -> Result<Self> {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Ok(Self::default());
        };

        Self::load_first(&[
            base_dirs.config_dir().join("dishmatch").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("dishmatch")
                .join("config.toml"),
        ])
    }

    /// Loads the first existing file of `candidates`, or the defaults.
    fn load_first(candidates: &[PathBuf]) -> Result<Self> {
        candidates
            .iter()
            .find(|candidate| candidate.exists())
            .map_or_else(|| Ok(Self::default()), |path| Self::load_from_file(path))
    }

    /// Converts a `ConfigFile` to `DishmatchConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(store_file) = file.store_file {
            config.store_file = PathBuf::from(store_file);
        }
        if let Some(artifact_dir) = file.artifact_dir {
            config.artifact_dir = PathBuf::from(artifact_dir);
        }
        if file.dimensions.is_some() {
            config.dimensions = file.dimensions;
        }
        if let Some(threshold) = file.default_threshold {
            config.default_threshold = threshold;
        }
        if let Some(top_k) = file.top_k {
            config.top_k = top_k;
        }
        if let Some(bins) = file.histogram_bins {
            config.histogram_bins = bins;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }

        config
    }

    /// Applies environment overrides (`DISHMATCH_DATA_DIR`).
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) if !dir.is_empty() => self.with_data_dir(dir),
            _ => self,
        }
    }

    /// Checks values that cannot be expressed by the types alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.default_threshold)?;
        if self.dimensions == Some(0) {
            return Err(Error::InvalidInput("dimensions must be positive".to_string()));
        }
        if self.store_file.as_os_str().is_empty() {
            return Err(Error::InvalidInput("store_file must not be empty".to_string()));
        }
        ColorHistogramExtractor::new(self.histogram_bins)?;
        Ok(())
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Path of the template document.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(&self.store_file)
    }

    /// Directory of the image artifacts.
    #[must_use]
    pub fn artifact_path(&self) -> PathBuf {
        self.data_dir.join(&self.artifact_dir)
    }

    /// Path of the persisted threshold.
    #[must_use]
    pub fn threshold_path(&self) -> PathBuf {
        self.data_dir.join("threshold.json")
    }
}
