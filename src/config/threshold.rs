//! Persisted similarity threshold.
//!
//! The threshold outlives the process as `{"value": 0.7}` next to the
//! template document, so a value set from one front-end applies to all.

use crate::storage::atomic::write_atomic;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Threshold applied when none has been configured or persisted.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Checks that a threshold can ever be met by a cosine similarity.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] unless `value` is finite and within `[-1, 1]`.
pub fn validate_threshold(value: f32) -> Result<()> {
    if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
        return Err(Error::InvalidInput(format!(
            "threshold must be within [-1, 1], got {value}"
        )));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredThreshold {
    value: f32,
}

/// Threshold persisted in a small JSON file.
#[derive(Debug, Clone)]
pub struct ThresholdSetting {
    path: PathBuf,
}

impl ThresholdSetting {
    /// Creates a setting backed by `path`. Nothing is read until [`Self::load`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted threshold, or `default` if none was ever saved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptPersistedState`] if the file exists but cannot
    /// be read, does not parse, or holds an out-of-range value.
    pub fn load(&self, default: f32) -> Result<f32> {
        let corrupt = |cause: String| Error::CorruptPersistedState {
            path: self.path.clone(),
            cause,
        };

        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(default),
            Err(e) => return Err(corrupt(e.to_string())),
        };

        let stored: StoredThreshold =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        validate_threshold(stored.value).map_err(|e| corrupt(e.to_string()))?;
        Ok(stored.value)
    }

    /// Validates and persists `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an out-of-range value, or
    /// [`Error::PersistFailed`] if the file cannot be written.
    pub fn save(&self, value: f32) -> Result<()> {
        validate_threshold(value)?;

        let bytes = serde_json::to_vec(&StoredThreshold { value }).map_err(|e| {
            Error::PersistFailed {
                operation: "serialize_threshold".to_string(),
                cause: e.to_string(),
            }
        })?;
        write_atomic(&self.path, &bytes).map_err(|e| Error::PersistFailed {
            operation: "write_threshold".to_string(),
            cause: format!("{}: {e}", self.path.display()),
        })?;

        tracing::info!(threshold = value, path = %self.path.display(), "Saved similarity threshold");
        Ok(())
    }
}
