//! Enrolled template types and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference to a stored enrollment image.
///
/// The store never interprets the value; it is produced by an
/// [`ArtifactStore`](crate::storage::ArtifactStore) at enrollment and handed
/// back to it on deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    /// Creates a new artifact reference.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ArtifactRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ArtifactRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One enrolled sample: an embedding and the image it was extracted from.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateEntry {
    /// Feature vector, exactly as long as the store's dimensionality.
    pub embedding: Vec<f32>,
    /// Reference to the enrollment image.
    pub artifact: ArtifactRef,
}

impl TemplateEntry {
    /// Creates a new template entry.
    #[must_use]
    pub const fn new(embedding: Vec<f32>, artifact: ArtifactRef) -> Self {
        Self {
            embedding,
            artifact,
        }
    }
}
