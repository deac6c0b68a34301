//! Persisted template document.
//!
//! The whole store is one JSON document, rewritten on every mutation:
//!
//! ```json
//! {
//!   "version": 1,
//!   "dimensions": 3,
//!   "categories": {
//!     "apple": [
//!       { "artifact": "apple/template_0190a4c2.jpg", "embedding": [1.0, 0.0, 0.0] }
//!     ]
//!   }
//! }
//! ```
//!
//! Embedding components are written with the shortest representation that
//! parses back to the identical `f32`, so a save/load cycle never changes a
//! similarity score.
//!
//! Decoding validates the whole document before anything is returned:
//! - `version` must be a known format version
//! - every category name is non-blank and owns at least one entry
//! - every embedding is finite and has exactly `dimensions` components
//!   (the first stored vector fixes the length when the header is absent)
//! - artifact references are unique within a category

use crate::models::{ArtifactRef, TemplateEntry};
use crate::storage::template::TemplateSnapshot;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Current document format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredDocument {
    version: u32,
    #[serde(default)]
    dimensions: Option<usize>,
    #[serde(default)]
    categories: BTreeMap<String, Vec<StoredEntry>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredEntry {
    artifact: String,
    embedding: Vec<f32>,
}

/// Encodes a snapshot into the persisted document bytes.
///
/// # Errors
///
/// Returns [`Error::PersistFailed`] if serialization fails.
pub fn encode(snapshot: &TemplateSnapshot) -> Result<Vec<u8>> {
    let document = StoredDocument {
        version: FORMAT_VERSION,
        dimensions: snapshot.dimensions(),
        categories: snapshot
            .categories()
            .iter()
            .map(|(name, entries)| {
                let stored = entries
                    .iter()
                    .map(|entry| StoredEntry {
                        artifact: entry.artifact.as_str().to_string(),
                        embedding: entry.embedding.clone(),
                    })
                    .collect();
                (name.clone(), stored)
            })
            .collect(),
    };

    serde_json::to_vec_pretty(&document).map_err(|e| Error::PersistFailed {
        operation: "serialize_templates".to_string(),
        cause: e.to_string(),
    })
}

/// Decodes and validates persisted document bytes.
///
/// `configured` is the dimensionality the caller expects, if any; a document
/// recorded with a different one is rejected. `path` is only used in errors.
///
/// # Errors
///
/// Returns [`Error::CorruptPersistedState`] if the bytes do not parse or any
/// validation rule fails.
pub fn decode(bytes: &[u8], configured: Option<usize>, path: &Path) -> Result<TemplateSnapshot> {
    let corrupt = |cause: String| Error::CorruptPersistedState {
        path: path.to_path_buf(),
        cause,
    };

    let document: StoredDocument =
        serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;

    if document.version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported format version {} (expected {FORMAT_VERSION})",
            document.version
        )));
    }

    let mut dimensions = match (document.dimensions, configured) {
        (Some(0), _) => return Err(corrupt("recorded dimensions must be positive".to_string())),
        (Some(recorded), Some(expected)) if recorded != expected => {
            return Err(corrupt(format!(
                "recorded dimensions {recorded} differ from configured {expected}"
            )));
        },
        (recorded, expected) => recorded.or(expected),
    };

    let mut categories = BTreeMap::new();
    for (name, stored) in document.categories {
        if name.trim().is_empty() {
            return Err(corrupt("blank category name".to_string()));
        }
        if stored.is_empty() {
            return Err(corrupt(format!("category '{name}' has no entries")));
        }

        let mut seen = BTreeSet::new();
        let mut entries = Vec::with_capacity(stored.len());
        for (index, entry) in stored.into_iter().enumerate() {
            let expected = *dimensions.get_or_insert(entry.embedding.len());
            if entry.embedding.len() != expected {
                return Err(corrupt(format!(
                    "'{name}' entry {index} has {} components, expected {expected}",
                    entry.embedding.len()
                )));
            }
            if expected == 0 {
                return Err(corrupt(format!("'{name}' entry {index} has no components")));
            }
            if entry.embedding.iter().any(|v| !v.is_finite()) {
                return Err(corrupt(format!(
                    "'{name}' entry {index} has non-finite components"
                )));
            }
            if !seen.insert(entry.artifact.clone()) {
                return Err(corrupt(format!(
                    "'{name}' lists artifact '{}' more than once",
                    entry.artifact
                )));
            }
            entries.push(TemplateEntry::new(
                entry.embedding,
                ArtifactRef::new(entry.artifact),
            ));
        }
        categories.insert(name, entries);
    }

    Ok(TemplateSnapshot::from_parts(dimensions, categories))
}
