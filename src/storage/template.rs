//! Template embedding store.
//!
//! Owns the mapping from category name to its enrolled templates and keeps
//! it synchronized with one persisted document.
//!
//! # Concurrency
//!
//! Mutations (`add`, `delete_category`, `delete_entry`, `load`) are
//! serialized by a writer mutex held across the whole
//! read-modify-persist-publish sequence. Readers never take that mutex: they
//! clone an `Arc` to the current immutable [`TemplateSnapshot`], which is
//! swapped only after the new state has been durably written. A reader
//! therefore sees the state before or after a mutation, never one in
//! progress, and a slow classification never blocks enrollment.
//!
//! # Failure semantics
//!
//! Every mutation builds the next snapshot off to the side and persists it
//! before publishing. If validation or the write fails, the published
//! snapshot is untouched.

use crate::models::{ArtifactRef, TemplateEntry};
use crate::storage::atomic::write_atomic;
use crate::storage::codec;
use crate::storage::sync::{acquire_lock, acquire_read, acquire_write};
use crate::storage::traits::ArtifactStore;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

/// Immutable view of the store at one point in time.
///
/// Categories iterate in ascending name order; entries keep enrollment order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateSnapshot {
    dimensions: Option<usize>,
    categories: BTreeMap<String, Vec<TemplateEntry>>,
}

impl TemplateSnapshot {
    /// Creates an empty snapshot with no dimensionality fixed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dimensions: None,
            categories: BTreeMap::new(),
        }
    }

    pub(crate) const fn from_parts(
        dimensions: Option<usize>,
        categories: BTreeMap<String, Vec<TemplateEntry>>,
    ) -> Self {
        Self {
            dimensions,
            categories,
        }
    }

    /// The store's embedding dimensionality, once fixed.
    #[must_use]
    pub const fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    /// All categories and their entries.
    #[must_use]
    pub const fn categories(&self) -> &BTreeMap<String, Vec<TemplateEntry>> {
        &self.categories
    }

    /// Entries of one category, if present.
    #[must_use]
    pub fn get(&self, category: &str) -> Option<&[TemplateEntry]> {
        self.categories.get(category).map(Vec::as_slice)
    }

    /// Number of categories.
    #[must_use]
    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    /// Number of entries across all categories.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Returns true if no category is enrolled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Iterates over every entry with its category name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &TemplateEntry)> {
        self.categories
            .iter()
            .flat_map(|(name, entries)| entries.iter().map(move |entry| (name.as_str(), entry)))
    }
}

/// Checks a category name the way [`TemplateStore::add`] does.
///
/// # Errors
///
/// Returns [`Error::EmptyCategoryName`] if the name is blank.
pub fn validate_category_name(category: &str) -> Result<()> {
    if category.trim().is_empty() {
        return Err(Error::EmptyCategoryName);
    }
    Ok(())
}

/// Returns the dimensionality an embedding of length `actual` fixes or must match.
fn check_dimensions(fixed: Option<usize>, actual: usize) -> Result<usize> {
    match fixed {
        Some(expected) if expected != actual => Err(Error::DimensionMismatch { expected, actual }),
        Some(expected) => Ok(expected),
        None => Ok(actual),
    }
}

/// Durable, thread-safe template store.
pub struct TemplateStore {
    /// Path to the persisted document.
    path: PathBuf,
    /// Where enrollment images live.
    artifacts: Arc<dyn ArtifactStore>,
    /// Dimensionality required by configuration, if any.
    configured_dimensions: Option<usize>,
    /// Serializes mutations.
    writer: Mutex<()>,
    /// Currently published state.
    current: RwLock<Arc<TemplateSnapshot>>,
}

impl TemplateStore {
    /// Opens a store, eagerly loading any persisted state.
    ///
    /// A missing document yields an empty store. `dimensions` fixes the
    /// embedding length up front; with `None` the first stored embedding
    /// fixes it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptPersistedState`] if the document exists but is
    /// invalid, or [`Error::InvalidInput`] for a zero `dimensions`.
    pub fn open(
        path: impl Into<PathBuf>,
        artifacts: Arc<dyn ArtifactStore>,
        dimensions: Option<usize>,
    ) -> Result<Self> {
        if dimensions == Some(0) {
            return Err(Error::InvalidInput(
                "embedding dimensions must be positive".to_string(),
            ));
        }

        let store = Self {
            path: path.into(),
            artifacts,
            configured_dimensions: dimensions,
            writer: Mutex::new(()),
            current: RwLock::new(Arc::new(TemplateSnapshot::from_parts(
                dimensions,
                BTreeMap::new(),
            ))),
        };
        store.load()?;
        Ok(store)
    }

    /// Returns the persisted document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the artifact store shared with this template store.
    #[must_use]
    pub const fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    /// (Re)reads the persisted document into memory.
    ///
    /// A missing document leaves an empty store. The published snapshot is
    /// replaced only if the whole document validates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptPersistedState`] if the document cannot be
    /// read or fails validation.
    pub fn load(&self) -> Result<()> {
        let _writer = acquire_lock(&self.writer);

        let snapshot = match fs::read(&self.path) {
            Ok(bytes) => codec::decode(&bytes, self.configured_dimensions, &self.path)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No persisted templates, starting empty");
                TemplateSnapshot::from_parts(self.configured_dimensions, BTreeMap::new())
            },
            Err(e) => {
                return Err(Error::CorruptPersistedState {
                    path: self.path.clone(),
                    cause: e.to_string(),
                });
            },
        };

        tracing::info!(
            path = %self.path.display(),
            categories = snapshot.category_count(),
            entries = snapshot.entry_count(),
            dimensions = ?snapshot.dimensions(),
            "Loaded template store"
        );
        self.publish(snapshot);
        Ok(())
    }

    /// Returns the current snapshot.
    ///
    /// The snapshot is immutable and unaffected by later mutations.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TemplateSnapshot> {
        Arc::clone(&acquire_read(&self.current))
    }

    /// Returns a copy of the full category mapping.
    #[must_use]
    pub fn list_all(&self) -> BTreeMap<String, Vec<TemplateEntry>> {
        self.snapshot().categories().clone()
    }

    /// The store's embedding dimensionality, once fixed.
    #[must_use]
    pub fn dimensions(&self) -> Option<usize> {
        self.snapshot().dimensions()
    }

    /// Appends an entry to a category, creating the category if needed.
    ///
    /// The first embedding stored in a store without a dimensionality fixes
    /// it for good. Returns the category's entry count after the add.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyCategoryName`] if the name is blank
    /// - [`Error::InvalidEmbedding`] if the embedding is empty or non-finite
    /// - [`Error::DimensionMismatch`] if the length differs from the store's
    /// - [`Error::InvalidInput`] if the category already holds `artifact`
    /// - [`Error::PersistFailed`] if the document cannot be written
    pub fn add(&self, category: &str, embedding: Vec<f32>, artifact: ArtifactRef) -> Result<usize> {
        validate_category_name(category)?;
        crate::embedding::validate_embedding(&embedding)?;

        let _writer = acquire_lock(&self.writer);
        self.add_locked(category, embedding, artifact)
    }

    /// Stores an enrollment image and appends its embedding, as one mutation.
    ///
    /// The image is written while the writer lock is held, so a concurrent
    /// delete of the same category cannot remove its directory mid-save. If
    /// the add fails after the image was written, the image is removed again.
    /// Returns the category's entry count after the add.
    ///
    /// # Errors
    ///
    /// Same as [`Self::add`], plus any error of [`ArtifactStore::save`].
    pub fn add_with_image(
        &self,
        category: &str,
        embedding: Vec<f32>,
        image: &[u8],
        extension: &str,
    ) -> Result<usize> {
        validate_category_name(category)?;
        crate::embedding::validate_embedding(&embedding)?;

        let _writer = acquire_lock(&self.writer);
        // Reject a mismatched embedding before anything touches the artifact store.
        check_dimensions(self.snapshot().dimensions, embedding.len())?;

        let artifact = self.artifacts.save(category, image, extension)?;
        self.add_locked(category, embedding, artifact.clone())
            .inspect_err(|_| {
                if let Err(cleanup) = self.artifacts.remove(&artifact) {
                    metrics::counter!("dishmatch_artifact_cleanup_failures_total").increment(1);
                    tracing::warn!(%artifact, error = %cleanup, "Failed to remove image of rejected enrollment");
                }
            })
    }

    /// Appends an entry. The caller holds the writer lock.
    fn add_locked(&self, category: &str, embedding: Vec<f32>, artifact: ArtifactRef) -> Result<usize> {
        let current = self.snapshot();
        let dimensions = check_dimensions(current.dimensions, embedding.len())?;

        if current
            .get(category)
            .is_some_and(|entries| entries.iter().any(|e| e.artifact == artifact))
        {
            return Err(Error::InvalidInput(format!(
                "category '{category}' already holds artifact '{artifact}'"
            )));
        }

        let mut next = (*current).clone();
        next.dimensions = Some(dimensions);
        let entries = next.categories.entry(category.to_string()).or_default();
        entries.push(TemplateEntry::new(embedding, artifact));
        let count = entries.len();

        self.persist(&next)?;
        self.publish(next);

        metrics::counter!("dishmatch_template_add_total").increment(1);
        tracing::info!(category, entries = count, "Added template");
        Ok(count)
    }

    /// Removes a category with all its entries and their image artifacts.
    ///
    /// Returns the number of entries removed. Artifact removal happens after
    /// the new state is committed; a failure there is logged and does not
    /// undo the delete.
    ///
    /// # Errors
    ///
    /// - [`Error::CategoryNotFound`] if the category does not exist
    /// - [`Error::PersistFailed`] if the document cannot be written
    pub fn delete_category(&self, category: &str) -> Result<usize> {
        let _writer = acquire_lock(&self.writer);
        let current = self.snapshot();

        let mut next = (*current).clone();
        let removed = next
            .categories
            .remove(category)
            .ok_or_else(|| Error::CategoryNotFound(category.to_string()))?;

        self.persist(&next)?;
        self.publish(next);

        let artifacts: Vec<ArtifactRef> = removed.iter().map(|e| e.artifact.clone()).collect();
        if let Err(e) = self.artifacts.remove_category(category, &artifacts) {
            metrics::counter!("dishmatch_artifact_cleanup_failures_total").increment(1);
            tracing::warn!(category, error = %e, "Category deleted but image cleanup failed");
        }

        metrics::counter!("dishmatch_template_delete_total", "scope" => "category").increment(1);
        tracing::info!(category, entries = removed.len(), "Deleted category");
        Ok(removed.len())
    }

    /// Removes one entry, identified by its artifact reference.
    ///
    /// If this empties the category, the category is removed too. Returns
    /// the number of entries left in the category.
    ///
    /// # Errors
    ///
    /// - [`Error::CategoryNotFound`] if the category does not exist
    /// - [`Error::EntryNotFound`] if the category holds no such artifact
    /// - [`Error::PersistFailed`] if the document cannot be written
    pub fn delete_entry(&self, category: &str, artifact: &ArtifactRef) -> Result<usize> {
        let _writer = acquire_lock(&self.writer);
        let current = self.snapshot();

        let mut next = (*current).clone();
        let entries = next
            .categories
            .get_mut(category)
            .ok_or_else(|| Error::CategoryNotFound(category.to_string()))?;
        let position = entries
            .iter()
            .position(|e| &e.artifact == artifact)
            .ok_or_else(|| Error::EntryNotFound {
                category: category.to_string(),
                artifact: artifact.to_string(),
            })?;
        entries.remove(position);

        let remaining = entries.len();
        if remaining == 0 {
            next.categories.remove(category);
        }

        self.persist(&next)?;
        self.publish(next);

        let cleanup = if remaining == 0 {
            self.artifacts
                .remove_category(category, std::slice::from_ref(artifact))
        } else {
            self.artifacts.remove(artifact)
        };
        if let Err(e) = cleanup {
            metrics::counter!("dishmatch_artifact_cleanup_failures_total").increment(1);
            tracing::warn!(category, %artifact, error = %e, "Entry deleted but image cleanup failed");
        }

        metrics::counter!("dishmatch_template_delete_total", "scope" => "entry").increment(1);
        tracing::info!(category, %artifact, remaining, "Deleted template entry");
        Ok(remaining)
    }

    /// Writes a snapshot to the persisted document.
    fn persist(&self, snapshot: &TemplateSnapshot) -> Result<()> {
        let start = Instant::now();
        let bytes = codec::encode(snapshot)?;

        write_atomic(&self.path, &bytes).map_err(|e| Error::PersistFailed {
            operation: "write_templates".to_string(),
            cause: format!("{}: {e}", self.path.display()),
        })?;

        metrics::histogram!("dishmatch_persist_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        tracing::debug!(
            path = %self.path.display(),
            bytes = bytes.len(),
            "Persisted template store"
        );
        Ok(())
    }

    /// Publishes a committed snapshot to readers.
    fn publish(&self, snapshot: TemplateSnapshot) {
        *acquire_write(&self.current) = Arc::new(snapshot);
    }
}
