//! Dish recognition service.
//!
//! The operation surface shared by every front-end (CLI, HTTP, camera UI):
//! enroll, classify, recognize, list, delete, and the process-wide threshold.

use crate::classify;
use crate::config::validate_threshold;
use crate::embedding::{Extractor, decode_image};
use crate::models::{ArtifactRef, MatchResult, Recognition, TemplateEntry};
use crate::storage::{TemplateStore, validate_category_name};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::instrument;

/// Service for enrolling and recognizing dishes.
pub struct RecognitionService {
    /// Template store (also owns the artifact store).
    store: Arc<TemplateStore>,
    /// Embedding extractor used for both enrollment and queries.
    extractor: Arc<dyn Extractor>,
    /// Current similarity threshold, stored as `f32` bits.
    threshold: AtomicU32,
}

impl RecognitionService {
    /// Creates a new recognition service.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if `threshold` is not within `[-1, 1]`
    /// - [`Error::DimensionMismatch`] if the store already holds embeddings of
    ///   a different length than the extractor produces
    pub fn new(
        store: Arc<TemplateStore>,
        extractor: Arc<dyn Extractor>,
        threshold: f32,
    ) -> Result<Self> {
        validate_threshold(threshold)?;

        if let Some(expected) = store.dimensions() {
            if expected != extractor.dimensions() {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: extractor.dimensions(),
                });
            }
        }

        Ok(Self {
            store,
            extractor,
            threshold: AtomicU32::new(threshold.to_bits()),
        })
    }

    /// Returns the template store.
    #[must_use]
    pub const fn store(&self) -> &Arc<TemplateStore> {
        &self.store
    }

    /// Decodes an image and extracts its embedding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExtractionFailed`] if decoding or extraction fails.
    pub fn embed(&self, image: &[u8]) -> Result<Vec<f32>> {
        let raster = decode_image(image)?;
        self.extractor.extract(&raster)
    }

    /// Enrolls an image under a category and returns the category's entry count.
    ///
    /// The image is stored and the embedding added as one store mutation, so
    /// a failed enrollment leaves neither a template nor an orphaned image.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyCategoryName`] if the name is blank
    /// - [`Error::ExtractionFailed`] if the image cannot be embedded
    /// - [`Error::DimensionMismatch`] if the embedding does not fit the store
    /// - [`Error::ArtifactFailed`] / [`Error::PersistFailed`] on I/O failure
    #[instrument(skip(self, image), fields(size = image.len()))]
    pub fn enroll(&self, category: &str, image: &[u8], extension: &str) -> Result<usize> {
        validate_category_name(category)?;
        let embedding = self.embed(image)?;
        self.store.add_with_image(category, embedding, image, extension)
    }

    /// Classifies an image against the enrolled templates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExtractionFailed`] if the image cannot be embedded, or
    /// any error of [`classify::classify`].
    #[instrument(skip(self, image), fields(size = image.len()))]
    pub fn classify(&self, image: &[u8], threshold: f32, k: usize) -> Result<Vec<MatchResult>> {
        let query = self.embed(image)?;
        classify::classify(&query, &self.store.snapshot(), threshold, k)
    }

    /// Classifies an image with the current threshold.
    ///
    /// # Errors
    ///
    /// Same as [`Self::classify`].
    pub fn classify_default(&self, image: &[u8], k: usize) -> Result<Vec<MatchResult>> {
        self.classify(image, self.threshold(), k)
    }

    /// Returns the single best match for an image, or how close it came.
    ///
    /// # Errors
    ///
    /// Same as [`Self::classify`].
    #[instrument(skip(self, image), fields(size = image.len()))]
    pub fn recognize(&self, image: &[u8], threshold: f32) -> Result<Recognition> {
        let query = self.embed(image)?;
        classify::best_match(&query, &self.store.snapshot(), threshold)
    }

    /// Returns every category with its entries.
    #[must_use]
    pub fn list_categories(&self) -> BTreeMap<String, Vec<TemplateEntry>> {
        self.store.list_all()
    }

    /// Deletes a category and its images, returning how many entries it held.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CategoryNotFound`] if absent, or [`Error::PersistFailed`].
    pub fn delete_category(&self, category: &str) -> Result<usize> {
        self.store.delete_category(category)
    }

    /// Deletes one entry and its image, returning how many entries remain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CategoryNotFound`], [`Error::EntryNotFound`], or
    /// [`Error::PersistFailed`].
    pub fn delete_entry(&self, category: &str, artifact: &ArtifactRef) -> Result<usize> {
        self.store.delete_entry(category, artifact)
    }

    /// Returns the current similarity threshold.
    #[must_use]
    pub fn threshold(&self) -> f32 {
        f32::from_bits(self.threshold.load(Ordering::Acquire))
    }

    /// Sets the similarity threshold for later default classifications.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `value` is not within `[-1, 1]`.
    pub fn set_threshold(&self, value: f32) -> Result<()> {
        validate_threshold(value)?;
        self.threshold.store(value.to_bits(), Ordering::Release);
        tracing::info!(threshold = value, "Updated similarity threshold");
        Ok(())
    }
}
