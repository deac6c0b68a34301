//! # Dishmatch
//!
//! Template embedding store and similarity search for dish recognition.
//!
//! Dishmatch enrolls "dish" categories from reference photos, keeps one
//! fixed-length embedding per photo, and classifies a query image by exact
//! cosine-similarity ranking against every enrolled template.
//!
//! ## Features
//!
//! - Durable template store with atomic whole-file persistence
//! - Snapshot reads that never observe a half-applied mutation
//! - Deterministic Top-K ranking with inclusive threshold semantics
//! - Pluggable embedding extractors and image artifact stores
//!
//! ## Example
//!
//! ```rust,ignore
//! use dishmatch::classify::classify;
//! use dishmatch::storage::{FilesystemArtifactStore, TemplateStore};
//!
//! let artifacts = Arc::new(FilesystemArtifactStore::new("data/templates"));
//! let store = TemplateStore::open("data/templates.json", artifacts, None)?;
//! store.add("apple", vec![1.0, 0.0, 0.0], artifact)?;
//!
//! let matches = classify(&[0.9, 0.1, 0.0], &store.snapshot(), 0.5, 3)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use thiserror::Error as ThisError;

pub mod classify;
pub mod config;
pub mod embedding;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use classify::{best_match, classify, cosine_similarity};
pub use config::{DishmatchConfig, ThresholdSetting};
pub use embedding::{ColorHistogramExtractor, Extractor, RasterImage};
pub use models::{ArtifactRef, MatchResult, Recognition, TemplateEntry};
pub use services::RecognitionService;
pub use storage::{ArtifactStore, FilesystemArtifactStore, TemplateSnapshot, TemplateStore};

/// Error type for dishmatch operations.
///
/// Every failure is reported as one of these variants. A mutating store
/// operation that returns an error leaves the in-memory mapping exactly as
/// it was before the call.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `EmptyCategoryName` | Category name is empty after trimming whitespace |
/// | `DimensionMismatch` | Embedding length differs from the store's dimensionality |
/// | `CategoryNotFound` | Deleting a category (or entry of one) that does not exist |
/// | `EntryNotFound` | Deleting an artifact reference a category does not hold |
/// | `CorruptPersistedState` | The persisted document exists but fails parsing or validation |
/// | `ExtractionFailed` | Image decoding or the embedding extractor fails |
/// | `PersistFailed` | Writing the persisted document fails |
/// | `InvalidEmbedding` | Embedding is empty or contains non-finite values |
/// | `InvalidInput` | Threshold out of range, unusable category path, bad config |
/// | `ArtifactFailed` | Image artifact I/O fails |
/// | `OperationFailed` | Process setup (logging, config discovery) fails |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Category name was empty or whitespace only.
    #[error("category name must not be empty")]
    EmptyCategoryName,

    /// Embedding length disagrees with the store's dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The store's dimensionality.
        expected: usize,
        /// Length of the rejected embedding.
        actual: usize,
    },

    /// No category with this name exists.
    #[error("category not found: {0}")]
    CategoryNotFound(String),

    /// The category exists but holds no entry with this artifact reference.
    #[error("entry '{artifact}' not found in category '{category}'")]
    EntryNotFound {
        /// The category that was searched.
        category: String,
        /// The artifact reference that was not found.
        artifact: String,
    },

    /// The persisted document exists but cannot be trusted.
    ///
    /// Raised when:
    /// - The document is not valid JSON or does not match the schema
    /// - A stored vector's length disagrees with the recorded dimensionality
    /// - A category is stored with no entries or with an empty name
    #[error("corrupt persisted state at {}: {cause}", path.display())]
    CorruptPersistedState {
        /// Path of the offending document.
        path: PathBuf,
        /// What failed validation.
        cause: String,
    },

    /// The embedding extractor (or image decoding ahead of it) failed.
    #[error("embedding extraction failed: {0}")]
    ExtractionFailed(String),

    /// The persisted document could not be written.
    #[error("persist '{operation}' failed: {cause}")]
    PersistFailed {
        /// The persistence step that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Embedding is empty or contains NaN/infinite components.
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An image artifact could not be written or removed.
    #[error("artifact '{operation}' failed: {cause}")]
    ArtifactFailed {
        /// The artifact operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// An operation outside the store failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for dishmatch operations.
pub type Result<T> = std::result::Result<T, Error>;
