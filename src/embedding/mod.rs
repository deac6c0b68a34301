//! Embedding extraction.
//!
//! The store and classifier only see fixed-length `f32` vectors. Anything
//! that turns a decoded image into one implements [`Extractor`]; the
//! built-in [`ColorHistogramExtractor`] needs no model files.

// Allow cast precision loss for pixel counts converted to frequencies.
#![allow(clippy::cast_precision_loss)]

mod histogram;
mod raster;

pub use histogram::ColorHistogramExtractor;
pub use raster::{RasterImage, decode_image};

use crate::{Error, Result};

/// Trait for image embedding extractors.
///
/// A store assumes one stable extractor for its whole lifetime: embeddings
/// from different extractors (or model versions) are not comparable, and
/// nothing detects a switch.
pub trait Extractor: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Extracts an embedding from a decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExtractionFailed`] if the image cannot be embedded.
    fn extract(&self, image: &RasterImage) -> Result<Vec<f32>>;
}

/// Scales a vector to unit L2 norm in place.
///
/// A zero vector is left unchanged.
#[allow(clippy::cast_possible_truncation)]
pub fn normalize(vector: &mut [f32]) {
    let norm = vector
        .iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x = (f64::from(*x) / norm) as f32;
        }
    }
}

/// Checks that an embedding can be stored and compared.
///
/// # Errors
///
/// Returns [`Error::InvalidEmbedding`] if the vector is empty or has a NaN or
/// infinite component.
pub fn validate_embedding(embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(Error::InvalidEmbedding("embedding is empty".to_string()));
    }
    if let Some(index) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(Error::InvalidEmbedding(format!(
            "component {index} is not finite"
        )));
    }
    Ok(())
}
