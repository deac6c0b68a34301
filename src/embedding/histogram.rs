//! Color histogram extractor.
//!
//! A model-free extractor: each RGB channel is quantized into `bins` levels
//! and the joint `bins³` histogram, L2-normalized, is the embedding. It is
//! deterministic and needs no model files, which makes it suitable for tests
//! and small deployments where dishes differ mostly by color. It does not
//! capture shape or texture; a learned feature model should replace it
//! wherever that matters.

use super::{Extractor, RasterImage, normalize};
use crate::{Error, Result};

/// Extractor producing normalized joint RGB histograms.
#[derive(Debug, Clone, Copy)]
pub struct ColorHistogramExtractor {
    /// Quantization levels per channel.
    bins: usize,
}

impl ColorHistogramExtractor {
    /// Default quantization levels per channel (512-dimensional embeddings).
    pub const DEFAULT_BINS: usize = 8;

    /// Largest accepted quantization (4096-dimensional embeddings).
    pub const MAX_BINS: usize = 16;

    /// Creates an extractor with `bins` levels per channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless `1 <= bins <= MAX_BINS`.
    pub fn new(bins: usize) -> Result<Self> {
        if bins == 0 || bins > Self::MAX_BINS {
            return Err(Error::InvalidInput(format!(
                "histogram bins must be between 1 and {}, got {bins}",
                Self::MAX_BINS
            )));
        }
        Ok(Self { bins })
    }

    /// Quantization levels per channel.
    #[must_use]
    pub const fn bins(&self) -> usize {
        self.bins
    }

    fn bin_of(&self, channel: u8) -> usize {
        usize::from(channel) * self.bins / 256
    }
}

impl Default for ColorHistogramExtractor {
    fn default() -> Self {
        Self {
            bins: Self::DEFAULT_BINS,
        }
    }
}

impl Extractor for ColorHistogramExtractor {
    fn dimensions(&self) -> usize {
        self.bins * self.bins * self.bins
    }

    fn extract(&self, image: &RasterImage) -> Result<Vec<f32>> {
        if image.is_empty() {
            return Err(Error::ExtractionFailed("image has no pixels".to_string()));
        }

        let mut counts = vec![0u64; self.dimensions()];
        for [r, g, b] in image.pixels() {
            let index = (self.bin_of(r) * self.bins + self.bin_of(g)) * self.bins + self.bin_of(b);
            counts[index] += 1;
        }

        let mut embedding: Vec<f32> = counts.into_iter().map(|c| c as f32).collect();
        normalize(&mut embedding);

        tracing::debug!(
            width = image.width(),
            height = image.height(),
            dimensions = embedding.len(),
            "Extracted color histogram embedding"
        );
        Ok(embedding)
    }
}
