//! Decoded raster images.

use crate::{Error, Result};

/// An 8-bit RGB image, row-major, three bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RasterImage {
    /// Creates an image from raw RGB bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `pixels` is not `width * height * 3` long.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(3));
        if expected != Some(pixels.len()) {
            return Err(Error::InvalidInput(format!(
                "{width}x{height} RGB image needs {} bytes, got {}",
                expected.map_or_else(|| "too many".to_string(), |n| n.to_string()),
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Image width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Returns true if the image has no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Iterates over `[r, g, b]` pixels.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.pixels.chunks_exact(3).map(|p| [p[0], p[1], p[2]])
    }
}

/// Decodes an encoded image (JPEG or PNG) into RGB.
///
/// # Errors
///
/// Returns [`Error::ExtractionFailed`] if the bytes are not a supported image.
pub fn decode_image(bytes: &[u8]) -> Result<RasterImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| Error::ExtractionFailed(format!("cannot decode image: {e}")))?
        .to_rgb8();
    let (width, height) = decoded.dimensions();
    RasterImage::new(width, height, decoded.into_raw())
}
