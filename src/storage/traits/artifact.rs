//! Image artifact store trait.
//!
//! Enrollment photos are kept outside the template document. The store only
//! holds the [`ArtifactRef`] returned here and hands it back on deletion.

use crate::Result;
use crate::models::ArtifactRef;

/// Trait for enrollment image storage.
///
/// Implementations should be thread-safe (`Send + Sync`) and use interior
/// mutability, so a single instance can be shared via `Arc<dyn ArtifactStore>`
/// between the template store and front-end services.
pub trait ArtifactStore: Send + Sync {
    /// Stores raw image bytes for a category and returns a reference to them.
    ///
    /// `extension` is a file-type hint such as `"jpg"` and carries no leading dot.
    ///
    /// # Errors
    ///
    /// Returns an error if the category cannot be used as a storage key or the
    /// bytes cannot be written.
    fn save(&self, category: &str, bytes: &[u8], extension: &str) -> Result<ArtifactRef>;

    /// Removes a stored artifact.
    ///
    /// Removing an artifact that no longer exists is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is malformed or removal fails.
    fn remove(&self, artifact: &ArtifactRef) -> Result<()>;

    /// Removes every listed artifact of a category, plus any per-category
    /// container the implementation keeps.
    ///
    /// # Errors
    ///
    /// Returns the first removal error; later artifacts are still attempted.
    fn remove_category(&self, _category: &str, artifacts: &[ArtifactRef]) -> Result<()> {
        let mut first_error = None;
        for artifact in artifacts {
            if let Err(e) = self.remove(artifact) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
