//! Storage layer.
//!
//! - **Templates**: the category → embeddings mapping, one JSON document
//! - **Artifacts**: enrollment images, kept outside the document and
//!   referenced from it by [`ArtifactRef`](crate::models::ArtifactRef)

mod artifacts;
pub mod atomic;
pub mod codec;
mod sync;
mod template;
pub mod traits;

pub use artifacts::{FilesystemArtifactStore, InMemoryArtifactStore};
pub use template::{TemplateSnapshot, TemplateStore, validate_category_name};
pub use traits::ArtifactStore;
