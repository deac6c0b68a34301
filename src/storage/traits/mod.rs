//! Storage backend traits.

mod artifact;

pub use artifact::ArtifactStore;
