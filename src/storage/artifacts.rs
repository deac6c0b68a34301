//! Enrollment image artifact stores.
//!
//! [`FilesystemArtifactStore`] keeps one directory per category under a base
//! path, with one file per enrolled photo:
//!
//! ```text
//! <base>/
//!   apple/
//!     template_0190a4c2f6b87d4e9f2a3c1b5d7e8f90.jpg
//!   banana/
//!     template_0190a4c3117c7a13b8f1e0d2c4a6b8d0.png
//! ```
//!
//! The artifact reference is the path relative to the base, `<category>/<file>`.
//!
//! # Security
//!
//! Category names are user supplied and become directory names, so every
//! path component is checked before touching the filesystem:
//! - **Path traversal**: `.`/`..` components, separators and NUL are rejected
//! - **Reference shape**: removal only accepts `<category>/<file>` references

use crate::models::ArtifactRef;
use crate::storage::traits::ArtifactStore;
use crate::storage::sync::acquire_lock;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Longest accepted path component, in bytes.
const MAX_COMPONENT_LEN: usize = 255;

/// Longest accepted file extension.
const MAX_EXTENSION_LEN: usize = 8;

/// Times a save recreates its category directory before giving up.
const SAVE_ATTEMPTS: u32 = 3;

/// Filesystem-backed artifact store.
pub struct FilesystemArtifactStore {
    /// Base directory holding one subdirectory per category.
    base_path: PathBuf,
}

impl FilesystemArtifactStore {
    /// Creates a new filesystem artifact store.
    ///
    /// Directories are created lazily on the first save.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Returns the base path.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolves an artifact reference to its file path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the reference is not `<category>/<file>`
    /// or either component is unsafe.
    pub fn resolve(&self, artifact: &ArtifactRef) -> Result<PathBuf> {
        let (category, file) = split_reference(artifact)?;
        Ok(self.base_path.join(category).join(file))
    }

    /// Checks if a path component is safe to join under the base path.
    fn is_safe_component(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= MAX_COMPONENT_LEN
            && name != "."
            && name != ".."
            && !name
                .chars()
                .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
    }

    fn category_dir(&self, category: &str) -> Result<PathBuf> {
        if !Self::is_safe_component(category) {
            return Err(Error::InvalidInput(format!(
                "category name cannot be used as an artifact directory: {category:?}"
            )));
        }
        Ok(self.base_path.join(category))
    }
}

impl ArtifactStore for FilesystemArtifactStore {
    fn save(&self, category: &str, bytes: &[u8], extension: &str) -> Result<ArtifactRef> {
        let dir = self.category_dir(category)?;
        let extension = sanitize_extension(extension)?;

        // v7 ids sort by creation time, so a category's files list in enrollment order
        let file = format!("template_{}.{extension}", uuid::Uuid::now_v7().simple());
        let path = dir.join(&file);

        let mut attempt = 1;
        loop {
            fs::create_dir_all(&dir).map_err(|e| Error::ArtifactFailed {
                operation: "create_category_dir".to_string(),
                cause: format!("{}: {e}", dir.display()),
            })?;

            match fs::write(&path, bytes) {
                Ok(()) => break,
                // An empty category directory can be removed by a concurrent delete.
                Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < SAVE_ATTEMPTS => {
                    tracing::debug!(path = %dir.display(), attempt, "Category directory vanished, recreating");
                    attempt += 1;
                },
                Err(e) => {
                    return Err(Error::ArtifactFailed {
                        operation: "write_artifact".to_string(),
                        cause: format!("{}: {e}", path.display()),
                    });
                },
            }
        }

        tracing::debug!(path = %path.display(), size = bytes.len(), "Saved template image");
        Ok(ArtifactRef::new(format!("{category}/{file}")))
    }

    fn remove(&self, artifact: &ArtifactRef) -> Result<()> {
        let path = self.resolve(artifact)?;

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Removed template image");
                Ok(())
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::ArtifactFailed {
                operation: "remove_artifact".to_string(),
                cause: format!("{}: {e}", path.display()),
            }),
        }
    }

    fn remove_category(&self, category: &str, artifacts: &[ArtifactRef]) -> Result<()> {
        let mut first_error = None;
        for artifact in artifacts {
            if let Err(e) = self.remove(artifact) {
                first_error.get_or_insert(e);
            }
        }

        // Only listed files are removed; a concurrent enrollment may already
        // have written a new file here, so the directory goes only if empty.
        if let Ok(dir) = self.category_dir(category) {
            match fs::remove_dir(&dir) {
                Ok(()) => tracing::debug!(path = %dir.display(), "Removed category directory"),
                Err(e) => tracing::debug!(path = %dir.display(), error = %e, "Kept category directory"),
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Splits a `<category>/<file>` reference into checked components.
fn split_reference(artifact: &ArtifactRef) -> Result<(&str, &str)> {
    let invalid = || Error::InvalidInput(format!("malformed artifact reference: {artifact}"));

    let (category, file) = artifact.as_str().split_once('/').ok_or_else(invalid)?;
    if !FilesystemArtifactStore::is_safe_component(category)
        || !FilesystemArtifactStore::is_safe_component(file)
    {
        return Err(invalid());
    }
    Ok((category, file))
}

/// Normalizes a file extension hint (`".JPG"` becomes `"jpg"`).
fn sanitize_extension(extension: &str) -> Result<String> {
    let trimmed = extension.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return Ok("bin".to_string());
    }
    if trimmed.len() > MAX_EXTENSION_LEN || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::InvalidInput(format!(
            "unsupported artifact extension: {extension:?}"
        )));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// In-memory artifact store.
///
/// Keeps image bytes in a map. Used for tests and for front-ends that keep
/// enrollment photos elsewhere.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    artifacts: Mutex<BTreeMap<ArtifactRef, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    /// Creates an empty in-memory artifact store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the artifact is currently stored.
    #[must_use]
    pub fn contains(&self, artifact: &ArtifactRef) -> bool {
        acquire_lock(&self.artifacts).contains_key(artifact)
    }

    /// Returns the number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        acquire_lock(&self.artifacts).len()
    }

    /// Returns true if no artifacts are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn save(&self, category: &str, bytes: &[u8], extension: &str) -> Result<ArtifactRef> {
        let extension = sanitize_extension(extension)?;
        let artifact = ArtifactRef::new(format!(
            "{category}/template_{}.{extension}",
            uuid::Uuid::now_v7().simple()
        ));
        acquire_lock(&self.artifacts).insert(artifact.clone(), bytes.to_vec());
        Ok(artifact)
    }

    fn remove(&self, artifact: &ArtifactRef) -> Result<()> {
        acquire_lock(&self.artifacts).remove(artifact);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_writes_under_category_dir() {
        let dir = TempDir::new().expect("tempdir");
        let store = FilesystemArtifactStore::new(dir.path());

        let artifact = store.save("apple", b"jpeg-bytes", "jpg").expect("save");
        assert!(artifact.as_str().starts_with("apple/template_"));
        assert!(artifact.as_str().ends_with(".jpg"));

        let path = store.resolve(&artifact).expect("resolve");
        assert_eq!(fs::read(&path).expect("read"), b"jpeg-bytes");
    }

    #[test]
    fn test_save_accepts_unicode_category() {
        let dir = TempDir::new().expect("tempdir");
        let store = FilesystemArtifactStore::new(dir.path());

        let artifact = store.save("宫保鸡丁", b"x", ".PNG").expect("save");
        assert!(artifact.as_str().starts_with("宫保鸡丁/"));
        assert!(artifact.as_str().ends_with(".png"));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let store = FilesystemArtifactStore::new(dir.path());

        let artifact = store.save("apple", b"x", "jpg").expect("save");
        store.remove(&artifact).expect("first remove");
        store.remove(&artifact).expect("second remove");
        assert!(!store.resolve(&artifact).expect("resolve").exists());
    }

    #[test]
    fn test_remove_category_removes_files_and_empty_dir() {
        let dir = TempDir::new().expect("tempdir");
        let store = FilesystemArtifactStore::new(dir.path());

        let a = store.save("apple", b"1", "jpg").expect("save");
        let b = store.save("apple", b"2", "jpg").expect("save");
        store.remove_category("apple", &[a, b]).expect("remove category");

        assert!(!dir.path().join("apple").exists());
    }

    #[test]
    fn test_remove_category_keeps_unlisted_files() {
        let dir = TempDir::new().expect("tempdir");
        let store = FilesystemArtifactStore::new(dir.path());

        let listed = store.save("apple", b"1", "jpg").expect("save");
        let unlisted = store.save("apple", b"2", "jpg").expect("save");
        store.remove_category("apple", &[listed]).expect("remove category");

        assert!(store.resolve(&unlisted).expect("resolve").exists());
    }

    #[test]
    fn test_path_traversal_protection() {
        let dir = TempDir::new().expect("tempdir");
        let store = FilesystemArtifactStore::new(dir.path());

        assert!(store.save("..", b"x", "jpg").is_err());
        assert!(store.save("a/b", b"x", "jpg").is_err());
        assert!(store.save("a\\b", b"x", "jpg").is_err());
        assert!(store.save("apple", b"x", "../jpg").is_err());

        assert!(store.remove(&ArtifactRef::new("../../etc/passwd")).is_err());
        assert!(store.remove(&ArtifactRef::new("no-separator")).is_err());
        assert!(store.remove(&ArtifactRef::new("apple/../x")).is_err());
    }

    #[test]
    fn test_in_memory_store_roundtrip() {
        let store = InMemoryArtifactStore::new();
        let artifact = store.save("apple", b"x", "jpg").expect("save");
        assert!(store.contains(&artifact));
        assert_eq!(store.len(), 1);

        store.remove(&artifact).expect("remove");
        assert!(store.is_empty());
    }
}
