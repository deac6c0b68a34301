//! Atomic whole-file replacement.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Replaces `path` with `contents` so readers see either the old or the new
/// file, never a truncated one.
///
/// The temporary file is created in the target's directory so the final
/// rename stays on one filesystem. Parent directories are created as needed.
///
/// # Errors
///
/// Returns the underlying I/O error from directory creation, writing,
/// syncing, or the rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
