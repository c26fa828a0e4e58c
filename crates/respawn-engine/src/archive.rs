//! Tar archives for build contexts and file uploads.

use std::path::Path;

use crate::error::{EngineError, Result};

/// Packs a single file into a tar archive under its base name.
///
/// # Errors
///
/// Returns an error if the path has no file name or cannot be read.
pub fn pack_file(path: &Path) -> Result<Vec<u8>> {
    let name = path.file_name().ok_or_else(|| {
        EngineError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("not a file path: {}", path.display()),
        ))
    })?;

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_path_with_name(path, name)?;
    Ok(builder.into_inner()?)
}

/// Packs the contents of a directory into a tar archive.
///
/// Entries are stored relative to `dir`.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn pack_context(dir: &Path) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(true);

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        if path.is_dir() {
            builder.append_dir_all(&name, &path)?;
        } else {
            builder.append_path_with_name(&path, &name)?;
        }
    }

    Ok(builder.into_inner()?)
}
