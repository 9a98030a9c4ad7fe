use std::path::{Component, Path};

use crate::TransferError;

/// Validates a storage sub-path before it is sent to the backend.
///
/// Rejects:
/// - Empty paths
/// - Absolute paths
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_relative_path(relative_path: &str) -> Result<(), TransferError> {
    if relative_path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    let path = Path::new(relative_path);
    if path.is_absolute() {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {relative_path}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {relative_path}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidPath(format!(
                    "absolute path not allowed: {relative_path}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

/// Validates the name a file is stored under.
///
/// The backend joins it onto the relative path, so it must be a single
/// non-empty component.
pub fn validate_filename(filename: &str) -> Result<(), TransferError> {
    if filename.trim().is_empty() {
        return Err(TransferError::InvalidFilename("empty file name".into()));
    }
    if filename.contains(['/', '\\']) || filename == "." || filename == ".." {
        return Err(TransferError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}
