//! Filename resolution inside the sandbox root.
//!
//! Client supplied filenames are joined onto the root and normalized lexically, then
//! compared to the root component by component. Substring checks for `..` are never
//! used: normalization already folds `a/../../x`, `./..` and absolute overrides into
//! their real target.
use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use log::warn;

use super::StorageError;

/// Lexically normalize `path`: drop `.`, let `..` pop the previous component and let
/// a root component restart the path. The filesystem is not consulted.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out = PathBuf::from(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }

    out
}

/// Resolve `filename` to a path directly under `root`.
///
/// `root` must already be canonical. The result's parent is exactly `root`; anything
/// else, including subdirectories and the root itself, is a [`StorageError::PathTraversal`].
/// A symlink entry must resolve to an existing file under `root`; dangling links are
/// rejected.
pub fn resolve(root: &Path, filename: &str) -> Result<PathBuf, StorageError> {
    if filename.is_empty() {
        return Err(StorageError::MissingParameter("filename"));
    }

    let candidate = normalize(&root.join(filename));
    if !candidate.starts_with(root) || candidate.parent() != Some(root) {
        warn!("blocked path traversal attempt for filename {filename:?}");
        return Err(StorageError::PathTraversal(filename.to_string()));
    }

    let is_symlink = fs::symlink_metadata(&candidate)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    if !is_symlink {
        return Ok(candidate);
    }

    // A dangling link fails to canonicalize; writing through it would create its target.
    match candidate.canonicalize() {
        Ok(real) if real.starts_with(root) => Ok(candidate),
        real => {
            warn!("blocked symlink escape for filename {filename:?} -> {real:?}");
            Err(StorageError::PathTraversal(filename.to_string()))
        }
    }
}
