//! Resolution of logical file paths to local files.
//!
//! Hosts with their own storage model (sandboxed directories, content URIs)
//! implement [`FileResolver`]; [`LocalFileResolver`] covers plain file systems.

use std::path::{Path, PathBuf};

use crate::transfer::TransferError;

/// Turns a logical path (and optional directory) into a local path.
pub trait FileResolver: Send + Sync {
    /// Resolves `path`, relative to `directory` when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::FileNotFound`] when the path cannot be mapped.
    fn resolve(&self, path: &str, directory: Option<&str>) -> Result<PathBuf, TransferError>;
}

/// Resolves paths against the local file system.
///
/// Absolute paths and `file://` URLs are used as given; relative paths are
/// joined to the directory option, or to the resolver's root.
#[derive(Debug, Clone)]
pub struct LocalFileResolver {
    root: PathBuf,
}

impl LocalFileResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileResolver for LocalFileResolver {
    fn resolve(&self, path: &str, directory: Option<&str>) -> Result<PathBuf, TransferError> {
        let trimmed = path.strip_prefix("file://").unwrap_or(path);
        if trimmed.is_empty() {
            return Err(TransferError::file_not_found(path));
        }
        let candidate = Path::new(trimmed);
        if candidate.is_absolute() {
            return Ok(candidate.to_path_buf());
        }
        let base = directory.map_or_else(|| self.root.clone(), |dir| self.root.join(dir));
        Ok(base.join(candidate))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_join_root_and_directory() {
        let resolver = LocalFileResolver::new("/data");
        assert_eq!(
            resolver.resolve("a.jpg", None).unwrap(),
            PathBuf::from("/data/a.jpg")
        );
        assert_eq!(
            resolver.resolve("a.jpg", Some("photos")).unwrap(),
            PathBuf::from("/data/photos/a.jpg")
        );
    }

    #[test]
    fn test_absolute_and_file_urls_are_kept() {
        let resolver = LocalFileResolver::new("/data");
        assert_eq!(
            resolver.resolve("/tmp/x.bin", Some("ignored")).unwrap(),
            PathBuf::from("/tmp/x.bin")
        );
        assert_eq!(
            resolver.resolve("file:///tmp/y.bin", None).unwrap(),
            PathBuf::from("/tmp/y.bin")
        );
    }

    #[test]
    fn test_empty_path_is_not_found() {
        let resolver = LocalFileResolver::new("/data");
        let result = resolver.resolve("", None);
        assert!(matches!(result, Err(TransferError::FileNotFound { .. })));
    }
}
