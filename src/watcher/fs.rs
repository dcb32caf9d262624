//! File system helpers for path resolution and directory enumeration.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::WatchError;
use super::path_set::normalize;

/// Resolve `path` to an absolute, existing, canonical path.
pub fn real_path(path: &Path) -> Result<PathBuf, WatchError> {
    std::fs::canonicalize(path).map_err(|_| WatchError::PathNotFound {
        path: path.to_path_buf(),
    })
}

/// Resolve `path` to absolute form, canonical if it still exists.
///
/// Removal must work for paths that are already gone from disk.
pub fn absolute_path(path: &Path) -> Result<PathBuf, WatchError> {
    if let Ok(real) = std::fs::canonicalize(path) {
        return Ok(real);
    }
    std::path::absolute(path)
        .map(|p| normalize(&p))
        .map_err(|_| WatchError::PathNotFound {
            path: path.to_path_buf(),
        })
}

/// Parent directory of `path`, or `path` itself at the root.
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => path,
    }
}

pub fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

pub fn is_dir(path: &Path) -> bool {
    path.is_dir()
}

/// All directories below `root`, at any depth, excluding `root`.
///
/// Unreadable entries are skipped; the caller accepts partial coverage.
pub fn sub_dirs(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!("[watcher] skipping unreadable entry under {}: {e}", root.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_real_path_missing() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        assert!(matches!(
            real_path(&missing),
            Err(WatchError::PathNotFound { .. })
        ));
        // absolute_path still resolves it
        let abs = absolute_path(&missing).unwrap();
        assert!(abs.is_absolute());
        assert!(abs.ends_with("nope"));
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir(Path::new("/a/b")), Path::new("/a"));
        assert_eq!(parent_dir(Path::new("/")), Path::new("/"));
    }

    #[test]
    fn test_sub_dirs_skips_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::create_dir_all(root.join("d")).unwrap();
        fs::write(root.join("a/file.txt"), b"x").unwrap();

        let mut dirs = sub_dirs(root);
        dirs.sort();
        assert_eq!(
            dirs,
            vec![
                root.join("a"),
                root.join("a/b"),
                root.join("a/b/c"),
                root.join("d"),
            ]
        );
    }
}
