//! Set of paths currently registered with the kernel watcher.
//!
//! Paths are normalized on the way in so that `a/./b/` and `a/b` are the same
//! entry, which keeps add/remove idempotent regardless of how callers spelled
//! the path.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Normalized set of observed paths.
#[derive(Debug, Default)]
pub struct PathSet {
    paths: HashSet<PathBuf>,
}

impl PathSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a path, returning `true` if it was not present.
    pub fn insert(&mut self, path: &Path) -> bool {
        self.paths.insert(normalize(path))
    }

    /// Remove a path, returning `true` if it was present.
    pub fn remove(&mut self, path: &Path) -> bool {
        self.paths.remove(&normalize(path))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(&normalize(path))
    }

    /// All tracked paths strictly below `root`.
    pub fn descendants_of(&self, root: &Path) -> Vec<PathBuf> {
        let root = normalize(root);
        self.paths
            .iter()
            .filter(|p| p.as_path() != root && p.starts_with(&root))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Remove every path, returning them.
    pub fn drain(&mut self) -> Vec<PathBuf> {
        self.paths.drain().collect()
    }
}

/// Lexically normalize a path: drop `.` components and trailing separators,
/// and rebuild it with the platform separator.
///
/// `..` is kept as-is; resolving it needs the file system.
pub fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
