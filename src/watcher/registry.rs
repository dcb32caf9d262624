//! Path-keyed callback registry with ancestor lookup.
//!
//! Callbacks are stored per bound path in registration order, and indexed by
//! id for direct removal. Recursive watches do not bind anything to
//! sub-directories; instead [`CallbackRegistry::lookup`] walks up from the
//! event path:
//!
//! 1. callbacks bound exactly to the path,
//! 2. callbacks bound to the direct parent (regardless of recursion),
//! 3. callbacks bound to any further ancestor that were registered recursive.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::callback::{Callback, CallbackFn, CallbackId};
use super::fs::parent_dir;

#[derive(Default)]
struct Inner {
    by_path: HashMap<PathBuf, Vec<Arc<Callback>>>,
    by_id: HashMap<CallbackId, Arc<Callback>>,
    names: HashSet<String>,
}

/// Thread-safe registry of callbacks bound to absolute paths.
pub struct CallbackRegistry {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback for `path`.
    ///
    /// With a `name`, registration is once-only: if the name is already taken
    /// nothing is registered and `None` is returned. Name check and insert
    /// happen under one lock.
    pub(crate) fn insert(
        &self,
        name: Option<&str>,
        path: PathBuf,
        recursive: bool,
        func: Arc<CallbackFn>,
    ) -> Option<Arc<Callback>> {
        let mut inner = self.inner.write();
        if let Some(name) = name {
            if !inner.names.insert(name.to_string()) {
                return None;
            }
        }

        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let callback = Arc::new(Callback::new(
            id,
            name.map(str::to_string),
            path.clone(),
            recursive,
            func,
        ));
        inner
            .by_path
            .entry(path)
            .or_default()
            .push(Arc::clone(&callback));
        inner.by_id.insert(id, Arc::clone(&callback));
        Some(callback)
    }

    /// Remove every callback bound exactly to `path`.
    pub fn remove_path(&self, path: &Path) -> Vec<Arc<Callback>> {
        let mut inner = self.inner.write();
        let removed = inner.by_path.remove(path).unwrap_or_default();
        for callback in &removed {
            inner.by_id.remove(&callback.id());
            if let Some(name) = callback.name() {
                inner.names.remove(name);
            }
        }
        removed
    }

    /// Remove one callback by id, freeing its registration name.
    pub fn remove_callback(&self, id: CallbackId) -> Option<Arc<Callback>> {
        let mut inner = self.inner.write();
        let callback = inner.by_id.remove(&id)?;

        if let Some(list) = inner.by_path.get_mut(callback.path()) {
            list.retain(|c| c.id() != id);
            if list.is_empty() {
                inner.by_path.remove(callback.path());
            }
        }
        if let Some(name) = callback.name() {
            inner.names.remove(name);
        }
        Some(callback)
    }

    /// Callbacks that should receive an event for `path`.
    pub fn lookup(&self, path: &Path) -> Vec<Arc<Callback>> {
        let inner = self.inner.read();
        let mut found = Vec::new();

        if let Some(list) = inner.by_path.get(path) {
            found.extend(list.iter().cloned());
        }

        let mut dir = parent_dir(path);
        if dir == path {
            return found;
        }
        if let Some(list) = inner.by_path.get(dir) {
            found.extend(list.iter().cloned());
        }

        loop {
            let parent = parent_dir(dir);
            if parent == dir {
                break;
            }
            if let Some(list) = inner.by_path.get(parent) {
                found.extend(list.iter().filter(|c| c.is_recursive()).cloned());
            }
            dir = parent;
        }

        found
    }

    /// Whether the kernel watch on `path` is no longer needed by anyone.
    ///
    /// Mirrors [`lookup`](Self::lookup): a path stays watched while it or its
    /// parent has callbacks, or any ancestor holds a recursive one.
    pub fn can_remove(&self, path: &Path) -> bool {
        let inner = self.inner.read();
        if inner.by_path.contains_key(path) {
            return false;
        }

        let mut dir = parent_dir(path);
        if dir == path {
            return true;
        }
        if inner.by_path.contains_key(dir) {
            return false;
        }

        loop {
            let parent = parent_dir(dir);
            if parent == dir {
                return true;
            }
            if let Some(list) = inner.by_path.get(parent) {
                if list.iter().any(|c| c.is_recursive()) {
                    return false;
                }
            }
            dir = parent;
        }
    }

    pub fn get(&self, id: CallbackId) -> Option<Arc<Callback>> {
        self.inner.read().by_id.get(&id).cloned()
    }

    /// Whether any callback is bound exactly to `path`.
    pub fn contains_path(&self, path: &Path) -> bool {
        self.inner.read().by_path.contains_key(path)
    }

    pub fn is_name_taken(&self, name: &str) -> bool {
        self.inner.read().names.contains(name)
    }

    /// Total number of registered callbacks.
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_path.clear();
        inner.by_id.clear();
        inner.names.clear();
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("CallbackRegistry")
            .field("paths", &inner.by_path.len())
            .field("callbacks", &inner.by_id.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::CallbackAction;

    fn noop() -> Arc<CallbackFn> {
        Arc::new(|_| CallbackAction::Continue)
    }

    fn ids(callbacks: &[Arc<Callback>]) -> Vec<CallbackId> {
        callbacks.iter().map(|c| c.id()).collect()
    }

    #[test]
    fn test_ids_are_monotonic() {
        let registry = CallbackRegistry::new();
        let a = registry.insert(None, "/a".into(), true, noop()).unwrap();
        let b = registry.insert(None, "/a".into(), true, noop()).unwrap();
        assert!(b.id() > a.id());
        assert_eq!(registry.len(), 2);
        assert_eq!(ids(&registry.lookup(Path::new("/a"))), vec![a.id(), b.id()]);
    }

    #[test]
    fn test_named_insert_is_once_only() {
        let registry = CallbackRegistry::new();
        let first = registry.insert(Some("cfg"), "/a".into(), true, noop());
        let second = registry.insert(Some("cfg"), "/a".into(), true, noop());
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(registry.len(), 1);

        // Freed on removal
        registry.remove_callback(first.unwrap().id());
        assert!(!registry.is_name_taken("cfg"));
        assert!(registry.insert(Some("cfg"), "/a".into(), true, noop()).is_some());
    }

    #[test]
    fn test_three_tier_lookup() {
        let registry = CallbackRegistry::new();
        let exact = registry
            .insert(None, "/a/b/c.txt".into(), false, noop())
            .unwrap();
        let parent = registry.insert(None, "/a/b".into(), false, noop()).unwrap();
        let recursive = registry.insert(None, "/a".into(), true, noop()).unwrap();
        let _flat = registry.insert(None, "/".into(), false, noop()).unwrap();

        let found = ids(&registry.lookup(Path::new("/a/b/c.txt")));
        assert_eq!(found, vec![exact.id(), parent.id(), recursive.id()]);
    }

    #[test]
    fn test_non_recursive_ancestor_only_sees_children() {
        let registry = CallbackRegistry::new();
        let flat = registry.insert(None, "/a".into(), false, noop()).unwrap();

        assert_eq!(ids(&registry.lookup(Path::new("/a/x"))), vec![flat.id()]);
        assert!(registry.lookup(Path::new("/a/b/x")).is_empty());
    }

    #[test]
    fn test_lookup_at_root() {
        let registry = CallbackRegistry::new();
        let root = registry.insert(None, "/".into(), true, noop()).unwrap();
        // Root is its own parent; it must not be returned twice
        assert_eq!(ids(&registry.lookup(Path::new("/"))), vec![root.id()]);
    }

    #[test]
    fn test_remove_path_cascades() {
        let registry = CallbackRegistry::new();
        let a = registry.insert(Some("one"), "/a".into(), true, noop()).unwrap();
        registry.insert(None, "/a".into(), true, noop()).unwrap();
        let other = registry.insert(None, "/b".into(), true, noop()).unwrap();

        let removed = registry.remove_path(Path::new("/a"));
        assert_eq!(removed.len(), 2);
        assert!(registry.get(a.id()).is_none());
        assert!(!registry.is_name_taken("one"));
        assert!(registry.get(other.id()).is_some());
        assert!(registry.lookup(Path::new("/a/x")).is_empty());
    }

    #[test]
    fn test_remove_callback_keeps_siblings() {
        let registry = CallbackRegistry::new();
        let a = registry.insert(None, "/a".into(), true, noop()).unwrap();
        let b = registry.insert(None, "/a".into(), true, noop()).unwrap();

        assert!(registry.remove_callback(a.id()).is_some());
        assert!(registry.remove_callback(a.id()).is_none());
        assert_eq!(ids(&registry.lookup(Path::new("/a"))), vec![b.id()]);

        registry.remove_callback(b.id());
        assert!(!registry.contains_path(Path::new("/a")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_can_remove() {
        let registry = CallbackRegistry::new();
        registry.insert(None, "/a".into(), true, noop()).unwrap();
        registry.insert(None, "/x".into(), false, noop()).unwrap();

        assert!(!registry.can_remove(Path::new("/a")));
        assert!(!registry.can_remove(Path::new("/a/b/c")));
        assert!(!registry.can_remove(Path::new("/x/child")));
        assert!(registry.can_remove(Path::new("/x/child/deeper")));
        assert!(registry.can_remove(Path::new("/elsewhere/file")));
    }
}
