//! Path-keyed cache of values derived from files.
//!
//! A value is loaded on first access and kept until the watcher reports any
//! change to its file, at which point the entry is evicted and the next
//! access reloads from disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::watcher::{CallbackAction, Event, WatchError, Watcher};

/// Cache of `T` per file, invalidated by file-system events.
pub struct FileCache<T> {
    watcher: Arc<Watcher>,
    /// Registration-name prefix, so several caches can watch the same file.
    prefix: String,
    entries: Arc<DashMap<PathBuf, T>>,
}

impl<T> FileCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(watcher: Arc<Watcher>, prefix: impl Into<String>) -> Self {
        Self {
            watcher,
            prefix: prefix.into(),
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Cached value for `path`, loading it with `loader` on a miss.
    pub fn get_or_load<F>(&self, path: impl AsRef<Path>, loader: F) -> Result<T, WatchError>
    where
        F: FnOnce(&Path) -> Result<T, WatchError>,
    {
        let path = resolve(path.as_ref())?;
        if let Some(value) = self.entries.get(&path) {
            return Ok(value.clone());
        }

        // Arm first: a change racing with the load then evicts the new entry
        self.arm(&path);
        let value = loader(&path)?;
        self.entries.insert(path, value.clone());
        Ok(value)
    }

    /// Register the eviction callback once per path.
    fn arm(&self, path: &Path) {
        let name = format!("{}:{}", self.prefix, path.display());
        let entries = Arc::clone(&self.entries);
        let key = path.to_path_buf();

        let result = self
            .watcher
            .add_once_with(&name, path, false, move |event: &Event| {
                if entries.remove(&key).is_some() {
                    crate::debug_event!("cache", "evicted", "{event}");
                }
                CallbackAction::Continue
            });

        if let Err(e) = result {
            tracing::warn!("[cache] {} will not refresh: {e}", path.display());
        }
    }

    /// Evict one entry.
    pub fn invalidate(&self, path: impl AsRef<Path>) -> bool {
        match resolve(path.as_ref()) {
            Ok(path) => self.entries.remove(&path).is_some(),
            Err(_) => false,
        }
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        resolve(path.as_ref())
            .map(|p| self.entries.contains_key(&p))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> std::fmt::Debug for FileCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("prefix", &self.prefix)
            .field("entries", &self.entries.len())
            .finish()
    }
}

fn resolve(path: &Path) -> Result<PathBuf, WatchError> {
    std::fs::canonicalize(path).map_err(|source| WatchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// File contents kept fresh by the watcher.
#[derive(Debug)]
pub struct ContentCache {
    inner: FileCache<Arc<str>>,
}

impl ContentCache {
    pub fn new(watcher: Arc<Watcher>) -> Self {
        Self {
            inner: FileCache::new(watcher, "content-cache"),
        }
    }

    /// Contents of `path` as UTF-8, from cache when unchanged.
    pub fn contents(&self, path: impl AsRef<Path>) -> Result<Arc<str>, WatchError> {
        self.inner.get_or_load(path, |path| {
            std::fs::read_to_string(path)
                .map(Arc::from)
                .map_err(|source| WatchError::Io {
                    path: path.to_path_buf(),
                    source,
                })
        })
    }

    pub fn invalidate(&self, path: impl AsRef<Path>) -> bool {
        self.inner.invalidate(path)
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
