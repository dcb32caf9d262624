//! Kernel watch adapter.
//!
//! The watcher talks to the OS notification primitive only through
//! [`WatchBackend`]. Paths handed to a backend are already absolute and
//! resolved; resolution is the watcher's job.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Sender, TrySendError};
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::Mutex;

use super::WatchError;
use super::path_set::PathSet;

/// Raw result produced by the OS layer.
pub type RawEvent = notify::Result<notify::Event>;

/// Handle the backend pushes raw events into.
///
/// Sending never blocks. The OS thread answers `watch`/`unwatch` requests
/// from the dispatcher, so it must keep running even when the forwarder is
/// stalled on a full queue. Events that do not fit are counted as dropped.
#[derive(Debug, Clone)]
pub struct RawEventSender {
    tx: Sender<RawEvent>,
    dropped: Arc<AtomicU64>,
}

impl RawEventSender {
    pub(crate) fn new(tx: Sender<RawEvent>, dropped: Arc<AtomicU64>) -> Self {
        Self { tx, dropped }
    }

    /// Hand `event` to the forwarder. Returns `false` if it was dropped.
    pub fn send(&self, event: RawEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!("[watcher] raw event channel full, dropped event ({total} total)");
                false
            }
            // Forwarder gone: the watcher is shutting down
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Minimal interface over a native change-notification primitive.
pub trait WatchBackend: Send + Sync {
    /// Start observing `path`. Adding an already-observed path is a no-op.
    fn add(&self, path: &Path) -> Result<(), WatchError>;

    /// Stop observing `path`. Errors from the OS are returned, including
    /// for paths that were never added.
    fn remove(&self, path: &Path) -> Result<(), WatchError>;

    /// Whether `path` is currently observed.
    fn contains(&self, path: &Path) -> bool;

    /// Snapshot of every observed path.
    fn watched(&self) -> Vec<PathBuf>;

    /// Forget `path` and everything below it without asking the OS.
    ///
    /// For watches the kernel already dropped because the path was deleted;
    /// a later `add` of the same path must reach the OS again.
    fn forget(&self, path: &Path);

    /// Re-establish a watch the kernel may already have dropped.
    fn rewatch(&self, path: &Path) -> Result<(), WatchError> {
        let _ = self.remove(path);
        self.add(path)
    }

    /// Release the native handle. Later `add` calls fail with
    /// [`WatchError::Closed`].
    fn shutdown(&self);
}

struct Inner {
    watcher: Option<RecommendedWatcher>,
    paths: PathSet,
}

/// [`WatchBackend`] on top of `notify::RecommendedWatcher`.
///
/// Every path is watched non-recursively; recursion is handled above this
/// layer so that newly created directories can be picked up one by one.
pub struct NotifyBackend {
    inner: Mutex<Inner>,
}

impl NotifyBackend {
    /// Create the native watcher, forwarding its events into `tx`.
    pub fn new(tx: RawEventSender) -> Result<Self, WatchError> {
        let watcher = notify::recommended_watcher(move |res: RawEvent| {
            tx.send(res);
        })?;

        Ok(Self {
            inner: Mutex::new(Inner {
                watcher: Some(watcher),
                paths: PathSet::new(),
            }),
        })
    }
}

impl WatchBackend for NotifyBackend {
    fn add(&self, path: &Path) -> Result<(), WatchError> {
        let mut inner = self.inner.lock();
        let Inner { watcher, paths } = &mut *inner;
        let watcher = watcher.as_mut().ok_or(WatchError::Closed)?;
        if paths.contains(path) {
            return Ok(());
        }

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        paths.insert(path);
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), WatchError> {
        let mut inner = self.inner.lock();
        let Inner { watcher, paths } = &mut *inner;
        paths.remove(path);
        let watcher = watcher.as_mut().ok_or(WatchError::Closed)?;

        watcher
            .unwatch(path)
            .map_err(|e| WatchError::PathUnwatchFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn contains(&self, path: &Path) -> bool {
        self.inner.lock().paths.contains(path)
    }

    fn forget(&self, path: &Path) {
        let mut inner = self.inner.lock();
        for sub in inner.paths.descendants_of(path) {
            inner.paths.remove(&sub);
        }
        inner.paths.remove(path);
    }

    fn watched(&self) -> Vec<PathBuf> {
        self.inner.lock().paths.iter().map(Path::to_path_buf).collect()
    }

    fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.paths.drain();
        // Dropping the notify watcher stops its thread and closes the handle
        inner.watcher.take();
    }
}

impl std::fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("NotifyBackend")
            .field("open", &inner.watcher.is_some())
            .field("paths", &inner.paths.len())
            .finish()
    }
}
