//! The public watcher object.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, bounded};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::backend::{NotifyBackend, RawEventSender, WatchBackend};
use super::callback::{Callback, CallbackAction, CallbackFn, CallbackId};
use super::dedup::EventDeduplicator;
use super::event_loop::{Shared, spawn_dispatcher, spawn_forwarder};
use super::fs;
use super::queue::EventQueue;
use super::registry::CallbackRegistry;
use super::{Event, WatchError};
use crate::config::WatcherConfig;

/// Recursive file-system watcher with path-bound callbacks.
///
/// Construction starts two background threads (forwarding and dispatch) and
/// returns immediately. Callbacks run on their own threads, so callbacks of
/// one event run in parallel with each other and with later events.
///
/// # Example
///
/// ```no_run
/// use recwatch::watcher::{CallbackAction, Watcher};
///
/// # fn main() -> Result<(), recwatch::watcher::WatchError> {
/// let watcher = Watcher::new()?;
/// watcher.add("./config", |event: &recwatch::watcher::Event| {
///     println!("changed: {}", event.path().display());
///     CallbackAction::Continue
/// })?;
/// # Ok(())
/// # }
/// ```
pub struct Watcher {
    shared: Arc<Shared>,
    closed: AtomicBool,
    /// Dropping the sender disconnects the close channel for both loops.
    /// Registration holds the read lock, so nothing is inserted once
    /// `close` has taken it.
    close_tx: RwLock<Option<Sender<()>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Watcher {
    /// Create a watcher with default configuration.
    pub fn new() -> Result<Self, WatchError> {
        Self::with_config(WatcherConfig::default())
    }

    /// Create a watcher on the platform's native notification backend.
    pub fn with_config(config: WatcherConfig) -> Result<Self, WatchError> {
        Self::with_backend(config, NotifyBackend::new)
    }

    /// Create a watcher on a custom backend.
    ///
    /// `make_backend` receives the sender it must push raw events into.
    pub fn with_backend<B, F>(config: WatcherConfig, make_backend: F) -> Result<Self, WatchError>
    where
        B: WatchBackend + 'static,
        F: FnOnce(RawEventSender) -> Result<B, WatchError>,
    {
        let queue = EventQueue::new(config.queue_capacity, config.overflow);
        let (raw_tx, raw_rx) = bounded(config.raw_channel_capacity.max(1));
        let backend = make_backend(RawEventSender::new(raw_tx, queue.drop_counter()))?;

        let shared = Arc::new(Shared {
            registry: CallbackRegistry::new(),
            backend: Box::new(backend),
            dedup: EventDeduplicator::new(),
            queue,
            config,
        });

        let (close_tx, close_rx) = bounded::<()>(0);
        let spawn_err = |e: std::io::Error| WatchError::InitFailed {
            reason: format!("failed to spawn watcher thread: {e}"),
        };
        let forwarder =
            spawn_forwarder(Arc::clone(&shared), raw_rx, close_rx.clone()).map_err(spawn_err)?;
        let dispatcher = match spawn_dispatcher(Arc::clone(&shared), close_rx) {
            Ok(handle) => handle,
            Err(e) => {
                drop(close_tx);
                let _ = forwarder.join();
                return Err(spawn_err(e));
            }
        };

        crate::log_event!("watcher", "started");

        Ok(Self {
            shared,
            closed: AtomicBool::new(false),
            close_tx: RwLock::new(Some(close_tx)),
            threads: Mutex::new(vec![forwarder, dispatcher]),
        })
    }

    /// Watch `path` with the configured default recursion.
    pub fn add<F, R>(&self, path: impl AsRef<Path>, callback: F) -> Result<Arc<Callback>, WatchError>
    where
        F: Fn(&Event) -> R + Send + Sync + 'static,
        R: Into<CallbackAction>,
    {
        self.add_with(path, self.shared.config.recursive, callback)
    }

    /// Watch `path`; when `recursive` and `path` is a directory, changes at
    /// any depth below it reach `callback`.
    pub fn add_with<F, R>(
        &self,
        path: impl AsRef<Path>,
        recursive: bool,
        callback: F,
    ) -> Result<Arc<Callback>, WatchError>
    where
        F: Fn(&Event) -> R + Send + Sync + 'static,
        R: Into<CallbackAction>,
    {
        let registered = self.register(None, path.as_ref(), recursive, wrap(callback))?;
        // Unnamed registration always creates a callback
        registered.ok_or(WatchError::Closed)
    }

    /// Like [`add`](Self::add), but at most once per `name`.
    ///
    /// If `name` is already registered this is a no-op returning `Ok(None)`.
    /// The name is freed when its callback is removed.
    pub fn add_once<F, R>(
        &self,
        name: &str,
        path: impl AsRef<Path>,
        callback: F,
    ) -> Result<Option<Arc<Callback>>, WatchError>
    where
        F: Fn(&Event) -> R + Send + Sync + 'static,
        R: Into<CallbackAction>,
    {
        self.add_once_with(name, path, self.shared.config.recursive, callback)
    }

    pub fn add_once_with<F, R>(
        &self,
        name: &str,
        path: impl AsRef<Path>,
        recursive: bool,
        callback: F,
    ) -> Result<Option<Arc<Callback>>, WatchError>
    where
        F: Fn(&Event) -> R + Send + Sync + 'static,
        R: Into<CallbackAction>,
    {
        let name = (!name.is_empty()).then_some(name);
        self.register(name, path.as_ref(), recursive, wrap(callback))
    }

    fn register(
        &self,
        name: Option<&str>,
        path: &Path,
        recursive: bool,
        func: Arc<CallbackFn>,
    ) -> Result<Option<Arc<Callback>>, WatchError> {
        let open = self.close_tx.read();
        if open.is_none() {
            return Err(WatchError::Closed);
        }
        let path = fs::real_path(path)?;

        let Some(callback) = self
            .shared
            .registry
            .insert(name, path.clone(), recursive, func)
        else {
            crate::debug_event!("watcher", "already registered", "{}", name.unwrap_or_default());
            return Ok(None);
        };

        if recursive && fs::is_dir(&path) {
            self.shared.watch_tree(&path);
        } else {
            self.shared.watch(&path);
        }

        crate::debug_event!(
            "watcher",
            "callback added",
            "{} on {}",
            callback.id(),
            path.display()
        );
        Ok(Some(callback))
    }

    /// Remove every callback bound to `path` and the kernel watches that no
    /// longer serve anyone below it.
    ///
    /// The error of the final unwatch of `path` itself is returned, so
    /// removing a path that was never watched reports the OS error.
    pub fn remove(&self, path: impl AsRef<Path>) -> Result<(), WatchError> {
        self.ensure_open()?;
        let path = fs::absolute_path(path.as_ref())?;

        let removed = self.shared.registry.remove_path(&path);
        crate::debug_event!(
            "watcher",
            "removed",
            "{} callbacks on {}",
            removed.len(),
            path.display()
        );

        for sub in self.descendant_watches(&path) {
            if self.shared.registry.can_remove(&sub) {
                if let Err(e) = self.shared.backend.remove(&sub) {
                    tracing::debug!("[watcher] {e}");
                }
            }
        }

        if self.shared.registry.can_remove(&path) {
            self.shared.backend.remove(&path)
        } else {
            // Still covered by a parent or recursive ancestor
            Ok(())
        }
    }

    fn descendant_watches(&self, root: &Path) -> Vec<PathBuf> {
        self.shared
            .backend
            .watched()
            .into_iter()
            .filter(|p| p != root && p.starts_with(root))
            .collect()
    }

    /// Remove a single callback by id.
    ///
    /// The kernel watch is left in place and collected lazily on the next
    /// event with no remaining callbacks.
    pub fn remove_callback(&self, id: CallbackId) -> Result<(), WatchError> {
        match self.shared.registry.remove_callback(id) {
            Some(callback) => {
                crate::debug_event!(
                    "watcher",
                    "callback removed",
                    "{id} on {}",
                    callback.path().display()
                );
                Ok(())
            }
            None => Err(WatchError::CallbackNotFound { id }),
        }
    }

    /// Forward events for `path` into an async stream.
    ///
    /// The underlying callback unsubscribes itself on the first event after
    /// the stream is dropped.
    pub fn subscribe(&self, path: impl AsRef<Path>) -> Result<EventStream, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback = self.add(path, move |event: &Event| {
            if tx.send(event.clone()).is_err() {
                CallbackAction::Unsubscribe
            } else {
                CallbackAction::Continue
            }
        })?;
        Ok(EventStream {
            id: callback.id(),
            rx,
        })
    }

    /// Stop both background loops and release the native handle.
    ///
    /// Idempotent. Running callbacks are not interrupted. Registration after
    /// close fails with [`WatchError::Closed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Waits for in-flight registrations
        self.close_tx.write().take();
        let threads: Vec<_> = self.threads.lock().drain(..).collect();
        for handle in threads {
            if handle.join().is_err() {
                tracing::error!("[watcher] background thread panicked");
            }
        }

        self.shared.backend.shutdown();
        self.shared.registry.clear();
        crate::log_event!("watcher", "closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Paths currently registered with the kernel.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.shared.backend.watched()
    }

    pub fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        self.shared.backend.contains(path.as_ref())
    }

    pub fn callback_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Events lost to overflow, in the queue or the raw event channel.
    pub fn dropped_events(&self) -> u64 {
        self.shared.queue.dropped()
    }

    fn ensure_open(&self) -> Result<(), WatchError> {
        if self.is_closed() {
            Err(WatchError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("closed", &self.is_closed())
            .field("registry", &self.shared.registry)
            .finish_non_exhaustive()
    }
}

fn wrap<F, R>(callback: F) -> Arc<CallbackFn>
where
    F: Fn(&Event) -> R + Send + Sync + 'static,
    R: Into<CallbackAction>,
{
    Arc::new(move |event: &Event| -> CallbackAction { callback(event).into() })
}

/// Async view over one callback registration.
#[derive(Debug)]
pub struct EventStream {
    id: CallbackId,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    /// Next event, or `None` once the watcher is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Id of the backing callback, for [`Watcher::remove_callback`].
    pub fn id(&self) -> CallbackId {
        self.id
    }
}
