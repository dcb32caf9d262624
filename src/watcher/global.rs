//! Process-wide default watcher.
//!
//! Subsystems that never construct a watcher of their own share this one.
//! It is built on first use under a lock; if construction fails the error is
//! returned and the next call tries again. A closed default instance is
//! replaced on the next call.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, const_mutex};

use super::{Callback, CallbackAction, CallbackId, Event, WatchError, Watcher};
use crate::config::Settings;

static DEFAULT_WATCHER: Mutex<Option<Arc<Watcher>>> = const_mutex(None);

/// The shared default watcher, creating it if needed.
///
/// Configuration comes from [`Settings::load`], falling back to defaults.
pub fn default_watcher() -> Result<Arc<Watcher>, WatchError> {
    let mut slot = DEFAULT_WATCHER.lock();
    if let Some(watcher) = slot.as_ref() {
        if !watcher.is_closed() {
            return Ok(Arc::clone(watcher));
        }
    }

    let config = match Settings::load() {
        Ok(settings) => settings.watcher,
        Err(e) => {
            tracing::warn!("[watcher] using default config: {e}");
            Default::default()
        }
    };
    let watcher = Arc::new(Watcher::with_config(config)?);
    *slot = Some(Arc::clone(&watcher));
    Ok(watcher)
}

/// [`Watcher::add`] on the default watcher.
pub fn add<F, R>(path: impl AsRef<Path>, callback: F) -> Result<Arc<Callback>, WatchError>
where
    F: Fn(&Event) -> R + Send + Sync + 'static,
    R: Into<CallbackAction>,
{
    default_watcher()?.add(path, callback)
}

/// [`Watcher::add_once`] on the default watcher.
pub fn add_once<F, R>(
    name: &str,
    path: impl AsRef<Path>,
    callback: F,
) -> Result<Option<Arc<Callback>>, WatchError>
where
    F: Fn(&Event) -> R + Send + Sync + 'static,
    R: Into<CallbackAction>,
{
    default_watcher()?.add_once(name, path, callback)
}

/// [`Watcher::remove`] on the default watcher.
pub fn remove(path: impl AsRef<Path>) -> Result<(), WatchError> {
    default_watcher()?.remove(path)
}

/// [`Watcher::remove_callback`] on the default watcher.
pub fn remove_callback(id: CallbackId) -> Result<(), WatchError> {
    default_watcher()?.remove_callback(id)
}
