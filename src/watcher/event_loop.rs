//! Background loops: raw-event forwarding and dispatch.
//!
//! ```text
//! notify thread --raw--> forwarder --dedup--> EventQueue --> dispatcher
//!                                                              |
//!                                                   reclassify + lookup
//!                                                              |
//!                                                  one thread per callback
//! ```
//!
//! Both loops exit when the close channel disconnects. Callback threads are
//! never cancelled; they run to completion.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, select, tick};

use super::backend::{RawEvent, WatchBackend};
use super::callback::{Callback, CallbackAction};
use super::dedup::EventDeduplicator;
use super::event::translate;
use super::fs;
use super::queue::EventQueue;
use super::registry::CallbackRegistry;
use super::{Event, Op};
use crate::config::{PanicPolicy, WatcherConfig};

/// State shared by the facade, both loops and callback threads.
pub(crate) struct Shared {
    pub(crate) registry: CallbackRegistry,
    pub(crate) backend: Box<dyn WatchBackend>,
    pub(crate) dedup: EventDeduplicator,
    pub(crate) queue: EventQueue,
    pub(crate) config: WatcherConfig,
}

impl Shared {
    /// Add a kernel watch, logging failures.
    pub(crate) fn watch(&self, path: &Path) {
        match self.backend.add(path) {
            Ok(()) => crate::debug_event!("watcher", "watching", "{}", path.display()),
            Err(e) => tracing::warn!("[watcher] {e}"),
        }
    }

    /// Watch `dir` and every directory below it.
    pub(crate) fn watch_tree(&self, dir: &Path) {
        self.watch(dir);
        for sub in fs::sub_dirs(dir) {
            self.watch(&sub);
        }
    }

    /// Drop a kernel watch nobody needs any more.
    fn unwatch_orphan(&self, path: &Path) {
        match self.backend.remove(path) {
            Ok(()) => crate::debug_event!("watcher", "unwatched orphan", "{}", path.display()),
            Err(e) => tracing::debug!("[watcher] {e}"),
        }
    }

    /// Handle one deduplicated event.
    pub(crate) fn dispatch(self: &Arc<Self>, mut event: Event) {
        let callbacks = self.registry.lookup(event.path());
        if callbacks.is_empty() {
            self.unwatch_orphan(event.path());
            return;
        }

        self.reclassify(&mut event);

        for callback in callbacks {
            self.spawn_callback(callback, event.clone());
        }
    }

    /// Keep kernel watches in step with the tree and fix up misleading ops.
    fn reclassify(&self, event: &mut Event) {
        let path = event.path().to_path_buf();

        if event.is_remove() {
            // Editors that delete-then-recreate on save
            if fs::exists(&path) {
                self.rewatch(&path);
                crate::debug_event!("watcher", "fake remove", "{}", path.display());
                event.set_op(Op::RENAME);
            } else {
                // Kernel already dropped these watches
                self.backend.forget(&path);
            }
        } else if event.is_rename() {
            // Atomic save: renamed away and back
            if fs::exists(&path) {
                self.rewatch(&path);
                crate::debug_event!("watcher", "fake rename", "{}", path.display());
                event.set_op(Op::CHMOD);
            } else {
                self.unwatch_moved(&path);
            }
        } else if event.is_create() {
            if fs::is_dir(&path) {
                self.watch_tree(&path);
            } else {
                self.watch(&path);
            }
        }
    }

    /// Release watches on a tree that was renamed away.
    ///
    /// Their kernel watches follow the moved inodes, so they are removed
    /// through the backend rather than forgotten.
    fn unwatch_moved(&self, path: &Path) {
        let moved = self
            .backend
            .watched()
            .into_iter()
            .filter(|p| p.starts_with(path));
        for watched in moved {
            if let Err(e) = self.backend.remove(&watched) {
                tracing::debug!("[watcher] {e}");
            }
        }
    }

    fn rewatch(&self, path: &Path) {
        if let Err(e) = self.backend.rewatch(path) {
            tracing::warn!("[watcher] failed to re-add watch: {e}");
        }
    }

    fn spawn_callback(self: &Arc<Self>, callback: Arc<Callback>, event: Event) {
        let shared = Arc::clone(self);
        let id = callback.id();
        let spawned = thread::Builder::new()
            .name(format!("recwatch-cb-{id}"))
            .spawn(move || shared.run_callback(&callback, &event));

        if let Err(e) = spawned {
            tracing::error!("[watcher] failed to spawn callback {id}: {e}");
        }
    }

    fn run_callback(&self, callback: &Callback, event: &Event) {
        let outcome = catch_unwind(AssertUnwindSafe(|| callback.invoke(event)));

        match outcome {
            Ok(CallbackAction::Continue) => {}
            Ok(CallbackAction::Unsubscribe) => {
                self.registry.remove_callback(callback.id());
                crate::debug_event!(
                    "watcher",
                    "unsubscribed",
                    "callback {} on {}",
                    callback.id(),
                    callback.path().display()
                );
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    "[watcher] callback {} panicked on {event}: {message}",
                    callback.id()
                );
                match self.config.on_panic {
                    PanicPolicy::Abort => std::process::abort(),
                    PanicPolicy::Unsubscribe => {
                        self.registry.remove_callback(callback.id());
                    }
                    PanicPolicy::Ignore => {}
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Pull raw events, translate, deduplicate and enqueue them.
pub(crate) fn spawn_forwarder(
    shared: Arc<Shared>,
    raw_rx: Receiver<RawEvent>,
    close: Receiver<()>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("recwatch-forward".to_string())
        .spawn(move || {
            let window = shared.config.dedup_window();
            let purge = tick(shared.config.dedup_purge_interval());

            loop {
                select! {
                    recv(close) -> _ => break,
                    recv(raw_rx) -> msg => match msg {
                        Ok(Ok(raw)) => {
                            for event in translate(raw) {
                                if !shared.dedup.set_if_not_exist(event.identity(), window) {
                                    tracing::trace!("[watcher] repeat suppressed: {event}");
                                    continue;
                                }
                                shared.queue.push(event, &close);
                            }
                        }
                        Ok(Err(e)) => tracing::warn!("[watcher] file watch error: {e}"),
                        Err(_) => break,
                    },
                    recv(purge) -> _ => shared.dedup.purge_expired(),
                }
            }
            crate::debug_event!("watcher", "forwarder stopped");
        })
}

/// Pop queued events and dispatch them.
pub(crate) fn spawn_dispatcher(
    shared: Arc<Shared>,
    close: Receiver<()>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("recwatch-dispatch".to_string())
        .spawn(move || {
            let events = shared.queue.receiver().clone();
            loop {
                select! {
                    recv(close) -> _ => break,
                    recv(events) -> msg => match msg {
                        Ok(event) => shared.dispatch(event),
                        Err(_) => break,
                    },
                }
            }
            crate::debug_event!("watcher", "dispatcher stopped");
        })
}
