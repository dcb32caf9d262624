//! Recursive file-system watching with path-bound callbacks.
//!
//! See [`watcher`] for the core and [`cache`] for file-backed caches built
//! on top of it.

pub mod cache;
pub mod config;
pub mod logging;
pub mod watcher;

pub use cache::{ContentCache, FileCache};
pub use config::{LoggingConfig, PanicPolicy, Settings, WatcherConfig};
pub use watcher::{
    Callback, CallbackAction, CallbackId, Event, EventStream, Op, OverflowPolicy, WatchError,
    Watcher, exit,
};
