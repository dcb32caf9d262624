//! Recursive file watcher with path-bound callbacks.
//!
//! Subsystems register callbacks against files or directories; the watcher
//! keeps kernel watches in step with the directory tree and routes each
//! change to every callback that covers the changed path.
//!
//! # Architecture
//!
//! ```text
//! Watcher
//!   - CallbackRegistry (path -> callbacks, id index, names)
//!   - WatchBackend (notify, non-recursive watches + PathSet)
//!   - EventDeduplicator (repeat suppression)
//!   - EventQueue (bounded, overflow policy)
//!         |
//!   forwarder thread --> dispatcher thread --> callback threads
//! ```

mod backend;
mod callback;
mod dedup;
mod error;
mod event;
mod event_loop;
mod facade;
mod fs;
mod global;
mod path_set;
mod queue;
mod registry;

pub use backend::{NotifyBackend, RawEvent, RawEventSender, WatchBackend};
pub use callback::{Callback, CallbackAction, CallbackId, exit};
pub use dedup::EventDeduplicator;
pub use error::WatchError;
pub use event::{Event, Op, translate};
pub use facade::{EventStream, Watcher};
pub use global::{add, add_once, default_watcher, remove, remove_callback};
pub use path_set::{PathSet, normalize};
pub use queue::{EventQueue, OverflowPolicy};
pub use registry::CallbackRegistry;
