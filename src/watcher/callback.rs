//! Callback records and the voluntary unsubscribe signal.

use std::cell::Cell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::Event;

/// Unique, monotonically increasing callback identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(pub u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a callback wants to happen after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackAction {
    /// Keep the callback registered.
    #[default]
    Continue,
    /// Remove this callback from the registry.
    Unsubscribe,
}

impl From<()> for CallbackAction {
    fn from((): ()) -> Self {
        CallbackAction::Continue
    }
}

pub(crate) type CallbackFn = dyn Fn(&Event) -> CallbackAction + Send + Sync;

/// A function bound to a watched path.
pub struct Callback {
    id: CallbackId,
    name: Option<String>,
    path: PathBuf,
    recursive: bool,
    func: Arc<CallbackFn>,
}

impl Callback {
    pub(crate) fn new(
        id: CallbackId,
        name: Option<String>,
        path: PathBuf,
        recursive: bool,
        func: Arc<CallbackFn>,
    ) -> Self {
        Self {
            id,
            name,
            path,
            recursive,
            func,
        }
    }

    pub fn id(&self) -> CallbackId {
        self.id
    }

    /// Registration name given to `add_once`, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Absolute path this callback is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the callback also fires for events deeper than direct children.
    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Run the callback. The result is `Unsubscribe` if either the function
    /// returned it or called [`exit`] while running.
    pub(crate) fn invoke(&self, event: &Event) -> CallbackAction {
        EXIT_REQUESTED.with(|flag| flag.set(false));
        let action = (self.func)(event);
        let exited = EXIT_REQUESTED.with(|flag| flag.replace(false));
        if exited {
            CallbackAction::Unsubscribe
        } else {
            action
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("recursive", &self.recursive)
            .finish_non_exhaustive()
    }
}

thread_local! {
    static EXIT_REQUESTED: Cell<bool> = const { Cell::new(false) };
}

/// Unsubscribe the currently running callback once it returns.
///
/// Equivalent to returning [`CallbackAction::Unsubscribe`]. Has no effect
/// outside a callback.
pub fn exit() {
    EXIT_REQUESTED.with(|flag| flag.set(true));
}
