//! Change events delivered to callbacks.

use std::fmt;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};

bitflags! {
    /// Operation bits carried by an [`Event`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Op: u32 {
        const CREATE = 1;
        const WRITE = 1 << 1;
        const REMOVE = 1 << 2;
        const RENAME = 1 << 3;
        const CHMOD = 1 << 4;
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }
        Ok(())
    }
}

/// A single change notification for one path.
///
/// `identity` is fixed at translation time and is what the deduplicator keys
/// on; the event loop may later reclassify `op` without touching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    path: PathBuf,
    op: Op,
    identity: String,
}

impl Event {
    /// Create an event for `path`.
    pub fn new(path: impl Into<PathBuf>, op: Op) -> Self {
        let path = path.into();
        let identity = format!("{:?}: {op}", path.display().to_string());
        Self { path, op, identity }
    }

    /// Absolute path that changed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn op(&self) -> Op {
        self.op
    }

    /// Raw identity used for repeat suppression.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_create(&self) -> bool {
        self.op.contains(Op::CREATE)
    }

    pub fn is_write(&self) -> bool {
        self.op.contains(Op::WRITE)
    }

    pub fn is_remove(&self) -> bool {
        self.op.contains(Op::REMOVE)
    }

    pub fn is_rename(&self) -> bool {
        self.op.contains(Op::RENAME)
    }

    pub fn is_chmod(&self) -> bool {
        self.op.contains(Op::CHMOD)
    }

    pub(crate) fn set_op(&mut self, op: Op) {
        self.op = op;
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity)
    }
}

/// Translate a raw notify event into one [`Event`] per affected path.
///
/// Access notifications carry no change and are dropped.
pub fn translate(raw: notify::Event) -> Vec<Event> {
    let ops: &[Op] = match raw.kind {
        EventKind::Create(_) => &[Op::CREATE],
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => &[Op::CREATE],
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => &[Op::RENAME, Op::CREATE],
        EventKind::Modify(ModifyKind::Name(_)) => &[Op::RENAME],
        EventKind::Modify(ModifyKind::Metadata(_)) => &[Op::CHMOD],
        EventKind::Modify(_) | EventKind::Any => &[Op::WRITE],
        EventKind::Remove(_) => &[Op::REMOVE],
        EventKind::Access(_) | EventKind::Other => return Vec::new(),
    };

    raw.paths
        .into_iter()
        .enumerate()
        .map(|(i, path)| {
            // Paths beyond the known slots reuse the last op.
            let op = ops[i.min(ops.len() - 1)];
            Event::new(path, op)
        })
        .collect()
}
