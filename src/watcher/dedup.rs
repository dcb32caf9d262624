//! Repeat-event suppression.
//!
//! Some notification backends report a single logical change more than once
//! (a truncate plus a write, or two back-to-back modify notifications). The
//! deduplicator remembers each raw event identity for a very short window and
//! drops exact repeats inside it. The window is kept small on purpose so
//! genuinely separate edits are never merged.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Concurrent keyed store whose entries expire after a window.
#[derive(Debug, Default)]
pub struct EventDeduplicator {
    /// identity -> expiry
    seen: DashMap<String, Instant>,
}

impl EventDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `identity` for `window`, returning `true` if it was not already
    /// present (or its previous entry had expired).
    pub fn set_if_not_exist(&self, identity: &str, window: Duration) -> bool {
        let now = Instant::now();
        match self.seen.entry(identity.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    false
                } else {
                    entry.insert(now + window);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now + window);
                true
            }
        }
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.seen.retain(|_, expiry| *expiry > now);
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
