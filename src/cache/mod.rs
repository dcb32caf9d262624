//! Caches that stay consistent with files on disk.
//!
//! Each cache registers a watcher callback for every file it has loaded and
//! evicts the entry when that file changes, so reads never need to stat.

mod file_cache;

pub use file_cache::{ContentCache, FileCache};
