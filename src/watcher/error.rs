//! Error types for the watcher system.

use std::path::PathBuf;
use thiserror::Error;

use super::CallbackId;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Path {path} does not exist or cannot be resolved")]
    PathNotFound { path: PathBuf },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Cannot stop watching path {path}: {reason}")]
    PathUnwatchFailed { path: PathBuf, reason: String },

    #[error("Callback {id} not found")]
    CallbackNotFound { id: CallbackId },

    #[error("Watcher is closed")]
    Closed,

    #[error("File system event error: {details}")]
    EventError { details: String },

    #[error("Failed to load config: {reason}")]
    ConfigError { reason: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
