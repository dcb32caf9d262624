//! Configuration module for the watcher.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `RECWATCH_` and use double
//! underscores to separate nested levels:
//! - `RECWATCH_WATCHER__QUEUE_CAPACITY=64` sets `watcher.queue_capacity`
//! - `RECWATCH_WATCHER__OVERFLOW=block` sets `watcher.overflow`
//! - `RECWATCH_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::watcher::OverflowPolicy;

const CONFIG_DIR: &str = ".recwatch";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "RECWATCH_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Watcher behaviour
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tuning knobs for [`Watcher`](crate::watcher::Watcher).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatcherConfig {
    /// Default recursion for `add` / `add_once`
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Window in which identical raw events are collapsed
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,

    /// How often expired dedup entries are purged
    #[serde(default = "default_dedup_purge_interval_ms")]
    pub dedup_purge_interval_ms: u64,

    /// Capacity of the queue between forwarder and dispatcher
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Capacity of the channel fed by the OS notification thread
    #[serde(default = "default_raw_channel_capacity")]
    pub raw_channel_capacity: usize,

    /// What to do when the queue is full
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// What to do when a callback panics
    #[serde(default)]
    pub on_panic: PanicPolicy,
}

/// Reaction to a panicking callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanicPolicy {
    /// Log and abort the process
    #[default]
    Abort,
    /// Log and remove the callback
    Unsubscribe,
    /// Log and keep the callback.
    ///
    /// Opt-in departure from the default: the panic is swallowed and the
    /// callback keeps receiving events, so embedders choosing this lose the
    /// guarantee that a callback panic never goes unnoticed.
    Ignore,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `recwatch::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_dedup_window_ms() -> u64 {
    10
}
fn default_dedup_purge_interval_ms() -> u64 {
    1_000
}
fn default_queue_capacity() -> usize {
    4_096
}
fn default_raw_channel_capacity() -> usize {
    1_024
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watcher: WatcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            dedup_window_ms: default_dedup_window_ms(),
            dedup_purge_interval_ms: default_dedup_purge_interval_ms(),
            queue_capacity: default_queue_capacity(),
            raw_channel_capacity: default_raw_channel_capacity(),
            overflow: OverflowPolicy::default(),
            on_panic: PanicPolicy::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl WatcherConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn dedup_purge_interval(&self) -> Duration {
        // Zero would make the ticker spin
        Duration::from_millis(self.dedup_purge_interval_ms.max(1))
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honouring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)
    }

    /// Find `.recwatch/settings.toml` from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file under `dir`
    pub fn init_config_file(
        dir: impl AsRef<Path>,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = dir.as_ref().join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}
