//! Layered application configuration.
//!
//! Values are merged with `figment`, later layers winning:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config PATH`, else `config.toml` in the platform
//!    config directory)
//! 3. `RUSTTHUMB_*` environment variables (e.g. `RUSTTHUMB_WORKERS=8`)
//! 4. command-line flags, passed in as [`ConfigOverrides`]

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_MEMORY_CAPACITY;
use crate::generate::text::DEFAULT_TEXT_LINES;
use crate::monitor::{DEFAULT_DEBOUNCE, DEFAULT_POLL_INTERVAL};
use crate::precache::{DEFAULT_SHUTDOWN_WAIT, DEFAULT_WORKERS};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "RUSTTHUMB_";

/// Name of the cache directory under the system temp dir.
pub const DEFAULT_CACHE_DIR_NAME: &str = "thumbnail_cache";

/// Errors loading configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A layer could not be parsed or has wrong types.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache root. Defaults to `<temp_dir>/thumbnail_cache`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Decoded thumbnails kept in memory.
    pub memory_capacity: usize,
    /// Precache worker threads.
    pub workers: usize,
    /// Thumbnail edge length used when none is given.
    pub default_size: u32,
    /// Monitor polling interval.
    pub poll_interval_ms: u64,
    /// Monitor debounce window.
    pub debounce_ms: u64,
    /// How long a cancelled precache waits for in-flight work.
    pub shutdown_wait_ms: u64,
    /// Lines shown in text thumbnails.
    pub text_lines: usize,
    /// Font for text thumbnails; system monospace fonts are tried otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_path: Option<PathBuf>,
    /// Precache dot-files too.
    pub include_hidden: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            workers: DEFAULT_WORKERS,
            default_size: 128,
            poll_interval_ms: millis(DEFAULT_POLL_INTERVAL),
            debounce_ms: millis(DEFAULT_DEBOUNCE),
            shutdown_wait_ms: millis(DEFAULT_SHUTDOWN_WAIT),
            text_lines: DEFAULT_TEXT_LINES,
            font_path: None,
            include_hidden: false,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Values supplied on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    /// `--cache-dir`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// `--workers`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

impl Config {
    /// Build the figment for `config_file` (or the default location), the
    /// environment and `overrides`.
    #[must_use]
    pub fn figment(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = config_file.map(Path::to_path_buf).or_else(default_config_path) {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides))
    }

    /// Load the effective configuration. Never fails: an invalid layer is
    /// logged and defaults (plus `overrides`) are used instead.
    #[must_use]
    pub fn load(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Self {
        match Self::figment(config_file, overrides).extract::<Config>() {
            Ok(config) => config.validated(),
            Err(e) => {
                log::warn!("Ignoring invalid configuration: {}", e);
                Figment::from(Serialized::defaults(Config::default()))
                    .merge(Serialized::defaults(overrides))
                    .extract::<Config>()
                    .unwrap_or_default()
                    .validated()
            }
        }
    }

    /// Load from exactly `path` (no environment layer), reporting errors.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the file does not parse.
    pub fn load_from_path(path: &Path, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Serialized::defaults(overrides))
            .extract()
            .map_err(Box::new)?;
        Ok(config.validated())
    }

    /// Clamp values that would stall the engine.
    #[must_use]
    pub fn validated(mut self) -> Self {
        if self.workers == 0 {
            log::warn!("workers = 0 is not usable; using 1");
            self.workers = 1;
        }
        if self.memory_capacity == 0 {
            log::warn!("memory_capacity = 0 is not usable; using 1");
            self.memory_capacity = 1;
        }
        if self.default_size == 0 {
            log::warn!("default_size = 0 is not usable; using 128");
            self.default_size = 128;
        }
        if self.text_lines == 0 {
            self.text_lines = 1;
        }
        self
    }

    /// Cache root directory.
    #[must_use]
    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME))
    }

    /// Monitor polling interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Monitor debounce window.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Bounded wait for in-flight precache work after cancellation.
    #[must_use]
    pub fn shutdown_wait(&self) -> Duration {
        Duration::from_millis(self.shutdown_wait_ms)
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Fails only if a value cannot be represented in TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// `config.toml` in the platform configuration directory.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "rustthumb", "rustthumb")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
