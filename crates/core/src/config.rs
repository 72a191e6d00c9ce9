//! Configuration for the settle watcher
//!
//! Loaded from `$XDG_CONFIG_HOME/settle/config.toml` (or an explicit path).
//! A missing file yields defaults; CLI flags are layered on top by the caller.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const WINDOW_RANGE: (u64, u64) = (1, 3_600_000);
const RETRY_DELAY_RANGE: (u64, u64) = (1, 3_600_000);
const MAX_RETRIES_LIMIT: u64 = 1_000;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub ignore: IgnoreConfig,
}

/// Settle detection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Time a file must stay unmodified before it is settled (default: 1000ms)
    #[serde(default = "default_quiescence_window_ms")]
    pub quiescence_window_ms: u64,

    /// Seed the pending set from files already present at startup
    #[serde(default)]
    pub scan_existing: bool,

    /// Recreate the input root if it disappears while watching
    #[serde(default = "default_true")]
    pub recreate_root: bool,
}

/// Dispatch retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Re-arm attempts after a retryable failure (0 = wait for new events)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before a re-armed dispatch (default: 1000ms)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Ignore rule settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Read `<root>/.settleignore` (default: true)
    #[serde(default = "default_true")]
    pub use_settleignore: bool,

    /// Additional gitignore-syntax patterns
    #[serde(default)]
    pub additional_patterns: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            quiescence_window_ms: default_quiescence_window_ms(),
            scan_existing: false,
            recreate_root: true,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            use_settleignore: true,
            additional_patterns: vec![],
        }
    }
}

fn default_quiescence_window_ms() -> u64 {
    1_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_true() -> bool {
    true
}

impl WatchConfig {
    pub fn quiescence_window(&self) -> Duration {
        Duration::from_millis(self.quiescence_window_ms)
    }
}

impl DispatchConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Write configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let rendered = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(path, rendered).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every value against its valid range
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "watch.quiescence_window_ms",
            self.watch.quiescence_window_ms,
            WINDOW_RANGE,
            "1-3,600,000",
        )?;
        check_range(
            "dispatch.retry_delay_ms",
            self.dispatch.retry_delay_ms,
            RETRY_DELAY_RANGE,
            "1-3,600,000",
        )?;
        check_range(
            "dispatch.max_retries",
            u64::from(self.dispatch.max_retries),
            (0, MAX_RETRIES_LIMIT),
            "0-1,000",
        )?;
        Ok(())
    }
}

fn check_range(
    key: &'static str,
    value: u64,
    (min, max): (u64, u64),
    range: &'static str,
) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange { key, value, range });
    }
    Ok(())
}

/// Default config file location (`<config dir>/settle/config.toml`)
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("settle").join("config.toml"))
}

/// Write the default configuration if no file exists yet
///
/// Returns `true` when a file was created.
pub fn init_if_missing(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    Config::default().save(path)?;
    Ok(true)
}

/// Annotated example configuration
pub fn example_config() -> &'static str {
    r#"# settle configuration

[watch]
# Time a file must stay unmodified before it is copied (1-3,600,000 ms)
quiescence_window_ms = 1000
# Treat files already in the input directory as freshly modified at startup
scan_existing = false
# Recreate the input directory if it is removed while watching
recreate_root = true

[dispatch]
# How many times a busy file is retried before waiting for new events (0-1,000)
max_retries = 3
# Delay between retries (1-3,600,000 ms)
retry_delay_ms = 1000

[ignore]
# Honour <input>/.settleignore (gitignore syntax)
use_settleignore = true
# Extra gitignore-syntax patterns
additional_patterns = ["*.partial"]
"#
}
