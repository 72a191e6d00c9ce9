//! Error types shared across settle crates

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a settle action
///
/// The split matters to the scheduler: a retryable failure is absorbed
/// locally, a fatal one stops the watch.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The source is still busy (locked, growing, or gone mid-copy)
    #[error("{} is still being written: {reason}", path.display())]
    Retryable { path: PathBuf, reason: String },

    /// The destination cannot be written
    #[error("cannot write output {}: {source}", path.display())]
    Fatal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ActionError {
    pub fn retryable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Retryable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn fatal(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Fatal {
            path: path.into(),
            source,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

/// Configuration loading/validation failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{key} = {value} is out of range (valid: {range})")]
    OutOfRange {
        key: &'static str,
        value: u64,
        range: &'static str,
    },
}
