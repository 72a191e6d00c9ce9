//! Settle Core - shared primitives for the settle watcher
//!
//! This crate provides:
//! - Configuration loading and validation
//! - Output store (atomic copies with collision-safe naming)
//! - Typed action errors (retryable vs fatal)
//! - Clock abstraction for deadline arithmetic

pub mod clock;
pub mod config;
pub mod error;
pub mod store;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, DispatchConfig, IgnoreConfig, WatchConfig};
pub use error::{ActionError, ConfigError};
pub use store::OutputStore;
