//! File system watching for settle
//!
//! This crate turns a stream of change notifications into one-time
//! "settled" dispatches:
//! - Event source over `notify` with timed, non-busy waits
//! - Per-path quiescence deadlines (debouncing)
//! - Pluggable dispatch with bounded retry for busy files
//! - Ignore rules and rescans after queue overflow

pub mod debounce;
pub mod dispatch;
pub mod ignore;
pub mod reconcile;
pub mod source;

use std::path::PathBuf;

pub use debounce::{
    FileState, Scheduler, SchedulerConfig, SchedulerError, Step, SweepReport, WatchedFile,
};
pub use dispatch::{CopyDispatcher, Dispatcher};
pub use ignore::IgnoreRules;
pub use source::{EventSource, Next, NotifySource, ShutdownHandle, SourceError};

/// File system event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Path that changed
    pub path: PathBuf,
    /// Type of change
    pub kind: EventKind,
}

impl WatchEvent {
    pub fn new(kind: EventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Type of file system event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// File created (or renamed into the root)
    Created,
    /// File contents or metadata changed
    Modified,
    /// File deleted (or renamed out of the root)
    Deleted,
}
