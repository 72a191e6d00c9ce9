//! Per-path quiescence scheduling
//!
//! Every tracked file carries a deadline of `mtime + quiescence window`.
//! Each new Created/Modified event pushes the deadline forward; once it
//! passes without further activity the file is settled and dispatched once.
//!
//! The loop never polls on a fixed interval. It blocks on the event source
//! for exactly as long as the nearest deadline allows, or indefinitely when
//! nothing is pending.

use crate::dispatch::Dispatcher;
use crate::ignore::IgnoreRules;
use crate::reconcile;
use crate::source::{EventSource, Next, SourceError};
use crate::{EventKind, WatchEvent};
use ahash::AHashMap;
use settle_core::{ActionError, Clock, Config, SystemClock};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Time a file must stay unmodified before dispatch
    pub quiescence_window: Duration,
    /// Re-arm attempts after a retryable dispatch failure
    pub max_retries: u32,
    /// Delay before a re-armed dispatch
    pub retry_delay: Duration,
    /// Seed the pending set from the root when `run` starts
    pub scan_existing: bool,
}

impl SchedulerConfig {
    /// Settings with the given window and no retries
    pub fn new(quiescence_window: Duration) -> Self {
        Self {
            quiescence_window,
            max_retries: 0,
            retry_delay: quiescence_window,
            scan_existing: false,
        }
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            quiescence_window: config.watch.quiescence_window(),
            max_retries: config.dispatch.max_retries,
            retry_delay: config.dispatch.retry_delay(),
            scan_existing: config.watch.scan_existing,
        }
    }
}

/// Lifecycle of a tracked file
///
/// Settled files are removed from the scheduler rather than marked done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Waiting for its deadline
    Pending,
    /// Deadline reached, action in flight
    Dispatching,
}

/// A file being tracked towards settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedFile {
    /// No dispatch before this instant
    pub deadline: SystemTime,
    pub state: FileState,
    /// Retryable failures in the current settle episode
    pub attempts: u32,
}

/// Scheduler loop failures
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("dispatch failed fatally: {0}")]
    Action(#[source] ActionError),
}

/// Outcome of one sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Settled and dispatched successfully
    pub dispatched: Vec<PathBuf>,
    /// Busy, scheduled for another attempt
    pub rearmed: Vec<PathBuf>,
    /// Busy with no attempts left; waits for the next change
    pub dropped: Vec<PathBuf>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.dispatched.is_empty() && self.rearmed.is_empty() && self.dropped.is_empty()
    }
}

/// Whether the loop should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Closed,
}

/// Quiescence scheduler
///
/// Owns the pending set outright; a single loop drives it, so no locking.
pub struct Scheduler<C: Clock = SystemClock> {
    config: SchedulerConfig,
    clock: C,
    /// Tracked files keyed by absolute path
    pending: AHashMap<PathBuf, WatchedFile>,
    ignore: Option<IgnoreRules>,
    /// Start of the window an overflow rescan must cover
    rescan_since: SystemTime,
}

impl Scheduler<SystemClock> {
    /// Scheduler on the system clock
    pub fn with_system_clock(config: SchedulerConfig) -> Self {
        Self::new(config, SystemClock)
    }
}

impl<C: Clock> Scheduler<C> {
    pub fn new(config: SchedulerConfig, clock: C) -> Self {
        let rescan_since = clock.now();
        Self {
            config,
            clock,
            pending: AHashMap::new(),
            ignore: None,
            rescan_since,
        }
    }

    /// Filter events through ignore rules
    pub fn with_ignore(mut self, rules: IgnoreRules) -> Self {
        self.ignore = Some(rules);
        self
    }

    /// Number of tracked files
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&WatchedFile> {
        self.pending.get(path)
    }

    /// Apply one event to the pending set
    pub fn ingest(&mut self, event: WatchEvent) {
        let WatchEvent { path, kind } = event;

        if let Some(rules) = self.ignore.as_mut() {
            if rules.is_rules_file(&path) {
                match rules.reload() {
                    Ok(()) => info!(sources = rules.active_sources(), "Reloaded ignore rules"),
                    Err(e) => warn!("Failed to reload ignore rules: {}", e),
                }
                return;
            }
        }

        match kind {
            EventKind::Deleted => {
                if self.pending.remove(&path).is_some() {
                    debug!(path = %path.display(), "Stopped tracking deleted file");
                }
            }
            EventKind::Created | EventKind::Modified => {
                if self.ignore.as_ref().is_some_and(|rules| rules.should_ignore(&path)) {
                    debug!(path = %path.display(), "Ignoring file");
                    return;
                }
                self.track(path);
            }
        }
    }

    /// (Re)start the debounce window from the file's current mtime
    fn track(&mut self, path: PathBuf) {
        // The event may be stale or batched, so ask the file system
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.file_type().is_symlink() => fs::metadata(&path),
            other => other,
        };
        let mtime = match metadata {
            // Directories, FIFOs, sockets and devices are never copied
            Ok(metadata) if !metadata.is_file() => {
                debug!(path = %path.display(), "Skipping non-regular file");
                return;
            }
            Ok(metadata) => metadata.modified(),
            Err(e) => Err(e),
        };

        let mtime = match mtime {
            Ok(mtime) => mtime,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    "Cannot read modification time, keeping previous deadline: {}", e
                );
                return;
            }
        };

        let deadline = mtime + self.config.quiescence_window;
        debug!(path = %path.display(), ?deadline, "Tracking file");
        self.pending.insert(
            path,
            WatchedFile {
                deadline,
                state: FileState::Pending,
                attempts: 0,
            },
        );
    }

    /// Earliest deadline among pending files
    pub fn next_deadline(&self) -> Option<SystemTime> {
        self.pending
            .values()
            .filter(|f| f.state == FileState::Pending)
            .map(|f| f.deadline)
            .min()
    }

    /// How long the loop may block; `None` means indefinitely
    pub fn next_timeout(&self) -> Option<Duration> {
        let deadline = self.next_deadline()?;
        Some(
            deadline
                .duration_since(self.clock.now())
                .unwrap_or(Duration::ZERO),
        )
    }

    /// Dispatch every file whose deadline has passed
    ///
    /// Expired paths are collected before anything is dispatched or removed.
    /// A fatal action error aborts the sweep and is returned.
    pub fn sweep<D>(&mut self, dispatcher: &mut D) -> Result<SweepReport, SchedulerError>
    where
        D: Dispatcher + ?Sized,
    {
        let now = self.clock.now();
        self.rescan_since = now;

        let mut expired: Vec<(SystemTime, PathBuf)> = self
            .pending
            .iter()
            .filter(|(_, f)| f.state == FileState::Pending && f.deadline <= now)
            .map(|(path, f)| (f.deadline, path.clone()))
            .collect();
        expired.sort();

        let mut report = SweepReport::default();
        for (_, path) in expired {
            match self.pending.get_mut(&path) {
                Some(entry) => entry.state = FileState::Dispatching,
                None => continue,
            }

            match dispatcher.dispatch(&path) {
                Ok(()) => {
                    self.pending.remove(&path);
                    debug!(path = %path.display(), "Settled");
                    report.dispatched.push(path);
                }
                Err(err @ ActionError::Retryable { .. }) => {
                    self.retry_or_drop(path, now, &err, &mut report);
                }
                Err(err) => {
                    self.pending.remove(&path);
                    error!(path = %path.display(), "Fatal dispatch failure: {}", err);
                    return Err(SchedulerError::Action(err));
                }
            }
        }

        Ok(report)
    }

    fn retry_or_drop(
        &mut self,
        path: PathBuf,
        now: SystemTime,
        err: &ActionError,
        report: &mut SweepReport,
    ) {
        // Deleted while in flight: nothing left to retry
        let Some(entry) = self.pending.get_mut(&path) else {
            return;
        };

        if entry.attempts < self.config.max_retries {
            entry.attempts += 1;
            entry.deadline = now + self.config.retry_delay;
            entry.state = FileState::Pending;
            warn!(
                path = %path.display(),
                attempt = entry.attempts,
                max = self.config.max_retries,
                "{}; retrying", err
            );
            report.rearmed.push(path);
        } else {
            self.pending.remove(&path);
            warn!(path = %path.display(), "{}; waiting for next change", err);
            report.dropped.push(path);
        }
    }

    /// Treat files under `root` as modified
    ///
    /// With `since`, only files modified at or after it are picked up.
    /// Returns the number of files fed to the scheduler.
    pub fn rescan(&mut self, root: &Path, since: Option<SystemTime>) -> usize {
        match reconcile::scan_root(root, since) {
            Ok(paths) => {
                let found = paths.len();
                for path in paths {
                    self.ingest(WatchEvent::new(EventKind::Modified, path));
                }
                info!(root = %root.display(), found, "Rescanned watched directory");
                found
            }
            Err(e) => {
                warn!(root = %root.display(), "Rescan failed: {}", e);
                0
            }
        }
    }

    /// Apply one source result
    pub fn apply(&mut self, root: &Path, next: Next) -> Step {
        match next {
            Next::Event(event) => self.ingest(event),
            Next::Overflow => {
                // File system mtimes can trail the clock; overlap by one window
                let since = self
                    .rescan_since
                    .checked_sub(self.config.quiescence_window)
                    .unwrap_or(self.rescan_since);
                self.rescan(root, Some(since));
            }
            Next::Timeout => {}
            Next::Closed => return Step::Closed,
        }
        Step::Continue
    }

    /// Run until the source closes
    pub fn run<S, D>(&mut self, source: &mut S, dispatcher: &mut D) -> Result<(), SchedulerError>
    where
        S: EventSource + ?Sized,
        D: Dispatcher + ?Sized,
    {
        info!(
            root = %source.root().display(),
            window_ms = self.config.quiescence_window.as_millis() as u64,
            max_retries = self.config.max_retries,
            "Scheduler started"
        );

        if self.config.scan_existing {
            let root = source.root().to_path_buf();
            self.rescan(&root, None);
        }

        while self.run_once(source, dispatcher)? == Step::Continue {}

        info!("Event source closed, scheduler stopped");
        Ok(())
    }

    /// One iteration: wait, drain, sweep
    pub fn run_once<S, D>(&mut self, source: &mut S, dispatcher: &mut D) -> Result<Step, SchedulerError>
    where
        S: EventSource + ?Sized,
        D: Dispatcher + ?Sized,
    {
        let timeout = self.next_timeout();
        debug!(?timeout, pending = self.pending.len(), "Waiting for events");

        let first = self.poll(source, timeout)?;
        if self.apply(source.root(), first) == Step::Closed {
            return Ok(Step::Closed);
        }

        // Apply the queued burst before sweeping; later arrivals wait a turn
        let mut remaining = source.available();
        while remaining != Some(0) {
            let next = self.poll(source, Some(Duration::ZERO))?;
            if next == Next::Timeout {
                break;
            }
            if self.apply(source.root(), next) == Step::Closed {
                return Ok(Step::Closed);
            }
            remaining = remaining.map(|n| n - 1);
        }

        let report = self.sweep(dispatcher)?;
        if !report.is_empty() {
            debug!(
                dispatched = report.dispatched.len(),
                rearmed = report.rearmed.len(),
                dropped = report.dropped.len(),
                "Sweep complete"
            );
        }

        Ok(Step::Continue)
    }

    /// Wait on the source, recovering an invalidated watch in place
    fn poll<S>(&mut self, source: &mut S, timeout: Option<Duration>) -> Result<Next, SchedulerError>
    where
        S: EventSource + ?Sized,
    {
        match source.next_event(timeout) {
            Err(SourceError::Invalidated { root }) => {
                warn!(root = %root.display(), "Watched directory became invalid, re-registering");
                source.reregister()?;
                Ok(Next::Timeout)
            }
            other => Ok(other?),
        }
    }
}
