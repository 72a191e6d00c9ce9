//! Event source over the platform change-notification API
//!
//! `notify` delivers raw events on its own thread. They are forwarded into a
//! channel so the scheduler can wait on exactly one thing: the next event or
//! its own deadline, whichever comes first.

use crate::{EventKind, WatchEvent};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Result of waiting on an event source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// A change under the watched root
    Event(WatchEvent),
    /// The OS queue overflowed; events may have been lost
    Overflow,
    /// Nothing arrived within the timeout
    Timeout,
    /// The source was shut down; no more events will arrive
    Closed,
}

/// Event source failures
#[derive(Debug, Error)]
pub enum SourceError {
    /// The watched root went away; the caller should re-register
    #[error("watch on {} is no longer valid", root.display())]
    Invalidated { root: PathBuf },

    #[error("failed to watch {}: {source}", root.display())]
    Watch {
        root: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("failed to recreate {}: {source}", root.display())]
    Recreate {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A stream of change events for one watched root
pub trait EventSource {
    /// The watched root
    fn root(&self) -> &Path;

    /// Wait for the next event
    ///
    /// `None` blocks indefinitely, `Some(d)` returns [`Next::Timeout`] after
    /// `d`, and `Some(Duration::ZERO)` polls without blocking.
    fn next_event(&mut self, timeout: Option<Duration>) -> Result<Next, SourceError>;

    /// Re-establish the watch after [`SourceError::Invalidated`]
    fn reregister(&mut self) -> Result<(), SourceError>;

    /// Upper bound on results queued right now, if the source can tell
    fn available(&self) -> Option<usize> {
        None
    }

    /// Non-blocking poll
    fn try_next_event(&mut self) -> Result<Next, SourceError> {
        self.next_event(Some(Duration::ZERO))
    }
}

enum Message {
    Notify(notify::Result<Event>),
    Shutdown,
}

/// Requests shutdown of a [`NotifySource`] from another thread
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Sender<Message>,
}

impl ShutdownHandle {
    /// Make the source report [`Next::Closed`]
    pub fn close(&self) {
        let _ = self.tx.send(Message::Shutdown);
    }
}

/// Non-recursive watch of a single directory backed by `notify`
pub struct NotifySource {
    /// Watched root
    root: PathBuf,
    /// Platform watcher; dropping it stops delivery
    watcher: RecommendedWatcher,
    tx: Sender<Message>,
    rx: Receiver<Message>,
    /// Translated events not yet handed out (one raw event may carry several)
    buffered: VecDeque<Next>,
    /// Recreate the root on re-registration if it is missing
    recreate_root: bool,
    closed: bool,
}

impl NotifySource {
    /// Start watching `root`
    pub fn new(root: &Path, recreate_root: bool) -> Result<Self, SourceError> {
        let (tx, rx) = crossbeam_channel::unbounded();

        let notify_tx = tx.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = notify_tx.send(Message::Notify(res));
            },
            notify::Config::default(),
        )
        .map_err(|source| SourceError::Watch {
            root: root.to_path_buf(),
            source,
        })?;

        watcher
            .watch(root, RecursiveMode::NonRecursive)
            .map_err(|source| SourceError::Watch {
                root: root.to_path_buf(),
                source,
            })?;

        info!(root = %root.display(), "Watching directory");

        Ok(Self {
            root: root.to_path_buf(),
            watcher,
            tx,
            rx,
            buffered: VecDeque::new(),
            recreate_root,
            closed: false,
        })
    }

    /// Handle for shutting this source down from elsewhere
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.tx.clone(),
        }
    }

    fn recv(&self, deadline: Option<Instant>) -> Option<Message> {
        match deadline {
            None => self.rx.recv().ok(),
            Some(deadline) => match self.rx.recv_deadline(deadline) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => None,
                // We hold a sender ourselves, so this cannot happen
                Err(RecvTimeoutError::Disconnected) => Some(Message::Shutdown),
            },
        }
    }

    /// Map one raw notify event into buffered [`Next`] values
    fn translate(&mut self, event: Event) -> Result<(), SourceError> {
        if event.need_rescan() {
            warn!(root = %self.root.display(), "Event queue overflowed, rescan needed");
            self.buffered.push_back(Next::Overflow);
        }

        let touches_root = event.paths.iter().any(|p| p == &self.root);
        let root_gone = matches!(
            event.kind,
            notify::EventKind::Remove(_) | notify::EventKind::Modify(ModifyKind::Name(_))
        ) && (touches_root || !self.root.is_dir());
        if root_gone {
            return Err(SourceError::Invalidated {
                root: self.root.clone(),
            });
        }

        match event.kind {
            notify::EventKind::Create(_) => self.push_all(EventKind::Created, &event.paths),
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                self.push_all(EventKind::Deleted, &event.paths)
            }
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                self.push_all(EventKind::Created, &event.paths)
            }
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = event.paths.as_slice() {
                    self.push(EventKind::Deleted, from);
                    self.push(EventKind::Created, to);
                }
            }
            notify::EventKind::Modify(ModifyKind::Name(_)) => {
                // Ambiguous rename: the file system says which side we are on
                for path in &event.paths {
                    let kind = if path.exists() {
                        EventKind::Created
                    } else {
                        EventKind::Deleted
                    };
                    self.push(kind, path);
                }
            }
            notify::EventKind::Modify(_) => self.push_all(EventKind::Modified, &event.paths),
            notify::EventKind::Remove(_) => self.push_all(EventKind::Deleted, &event.paths),
            other => debug!("Ignoring event kind {:?} for {:?}", other, event.paths),
        }

        Ok(())
    }

    fn push_all(&mut self, kind: EventKind, paths: &[PathBuf]) {
        for path in paths {
            self.push(kind, path);
        }
    }

    fn push(&mut self, kind: EventKind, path: &Path) {
        if path == self.root {
            return;
        }
        self.buffered.push_back(Next::Event(WatchEvent::new(kind, path)));
    }

    fn is_invalidation(&self, err: &notify::Error) -> bool {
        matches!(
            err.kind,
            notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound
        ) || !self.root.is_dir()
    }
}

impl EventSource for NotifySource {
    fn root(&self) -> &Path {
        &self.root
    }

    fn next_event(&mut self, timeout: Option<Duration>) -> Result<Next, SourceError> {
        if self.closed {
            return Ok(Next::Closed);
        }
        if let Some(next) = self.buffered.pop_front() {
            return Ok(next);
        }

        // Irrelevant raw events must not extend the wait
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let Some(message) = self.recv(deadline) else {
                return Ok(Next::Timeout);
            };

            match message {
                Message::Shutdown => {
                    self.closed = true;
                    return Ok(Next::Closed);
                }
                Message::Notify(Err(err)) => {
                    if self.is_invalidation(&err) {
                        return Err(SourceError::Invalidated {
                            root: self.root.clone(),
                        });
                    }
                    warn!(root = %self.root.display(), "Watch error: {}", err);
                }
                Message::Notify(Ok(event)) => {
                    self.translate(event)?;
                    if let Some(next) = self.buffered.pop_front() {
                        return Ok(next);
                    }
                }
            }
        }
    }

    fn available(&self) -> Option<usize> {
        Some(self.buffered.len() + self.rx.len())
    }

    fn reregister(&mut self) -> Result<(), SourceError> {
        if !self.root.is_dir() {
            if !self.recreate_root {
                return Err(SourceError::Invalidated {
                    root: self.root.clone(),
                });
            }
            std::fs::create_dir_all(&self.root).map_err(|source| SourceError::Recreate {
                root: self.root.clone(),
                source,
            })?;
            info!(root = %self.root.display(), "Recreated watched directory");
        }

        // The old watch may already be gone with the directory
        let _ = self.watcher.unwatch(&self.root);
        self.watcher
            .watch(&self.root, RecursiveMode::NonRecursive)
            .map_err(|source| SourceError::Watch {
                root: self.root.clone(),
                source,
            })?;

        self.buffered.clear();
        info!(root = %self.root.display(), "Re-registered watch");
        Ok(())
    }
}
