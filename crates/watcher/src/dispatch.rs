//! Settle dispatch
//!
//! A dispatcher performs the one-time action for a settled file. It reports
//! busy sources as [`ActionError::Retryable`] and broken destinations as
//! [`ActionError::Fatal`]; the scheduler decides what happens next.

use settle_core::{ActionError, OutputStore};
use std::path::Path;
use tracing::info;

/// Action run once per settled file
pub trait Dispatcher {
    fn dispatch(&mut self, path: &Path) -> Result<(), ActionError>;
}

impl<F> Dispatcher for F
where
    F: FnMut(&Path) -> Result<(), ActionError>,
{
    fn dispatch(&mut self, path: &Path) -> Result<(), ActionError> {
        self(path)
    }
}

/// Copies settled files into an [`OutputStore`]
#[derive(Debug)]
pub struct CopyDispatcher {
    store: OutputStore,
}

impl CopyDispatcher {
    pub fn new(store: OutputStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }
}

impl Dispatcher for CopyDispatcher {
    fn dispatch(&mut self, path: &Path) -> Result<(), ActionError> {
        let target = self.store.copy_in(path)?;
        info!(
            source = %path.display(),
            target = %target.display(),
            "Copied settled file"
        );
        Ok(())
    }
}
