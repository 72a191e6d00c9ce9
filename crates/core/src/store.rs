//! Output store for settled files
//!
//! Copies land in the output root atomically: data is staged in a temporary
//! file inside the root, fsynced, then linked into place without clobbering.
//! When the name is taken the store appends a numeric suffix and retries the
//! link only, never the copy:
//! ```text
//! out/
//!   report.csv      <- first copy
//!   report.csv1     <- second copy, counter = 1
//!   summary.txt2    <- counter is shared, so the next collision uses 2
//! ```

use crate::error::ActionError;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::{Builder, NamedTempFile};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Destination for settled files
#[derive(Debug)]
pub struct OutputStore {
    /// Output root directory
    root: PathBuf,
    /// Collision suffix counter, shared by every copy for the process lifetime
    suffix_counter: AtomicU64,
}

impl OutputStore {
    /// Open an existing output root
    ///
    /// A missing or non-directory root is fatal: nothing could ever be copied.
    pub fn open(root: &Path) -> Result<Self, ActionError> {
        let metadata = fs::metadata(root).map_err(|e| ActionError::fatal(root, e))?;
        if !metadata.is_dir() {
            return Err(ActionError::fatal(
                root,
                io::Error::new(io::ErrorKind::Other, "output root is not a directory"),
            ));
        }

        Ok(Self {
            root: root.to_path_buf(),
            suffix_counter: AtomicU64::new(0),
        })
    }

    /// Get the output root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current value of the collision counter
    pub fn suffix_counter(&self) -> u64 {
        self.suffix_counter.load(Ordering::SeqCst)
    }

    /// Copy `source` into the output root, returning the final path
    ///
    /// Failures reading the source, or a source whose size or mtime changed
    /// while copying, are retryable. Failures writing into the root are fatal.
    pub fn copy_in(&self, source: &Path) -> Result<PathBuf, ActionError> {
        let file_name = source
            .file_name()
            .ok_or_else(|| ActionError::retryable(source, "path has no file name"))?
            .to_os_string();

        let before = fs::metadata(source)
            .map_err(|e| ActionError::retryable(source, format!("cannot stat source: {e}")))?;
        // Opening a FIFO without a writer would block forever
        if !before.is_file() {
            return Err(ActionError::retryable(source, "not a regular file"));
        }

        let mut staged = Builder::new()
            .prefix(".settle-")
            .suffix(".tmp")
            .tempfile_in(&self.root)
            .map_err(|e| ActionError::fatal(&self.root, e))?;

        let copied = self.stage(source, &mut staged)?;

        let after = fs::metadata(source)
            .map_err(|e| ActionError::retryable(source, format!("source vanished: {e}")))?;
        if copied != after.len()
            || before.len() != after.len()
            || before.modified().ok() != after.modified().ok()
        {
            return Err(ActionError::retryable(
                source,
                format!("size changed during copy ({} -> {} bytes)", before.len(), after.len()),
            ));
        }

        self.persist(staged, &file_name)
    }

    /// Stream the source into the staging file
    fn stage(&self, source: &Path, staged: &mut NamedTempFile) -> Result<u64, ActionError> {
        let mut input = File::open(source)
            .map_err(|e| ActionError::retryable(source, format!("cannot open source: {e}")))?;
        let opened = input
            .metadata()
            .map_err(|e| ActionError::retryable(source, format!("cannot stat source: {e}")))?;
        if !opened.is_file() {
            return Err(ActionError::retryable(source, "not a regular file"));
        }

        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut copied = 0u64;
        loop {
            let n = match input.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(ActionError::retryable(source, format!("read failed: {e}")));
                }
            };
            staged
                .as_file_mut()
                .write_all(&buf[..n])
                .map_err(|e| ActionError::fatal(staged.path(), e))?;
            copied += n as u64;
        }

        staged
            .as_file()
            .sync_all()
            .map_err(|e| ActionError::fatal(staged.path(), e))?;

        Ok(copied)
    }

    /// Link the staged file under the first free name
    fn persist(&self, mut staged: NamedTempFile, file_name: &OsString) -> Result<PathBuf, ActionError> {
        let mut target = self.root.join(file_name);
        loop {
            match staged.persist_noclobber(&target) {
                Ok(_) => return Ok(target),
                Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                    staged = err.file;
                    let n = self.suffix_counter.fetch_add(1, Ordering::SeqCst) + 1;
                    let mut name = file_name.clone();
                    name.push(n.to_string());
                    tracing::debug!(
                        taken = %target.display(),
                        suffix = n,
                        "Output name taken, trying next suffix"
                    );
                    target = self.root.join(name);
                }
                Err(err) => return Err(ActionError::fatal(&target, err.error)),
            }
        }
    }
}
