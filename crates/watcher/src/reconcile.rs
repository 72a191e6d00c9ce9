//! Root rescans
//!
//! Finds files the event stream did not (or could not) report: after an
//! event queue overflow, and at startup when existing files should be
//! treated as fresh.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// List regular files directly under `root`
///
/// With `since`, only files modified at or after that time are returned.
/// Subdirectories are not descended into. Only an unreadable root is an
/// error; entries that vanish or fail to stat mid-scan are skipped.
pub fn scan_root(root: &Path, since: Option<SystemTime>) -> Result<Vec<PathBuf>> {
    fs::read_dir(root).with_context(|| format!("Failed to read {}", root.display()))?;

    let mut found = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(e).with_context(|| format!("Failed to read {}", root.display()));
            }
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if is_candidate(&entry, since) {
            found.push(entry.into_path());
        }
    }

    Ok(found)
}

/// Regular file modified at or after `since`
fn is_candidate(entry: &DirEntry, since: Option<SystemTime>) -> bool {
    if !entry.file_type().is_file() {
        return false;
    }

    let Some(since) = since else {
        return true;
    };

    match entry.metadata().map_err(io::Error::from).and_then(|m| m.modified()) {
        Ok(mtime) => mtime >= since,
        Err(e) => {
            debug!(path = %entry.path().display(), "Skipping entry: {}", e);
            false
        }
    }
}
