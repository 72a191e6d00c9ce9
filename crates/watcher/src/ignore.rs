//! Ignore pattern management for settle
//!
//! Supports multiple sources of ignore patterns:
//! 1. Built-in patterns (partial downloads, editor temp files - always active)
//! 2. `.settleignore` in the watched root (optional, enabled by default)
//! 3. Config-based patterns (additional custom patterns)

use anyhow::Result;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use settle_core::IgnoreConfig;
use std::path::{Path, PathBuf};

/// Name of the per-root ignore file
pub const IGNORE_FILE: &str = ".settleignore";

/// Ignore rule manager
pub struct IgnoreRules {
    /// Watched root directory
    root: PathBuf,

    /// Patterns from `<root>/.settleignore` (optional)
    settleignore: Option<Gitignore>,

    /// Patterns from configuration (optional)
    additional: Option<Gitignore>,

    /// Configuration
    config: IgnoreConfig,
}

impl IgnoreRules {
    /// Load ignore rules for a watched root
    pub fn load(root: &Path, config: &IgnoreConfig) -> Result<Self> {
        let mut rules = Self {
            root: root.to_path_buf(),
            settleignore: None,
            additional: None,
            config: config.clone(),
        };

        rules.reload()?;
        Ok(rules)
    }

    /// Rebuild matchers from disk and configuration
    ///
    /// Called again whenever `.settleignore` itself changes.
    pub fn reload(&mut self) -> Result<()> {
        self.settleignore = None;
        if self.config.use_settleignore {
            let path = self.root.join(IGNORE_FILE);
            if path.exists() {
                let mut builder = GitignoreBuilder::new(&self.root);
                if let Some(err) = builder.add(&path) {
                    return Err(err.into());
                }
                self.settleignore = Some(builder.build()?);
            }
        }

        self.additional = None;
        if !self.config.additional_patterns.is_empty() {
            let mut builder = GitignoreBuilder::new(&self.root);
            for pattern in &self.config.additional_patterns {
                builder.add_line(None, pattern)?;
            }
            self.additional = Some(builder.build()?);
        }

        Ok(())
    }

    /// Check if path should never be tracked
    pub fn should_ignore(&self, path: &Path) -> bool {
        // 1. Built-in patterns (highest priority - always enforced)
        if is_builtin_ignored(path) {
            return true;
        }

        // 2. .settleignore
        if let Some(ref settleignore) = self.settleignore {
            if settleignore.matched(path, false).is_ignore() {
                return true;
            }
        }

        // 3. Additional config patterns
        if let Some(ref additional) = self.additional {
            if additional.matched(path, false).is_ignore() {
                return true;
            }
        }

        false
    }

    /// Whether `path` is this root's `.settleignore`
    pub fn is_rules_file(&self, path: &Path) -> bool {
        self.config.use_settleignore && path == self.root.join(IGNORE_FILE)
    }

    /// Get number of active ignore sources
    pub fn active_sources(&self) -> usize {
        let mut count = 1; // Built-in always active
        if self.settleignore.is_some() {
            count += 1;
        }
        if self.additional.is_some() {
            count += 1;
        }
        count
    }
}

/// Partial, temporary and system files that are never worth copying
fn is_builtin_ignored(path: &Path) -> bool {
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if filename == IGNORE_FILE {
        return true;
    }

    // In-progress downloads and transfers
    if filename.ends_with(".part")
        || filename.ends_with(".crdownload")
        || filename.ends_with(".download")
        || filename.ends_with(".tmp")
    {
        return true;
    }

    // Our own staging files
    if filename.starts_with(".settle-") {
        return true;
    }

    // Vim swap files (.swp, .swo, .swn, .swm)
    if filename.ends_with(".swp")
        || filename.ends_with(".swo")
        || filename.ends_with(".swn")
        || filename.ends_with(".swm")
    {
        return true;
    }

    // Vim/Emacs backup files (~)
    if filename.ends_with('~') {
        return true;
    }

    // Emacs auto-save (#*#) and lock files (.#*)
    if (filename.starts_with('#') && filename.ends_with('#')) || filename.starts_with(".#") {
        return true;
    }

    // MacOS and Windows system files
    if filename == ".DS_Store"
        || filename.starts_with("._")
        || filename == "Thumbs.db"
        || filename == "desktop.ini"
    {
        return true;
    }

    false
}
