//! Source tree access module
//!
//! This module handles read-only access to the tree being analyzed:
//! - File discovery by extension, skipping dependency and build directories
//! - File reading
//! - Resolving the HEAD commit when the tree lives in a Git repository

mod config;

pub use config::{ClassifierSettings, LlmSettings, RulescopeConfig, STATE_DIR};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// A source tree being analyzed
#[derive(Debug, Clone)]
pub struct SourceTree {
    /// Path to the tree root
    root: PathBuf,
    /// Configuration in effect
    config: RulescopeConfig,
}

impl SourceTree {
    /// Open a source tree, loading its configuration (or defaults)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.is_dir() {
            anyhow::bail!("Source root is not a directory: {:?}", root);
        }

        let config = RulescopeConfig::load_or_default(&root)?;
        Ok(Self { root, config })
    }

    /// Open a source tree with an explicit configuration
    pub fn with_config<P: AsRef<Path>>(path: P, config: RulescopeConfig) -> Self {
        Self {
            root: path.as_ref().to_path_buf(),
            config,
        }
    }

    /// Get the tree root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the configuration
    pub fn config(&self) -> &RulescopeConfig {
        &self.config
    }

    /// Mutable configuration, for command-line overrides
    pub fn config_mut(&mut self) -> &mut RulescopeConfig {
        &mut self.config
    }

    /// Get the path to the .rulescope directory
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    /// Get the configured snapshot directory
    pub fn snapshot_dir(&self) -> PathBuf {
        self.root.join(&self.config.snapshot_dir)
    }

    /// Python files, relative to the root, sorted
    pub fn python_files(&self) -> Result<Vec<PathBuf>> {
        self.list_files(&self.config.python_extensions)
    }

    /// SQL files, relative to the root, sorted
    pub fn sql_files(&self) -> Result<Vec<PathBuf>> {
        self.list_files(&self.config.sql_extensions)
    }

    /// List files with one of the given extensions
    pub fn list_files(&self, extensions: &[String]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        let walker = walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 || !e.file_type().is_dir() {
                    return true;
                }
                let name = e.file_name().to_str().unwrap_or("");
                !self.config.is_excluded_dir(name)
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable path: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let matches = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)));

            if matches {
                let path = entry
                    .path()
                    .strip_prefix(&self.root)
                    .context("Walked path outside of source root")?
                    .to_path_buf();
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Whether a changed path would be picked up by the next scan.
    ///
    /// Only components below the root are checked against the excluded
    /// directories; a path outside the root is judged by extension alone.
    pub fn is_source_path(&self, path: &Path) -> bool {
        let relative = if path.is_absolute() {
            let canonical = self.root.canonicalize().ok();
            canonical
                .as_deref()
                .and_then(|root| path.strip_prefix(root).ok())
                .or_else(|| path.strip_prefix(&self.root).ok())
        } else {
            path.strip_prefix(&self.root).ok().or(Some(path))
        };

        let excluded = relative.is_some_and(|rel| {
            rel.components()
                .any(|c| self.config.is_excluded_dir(&c.as_os_str().to_string_lossy()))
        });
        if excluded {
            return false;
        }

        let config = &self.config;
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                config
                    .python_extensions
                    .iter()
                    .chain(config.sql_extensions.iter())
                    .any(|x| x.eq_ignore_ascii_case(ext))
            })
    }

    /// Read a file relative to the root
    pub fn read(&self, path: &Path) -> Result<String> {
        let full_path = self.root.join(path);
        std::fs::read_to_string(&full_path)
            .with_context(|| format!("Failed to read file: {:?}", full_path))
    }

    /// Render a relative path with `/` separators
    pub fn display_path(path: &Path) -> String {
        path.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Current HEAD commit of the enclosing Git repository, if any
    pub fn head_commit(&self) -> Option<String> {
        let repo = match git2::Repository::discover(&self.root) {
            Ok(repo) => repo,
            Err(e) => {
                tracing::debug!("No git repository at {:?}: {}", self.root, e);
                return None;
            }
        };

        let commit = repo.head().ok()?.peel_to_commit().ok()?;
        Some(commit.id().to_string())
    }
}
