//! Snapshot storage for rulescope
//!
//! This module handles persistent storage of:
//! - The latest snapshot, used as the baseline for the next run
//! - An append-only history of superseded snapshots
//!
//! Layout under the store directory:
//! - `latest.json`
//! - `history/snapshot_<timestamp>.json`

mod snapshot;

pub use snapshot::{ExtractionSnapshot, RecordKind, SnapshotRecord};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

const LATEST_FILE: &str = "latest.json";
const HISTORY_DIR: &str = "history";

/// JSON snapshot store rooted at one directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

/// An archived snapshot as listed by [`SnapshotStore::history`]
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub path: PathBuf,
    /// Header fields, `None` when the file could not be decoded
    pub timestamp: Option<DateTime<Utc>>,
    pub commit: Option<String>,
    pub entities: Option<usize>,
}

impl SnapshotStore {
    /// Create a store; nothing is touched until the first save
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE)
    }

    pub fn history_dir(&self) -> PathBuf {
        self.dir.join(HISTORY_DIR)
    }

    /// Load the latest snapshot.
    ///
    /// Missing, unreadable or undecodable files all mean "no previous
    /// snapshot", so the run proceeds as a first extraction.
    pub fn load_latest(&self) -> Option<ExtractionSnapshot> {
        let path = self.latest_path();
        if !path.exists() {
            tracing::debug!("No previous snapshot at {:?}", path);
            return None;
        }

        match read_snapshot(&path) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!("Ignoring previous snapshot: {:#}", e);
                None
            }
        }
    }

    /// Save a snapshot as the new latest, archiving the one it supersedes.
    ///
    /// Any failure here is fatal to the run.
    pub fn save(&self, snapshot: &ExtractionSnapshot) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create snapshot directory {:?}", self.dir))?;

        let content =
            serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;

        // The previous latest is only archived once the new one is on disk
        let tmp = self.dir.join(format!("{}.tmp", LATEST_FILE));
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write snapshot {:?}", tmp))?;

        let latest = self.latest_path();
        if latest.exists() {
            self.archive_latest(&latest)?;
        }
        std::fs::rename(&tmp, &latest)
            .with_context(|| format!("Failed to move snapshot into place at {:?}", latest))?;

        tracing::info!(
            "Saved snapshot with {} records to {:?}",
            snapshot.len(),
            latest
        );
        Ok(latest)
    }

    /// Move the current latest into history, tagged by its own timestamp
    fn archive_latest(&self, latest: &Path) -> Result<()> {
        let history_dir = self.history_dir();
        std::fs::create_dir_all(&history_dir)
            .with_context(|| format!("Failed to create history directory {:?}", history_dir))?;

        let superseded_at = match read_snapshot(latest) {
            Ok(previous) => previous.timestamp,
            Err(e) => {
                tracing::warn!("Archiving undecodable snapshot: {:#}", e);
                Utc::now()
            }
        };

        let stem = format!("snapshot_{}", superseded_at.format("%Y%m%dT%H%M%S%.6fZ"));
        let mut target = history_dir.join(format!("{}.json", stem));
        let mut suffix = 1;
        while target.exists() {
            target = history_dir.join(format!("{}_{}.json", stem, suffix));
            suffix += 1;
        }

        std::fs::rename(latest, &target)
            .with_context(|| format!("Failed to archive snapshot to {:?}", target))?;
        tracing::debug!("Archived previous snapshot to {:?}", target);

        Ok(())
    }

    /// Archived snapshots, oldest first
    pub fn history(&self) -> Result<Vec<HistoryEntry>> {
        let history_dir = self.history_dir();
        if !history_dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&history_dir)
            .with_context(|| format!("Failed to read history directory {:?}", history_dir))?
        {
            let path = entry
                .with_context(|| format!("Failed to read history directory {:?}", history_dir))?
                .path();
            let is_snapshot = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("snapshot_") && n.ends_with(".json"));
            if is_snapshot {
                paths.push(path);
            }
        }
        paths.sort_by_cached_key(|path| history_order(path));

        let entries = paths
            .into_iter()
            .map(|path| match read_snapshot(&path) {
                Ok(snapshot) => HistoryEntry {
                    timestamp: Some(snapshot.timestamp),
                    entities: Some(snapshot.len()),
                    commit: snapshot.commit,
                    path,
                },
                Err(e) => {
                    tracing::warn!("Unreadable history entry: {:#}", e);
                    HistoryEntry {
                        path,
                        timestamp: None,
                        commit: None,
                        entities: None,
                    }
                }
            })
            .collect();

        Ok(entries)
    }

    /// Load one archived snapshot
    pub fn load_history_entry(&self, entry: &HistoryEntry) -> Result<ExtractionSnapshot> {
        read_snapshot(&entry.path)
    }
}

/// Sort key for `snapshot_<timestamp>[_N].json`: timestamp tag, then collision suffix
fn history_order(path: &Path) -> (String, u32) {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let tag = stem.strip_prefix("snapshot_").unwrap_or(stem);

    match tag.rsplit_once('_') {
        Some((base, n)) => match n.parse() {
            Ok(n) => (base.to_string(), n),
            Err(_) => (tag.to_string(), 0),
        },
        None => (tag.to_string(), 0),
    }
}

fn read_snapshot(path: &Path) -> Result<ExtractionSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to decode snapshot {:?}", path))
}
