//! Classification drift tracking
//!
//! This module compares two snapshots and reports, per entity kind:
//! - Entities added or removed since the previous run
//! - Entities whose source text changed (hash differs)
//! - Entities whose classification label changed

mod detector;

pub use detector::diff_snapshots;

use crate::storage::SnapshotRecord;
use serde::{Deserialize, Serialize};

/// A partition split by entity kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByKind<T> {
    pub functions: Vec<T>,
    pub sql_blocks: Vec<T>,
}

impl<T> Default for ByKind<T> {
    fn default() -> Self {
        Self {
            functions: Vec::new(),
            sql_blocks: Vec::new(),
        }
    }
}

impl<T> ByKind<T> {
    pub fn len(&self) -> usize {
        self.functions.len() + self.sql_blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Functions first, then SQL blocks
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.functions.iter().chain(self.sql_blocks.iter())
    }
}

/// The same identity key seen in both snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordChange {
    pub previous: SnapshotRecord,
    pub current: SnapshotRecord,
}

impl RecordChange {
    pub fn identity_key(&self) -> String {
        self.current.identity_key()
    }
}

/// What changed between two runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub added: ByKind<SnapshotRecord>,
    pub removed: ByKind<SnapshotRecord>,
    /// Source hash changed
    pub modified: ByKind<RecordChange>,
    /// Classification label changed
    pub reclassified: ByKind<RecordChange>,
}

impl DiffResult {
    /// True when all four partitions are empty
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
            && self.reclassified.is_empty()
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            added: self.added.len(),
            removed: self.removed.len(),
            modified: self.modified.len(),
            reclassified: self.reclassified.len(),
        }
    }
}

/// Partition sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub reclassified: usize,
}

impl std::fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} modified, {} reclassified",
            self.added, self.removed, self.modified, self.reclassified
        )
    }
}
