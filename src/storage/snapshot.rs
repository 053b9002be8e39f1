//! Snapshot data model

use crate::classify::{Classification, Classified, ClassifiedEntities};
use crate::extract::{FunctionEntity, SourceEntity, SqlBlock, SqlType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Variant discriminant of a reduced entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordKind {
    Function,
    SqlBlock { sql_type: SqlType },
}

/// An entity reduced to what diffing needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub name: String,
    pub file_path: String,
    #[serde(flatten)]
    pub kind: RecordKind,
    pub classification: Classification,
    /// SHA-256 of the entity's source slice
    pub hash: String,
}

impl SnapshotRecord {
    fn reduce<E: SourceEntity>(classified: &Classified<E>, kind: RecordKind) -> Self {
        Self {
            name: classified.entity.name().to_string(),
            file_path: classified.entity.file_path().to_string(),
            kind,
            classification: classified.classification.classification,
            hash: classified.entity.hash(),
        }
    }

    /// Identity key, `file_path:name`
    pub fn identity_key(&self) -> String {
        format!("{}:{}", self.file_path, self.name)
    }
}

impl From<&Classified<FunctionEntity>> for SnapshotRecord {
    fn from(classified: &Classified<FunctionEntity>) -> Self {
        Self::reduce(classified, RecordKind::Function)
    }
}

impl From<&Classified<SqlBlock>> for SnapshotRecord {
    fn from(classified: &Classified<SqlBlock>) -> Self {
        Self::reduce(
            classified,
            RecordKind::SqlBlock {
                sql_type: classified.entity.sql_type,
            },
        )
    }
}

/// One completed run, as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSnapshot {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub functions: Vec<SnapshotRecord>,
    #[serde(default)]
    pub sql_blocks: Vec<SnapshotRecord>,
}

impl ExtractionSnapshot {
    /// Build a snapshot of a classified entity set, stamped now
    pub fn from_classified(
        entities: &ClassifiedEntities,
        commit: Option<String>,
        git_ref: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            commit,
            git_ref,
            functions: entities.functions.iter().map(SnapshotRecord::from).collect(),
            sql_blocks: entities.sql_blocks.iter().map(SnapshotRecord::from).collect(),
        }
    }

    /// Total number of records
    pub fn len(&self) -> usize {
        self.functions.len() + self.sql_blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
