//! Snapshot diff
//!
//! Records are matched by identity key (`file_path:name`) within each kind.
//! A key that occurs more than once in a snapshot is paired by occurrence:
//! the n-th record with that key is compared against the n-th previous one.

use super::{ByKind, DiffResult, RecordChange};
use crate::storage::{ExtractionSnapshot, SnapshotRecord};
use std::collections::{BTreeMap, HashMap};

/// Diff the current snapshot against the previous one.
///
/// With no previous snapshot everything is `added`. Output partitions are
/// sorted by identity key.
pub fn diff_snapshots(
    previous: Option<&ExtractionSnapshot>,
    current: &ExtractionSnapshot,
) -> DiffResult {
    let none = Vec::new();
    let (previous_functions, previous_sql) = match previous {
        Some(previous) => (&previous.functions, &previous.sql_blocks),
        None => (&none, &none),
    };

    let functions = diff_records(previous_functions, &current.functions);
    let sql_blocks = diff_records(previous_sql, &current.sql_blocks);

    let result = DiffResult {
        added: ByKind {
            functions: functions.added,
            sql_blocks: sql_blocks.added,
        },
        removed: ByKind {
            functions: functions.removed,
            sql_blocks: sql_blocks.removed,
        },
        modified: ByKind {
            functions: functions.modified,
            sql_blocks: sql_blocks.modified,
        },
        reclassified: ByKind {
            functions: functions.reclassified,
            sql_blocks: sql_blocks.reclassified,
        },
    };

    tracing::info!("Diff: {}", result.summary());
    result
}

#[derive(Default)]
struct KindDiff {
    added: Vec<SnapshotRecord>,
    removed: Vec<SnapshotRecord>,
    modified: Vec<RecordChange>,
    reclassified: Vec<RecordChange>,
}

/// Records keyed by identity key and occurrence index of that key
fn key_map(records: &[SnapshotRecord]) -> BTreeMap<(String, usize), &SnapshotRecord> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut map = BTreeMap::new();

    for record in records {
        let key = record.identity_key();
        let occurrence = seen.entry(key.clone()).or_default();
        map.insert((key, *occurrence), record);
        *occurrence += 1;
    }

    map
}

fn diff_records(previous: &[SnapshotRecord], current: &[SnapshotRecord]) -> KindDiff {
    let previous = key_map(previous);
    let current = key_map(current);
    let mut diff = KindDiff::default();

    for (key, record) in &current {
        let Some(old) = previous.get(key) else {
            diff.added.push((*record).clone());
            continue;
        };

        let change = || RecordChange {
            previous: (*old).clone(),
            current: (*record).clone(),
        };

        if old.hash != record.hash {
            diff.modified.push(change());
        }
        if old.classification != record.classification {
            diff.reclassified.push(change());
        }
    }

    for (key, record) in &previous {
        if !current.contains_key(key) {
            diff.removed.push((*record).clone());
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;
    use crate::extract::SqlType;
    use crate::storage::RecordKind;
    use chrono::Utc;

    fn function(name: &str, hash: &str, classification: Classification) -> SnapshotRecord {
        SnapshotRecord {
            name: name.to_string(),
            file_path: "jobs/etl.py".to_string(),
            kind: RecordKind::Function,
            classification,
            hash: hash.to_string(),
        }
    }

    fn query(name: &str, hash: &str) -> SnapshotRecord {
        SnapshotRecord {
            name: name.to_string(),
            file_path: "sql/report.sql".to_string(),
            kind: RecordKind::SqlBlock {
                sql_type: SqlType::Query,
            },
            classification: Classification::PipelineCode,
            hash: hash.to_string(),
        }
    }

    fn snapshot(functions: Vec<SnapshotRecord>, sql_blocks: Vec<SnapshotRecord>) -> ExtractionSnapshot {
        ExtractionSnapshot {
            timestamp: Utc::now(),
            commit: None,
            git_ref: None,
            functions,
            sql_blocks,
        }
    }

    use Classification::{BusinessLogic, PipelineCode};

    #[test]
    fn test_identical_snapshots_have_empty_diff() {
        let s = snapshot(
            vec![function("a", "h1", PipelineCode), function("b", "h2", BusinessLogic)],
            vec![query("q", "h3")],
        );
        let diff = diff_snapshots(Some(&s), &s);
        assert!(diff.is_empty());
        assert_eq!(diff, diff_snapshots(Some(&s), &s));
    }

    #[test]
    fn test_first_run_is_all_added() {
        let s = snapshot(
            vec![function("b", "h2", PipelineCode), function("a", "h1", PipelineCode)],
            vec![query("q", "h3")],
        );
        let diff = diff_snapshots(None, &s);

        let added: Vec<&str> = diff.added.functions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(added, vec!["a", "b"]);
        assert_eq!(diff.added.sql_blocks.len(), 1);
        assert!(diff.removed.is_empty());
        assert!(diff.modified.is_empty());
        assert!(diff.reclassified.is_empty());
    }

    #[test]
    fn test_hash_change_is_modified_only() {
        let old = snapshot(vec![function("a", "h1", PipelineCode)], vec![]);
        let new = snapshot(vec![function("a", "h1-edited", PipelineCode)], vec![]);

        let diff = diff_snapshots(Some(&old), &new);
        assert_eq!(diff.modified.functions.len(), 1);
        assert_eq!(diff.modified.functions[0].previous.hash, "h1");
        assert_eq!(diff.modified.functions[0].current.hash, "h1-edited");
        assert!(diff.reclassified.is_empty());
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn test_label_change_is_reclassified_only() {
        let old = snapshot(vec![function("a", "h1", PipelineCode)], vec![]);
        let new = snapshot(vec![function("a", "h1", BusinessLogic)], vec![]);

        let diff = diff_snapshots(Some(&old), &new);
        assert!(diff.modified.is_empty());
        assert_eq!(diff.reclassified.functions.len(), 1);
        assert_eq!(diff.reclassified.functions[0].identity_key(), "jobs/etl.py:a");
    }

    #[test]
    fn test_hash_and_label_change_is_both() {
        let old = snapshot(vec![function("a", "h1", PipelineCode)], vec![]);
        let new = snapshot(vec![function("a", "h2", BusinessLogic)], vec![]);

        let summary = diff_snapshots(Some(&old), &new).summary();
        assert_eq!(summary.modified, 1);
        assert_eq!(summary.reclassified, 1);
        assert_eq!(
            summary.to_string(),
            "0 added, 0 removed, 1 modified, 1 reclassified"
        );
    }

    #[test]
    fn test_added_and_removed_per_kind() {
        let old = snapshot(vec![function("gone", "h1", PipelineCode)], vec![query("q", "h3")]);
        let new = snapshot(vec![function("fresh", "h2", PipelineCode)], vec![query("q", "h3")]);

        let diff = diff_snapshots(Some(&old), &new);
        assert_eq!(diff.added.functions[0].name, "fresh");
        assert_eq!(diff.removed.functions[0].name, "gone");
        assert!(diff.added.sql_blocks.is_empty());
        assert!(diff.removed.sql_blocks.is_empty());
    }

    #[test]
    fn test_same_key_in_different_kinds_is_independent() {
        // a function and a SQL block may share file and name
        let mut record = query("shared", "h1");
        record.file_path = "jobs/etl.py".to_string();
        let old = snapshot(vec![function("shared", "h1", PipelineCode)], vec![]);
        let new = snapshot(vec![function("shared", "h1", PipelineCode)], vec![record]);

        let diff = diff_snapshots(Some(&old), &new);
        assert_eq!(diff.summary().added, 1);
        assert_eq!(diff.added.sql_blocks.len(), 1);
    }

    #[test]
    fn test_duplicate_keys_are_all_added_on_first_run() {
        let s = snapshot(
            vec![],
            vec![
                query("unnamed_query", "h1"),
                query("unnamed_query", "h2"),
                query("unnamed_query", "h3"),
            ],
        );

        let diff = diff_snapshots(None, &s);
        assert_eq!(diff.added.sql_blocks.len(), 3);
        let hashes: Vec<&str> = diff.added.sql_blocks.iter().map(|r| r.hash.as_str()).collect();
        assert_eq!(hashes, vec!["h1", "h2", "h3"]);
        assert!(diff_snapshots(Some(&s), &s).is_empty());
    }

    #[test]
    fn test_duplicate_keys_pair_by_occurrence() {
        let old = snapshot(vec![function("dup", "h1", PipelineCode)], vec![]);
        let new = snapshot(
            vec![function("dup", "h1", PipelineCode), function("dup", "h2", PipelineCode)],
            vec![],
        );

        let diff = diff_snapshots(Some(&old), &new);
        assert!(diff.modified.is_empty());
        assert_eq!(diff.added.functions.len(), 1);
        assert_eq!(diff.added.functions[0].hash, "h2");

        let diff = diff_snapshots(Some(&new), &old);
        assert_eq!(diff.removed.functions.len(), 1);
        assert_eq!(diff.removed.functions[0].hash, "h2");
        assert!(diff.added.is_empty());
    }
}
