//! CLI command implementations

use crate::classify::{Classification, Classified, ClassifiedEntities};
use crate::drift::{DiffResult, RecordChange};
use crate::extract::{FunctionEntity, SourceEntity, SqlBlock};
use crate::pipeline::{ExtractOutcome, RunOutcome};
use crate::repo::{RulescopeConfig, SourceTree};
use crate::storage::{HistoryEntry, RecordKind, SnapshotRecord};
use anyhow::Result;
use serde::Serialize;
use std::path::Path;

/// Initialize rulescope in a source tree
pub fn init(path: &Path, force: bool) -> Result<()> {
    let config_path = RulescopeConfig::path_for(path);

    if config_path.exists() && !force {
        anyhow::bail!(
            "rulescope already initialized at {:?}. Use --force to overwrite.",
            config_path
        );
    }

    let config = RulescopeConfig::default();
    config.save(path)?;

    let tree = SourceTree::with_config(path, config);
    let snapshot_dir = tree.snapshot_dir();
    std::fs::create_dir_all(&snapshot_dir)?;

    println!("✓ Initialized rulescope in {:?}", tree.root());
    println!("  Config: {:?}", config_path);
    println!("  Snapshots: {:?}", snapshot_dir);

    Ok(())
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

fn label_icon(classification: Classification) -> &'static str {
    match classification {
        Classification::BusinessLogic => "◆",
        Classification::PipelineCode => "·",
    }
}

fn print_classified<E: SourceEntity>(items: &[Classified<E>], lines: impl Fn(&E) -> (usize, usize)) {
    for item in items {
        let result = &item.classification;
        let (start, end) = lines(&item.entity);
        println!(
            "{} {} [{} / {}]",
            label_icon(result.classification),
            item.entity.identity_key(),
            result.classification,
            result.confidence
        );
        println!("   Lines: {}-{}", start, end);
        println!("   Reason: {}", result.reason);
        for marker in item.entity.business_rule_markers() {
            println!("   Rule: {}", marker);
        }
        println!();
    }
}

/// Print classified entities in human-readable form
pub fn print_entities_text(entities: &ClassifiedEntities) {
    if entities.is_empty() {
        println!("No entities found.");
        return;
    }

    if !entities.functions.is_empty() {
        println!("\nFunctions:");
        println!("==========\n");
        print_classified(&entities.functions, |f: &FunctionEntity| {
            (f.start_line, f.end_line)
        });
    }

    if !entities.sql_blocks.is_empty() {
        println!("\nSQL Blocks:");
        println!("===========\n");
        print_classified(&entities.sql_blocks, |b: &SqlBlock| (b.start_line, b.end_line));
    }

    println!(
        "{} entities: {} business logic, {} pipeline code",
        entities.len(),
        entities.count(Classification::BusinessLogic),
        entities.count(Classification::PipelineCode)
    );
}

/// Print extracted entities plus any skipped files
pub fn print_extract_text(outcome: &ExtractOutcome) {
    print_entities_text(&outcome.entities);
    print_skipped(&outcome.skipped_files);
}

fn print_skipped(skipped: &[String]) {
    if skipped.is_empty() {
        return;
    }
    println!("\nSkipped files:");
    for file in skipped {
        println!("  - {}", file);
    }
}

fn describe_record(record: &SnapshotRecord) -> String {
    match record.kind {
        RecordKind::Function => format!("{} (function)", record.identity_key()),
        RecordKind::SqlBlock { sql_type } => {
            format!("{} (sql {})", record.identity_key(), sql_type)
        }
    }
}

fn print_records(title: &str, icon: &str, records: &[&SnapshotRecord]) {
    if records.is_empty() {
        return;
    }
    println!("\n{}:", title);
    for record in records {
        println!("  {} {} [{}]", icon, describe_record(record), record.classification);
    }
}

fn print_changes(title: &str, icon: &str, changes: &[&RecordChange]) {
    if changes.is_empty() {
        return;
    }
    println!("\n{}:", title);
    for change in changes {
        if change.previous.classification == change.current.classification {
            println!(
                "  {} {} [{}]",
                icon,
                describe_record(&change.current),
                change.current.classification
            );
        } else {
            println!(
                "  {} {} [{} → {}]",
                icon,
                describe_record(&change.current),
                change.previous.classification,
                change.current.classification
            );
        }
    }
}

/// Print a diff in human-readable form
pub fn print_diff_text(diff: &DiffResult) {
    if diff.is_empty() {
        println!("No changes since the last run.");
        return;
    }

    println!("\nChanges since the last run:");
    println!("===========================");

    print_records("Added", "+", &diff.added.iter().collect::<Vec<_>>());
    print_records("Removed", "-", &diff.removed.iter().collect::<Vec<_>>());
    print_changes("Modified", "~", &diff.modified.iter().collect::<Vec<_>>());
    print_changes(
        "Reclassified",
        "⇄",
        &diff.reclassified.iter().collect::<Vec<_>>(),
    );

    println!("\n{}", diff.summary());
}

/// Print the result of a run or preview
pub fn print_run_text(outcome: &RunOutcome) {
    let snapshot = &outcome.snapshot;
    println!(
        "{} entities ({} functions, {} SQL blocks): {} business logic, {} pipeline code",
        outcome.entities.len(),
        snapshot.functions.len(),
        snapshot.sql_blocks.len(),
        outcome.entities.count(Classification::BusinessLogic),
        outcome.entities.count(Classification::PipelineCode)
    );
    if let Some(ref commit) = snapshot.commit {
        println!("Commit: {}", commit);
    }

    print_diff_text(&outcome.diff);
    print_skipped(&outcome.skipped_files);

    if let Some(ref path) = outcome.snapshot_path {
        println!("\n✓ Snapshot saved to {:?}", path);
    }
}

/// Print the snapshot history
pub fn print_history_text(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("No archived snapshots.");
        return;
    }

    println!("Snapshot history (oldest first):");
    for entry in entries {
        let name = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match (entry.timestamp, entry.entities) {
            (Some(timestamp), Some(entities)) => println!(
                "  {}  {}  {} entities  commit {}",
                name,
                timestamp.to_rfc3339(),
                entities,
                entry.commit.as_deref().unwrap_or("-")
            ),
            _ => println!("  {}  (unreadable)", name),
        }
    }
}

/// History entry as printed in JSON mode
#[derive(Debug, Serialize)]
pub struct HistoryLine {
    pub path: String,
    pub timestamp: Option<String>,
    pub commit: Option<String>,
    pub entities: Option<usize>,
}

impl From<&HistoryEntry> for HistoryLine {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            path: entry.path.display().to_string(),
            timestamp: entry.timestamp.map(|t| t.to_rfc3339()),
            commit: entry.commit.clone(),
            entities: entry.entities,
        }
    }
}

/// Print the configuration in effect
pub fn print_config_text(tree: &SourceTree) {
    let config = tree.config();

    println!("rulescope Configuration");
    println!("=======================\n");

    println!("Python extensions: {}", config.python_extensions.join(", "));
    println!("SQL extensions: {}", config.sql_extensions.join(", "));

    println!("\nExcluded directories:");
    for dir in &config.exclude_dirs {
        println!("  - {}", dir);
    }

    println!("\nSnapshot directory: {:?}", tree.snapshot_dir());

    println!("\nClassifier:");
    println!("  Assistant fallback: {}", config.classifier.use_assistant);
    println!("  Max excerpt chars: {}", config.classifier.max_excerpt_chars);
    println!("  Max concurrency: {}", config.classifier.max_concurrency);

    if let Some(ref endpoint) = config.llm.endpoint {
        println!("\nLLM endpoint: {}", endpoint);
    }
    if let Some(ref model) = config.llm.model {
        println!("LLM model: {}", model);
    }
    println!("LLM timeout: {}s", config.llm.timeout_secs);
}
