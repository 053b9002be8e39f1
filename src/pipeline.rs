//! Extraction → classification → diff pipeline
//!
//! The entry point a trigger (CLI, watch loop, webhook) calls with a [`RunRequest`].

use crate::classify::{ClassifiedEntities, Classifier};
use crate::drift::{diff_snapshots, DiffResult};
use crate::extract::extract_tree;
use crate::llm::{Assistant, LlmClient, LlmConfig};
use crate::repo::SourceTree;
use crate::storage::{ExtractionSnapshot, SnapshotStore};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// What a trigger hands to a run
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Ref that triggered the run, e.g. `refs/heads/main`
    pub git_ref: String,
    /// Commit id; empty means "resolve HEAD if the tree is a git checkout"
    pub commit: String,
    pub message: String,
    /// Overrides `classifier.use_assistant` from the configuration
    pub use_assistant: Option<bool>,
}

/// Classified entities without any snapshot bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct ExtractOutcome {
    pub entities: ClassifiedEntities,
    pub skipped_files: Vec<String>,
}

/// Everything a full run produces
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub entities: ClassifiedEntities,
    pub diff: DiffResult,
    pub snapshot: ExtractionSnapshot,
    pub skipped_files: Vec<String>,
    /// Where the snapshot was written; `None` for previews
    pub snapshot_path: Option<PathBuf>,
}

/// Runs the pipeline over one source tree
pub struct Pipeline {
    tree: SourceTree,
    assistant: Option<Arc<dyn Assistant>>,
}

impl Pipeline {
    pub fn new(tree: SourceTree) -> Self {
        Self {
            tree,
            assistant: None,
        }
    }

    /// Use this assistant instead of building an HTTP client from configuration
    pub fn with_assistant(mut self, assistant: Arc<dyn Assistant>) -> Self {
        self.assistant = Some(assistant);
        self
    }

    pub fn tree(&self) -> &SourceTree {
        &self.tree
    }

    /// Snapshot store for this tree
    pub fn store(&self) -> SnapshotStore {
        SnapshotStore::new(self.tree.snapshot_dir())
    }

    fn classifier(&self, use_assistant: Option<bool>) -> Result<Classifier> {
        let settings = &self.tree.config().classifier;
        let classifier = Classifier::new(settings);

        if !use_assistant.unwrap_or(settings.use_assistant) {
            return Ok(classifier);
        }

        let assistant = match &self.assistant {
            Some(assistant) => Arc::clone(assistant),
            None => {
                let config = LlmConfig::from_settings(&self.tree.config().llm);
                tracing::info!(
                    "Assistant fallback enabled ({} at {})",
                    config.model,
                    config.endpoint
                );
                Arc::new(LlmClient::new(config)?) as Arc<dyn Assistant>
            }
        };

        Ok(classifier.with_assistant(assistant))
    }

    /// Extract and classify without touching the snapshot store
    pub async fn extract(&self, use_assistant: Option<bool>) -> Result<ExtractOutcome> {
        let classifier = self.classifier(use_assistant)?;

        let tree = self.tree.clone();
        let mut extraction = tokio::task::spawn_blocking(move || extract_tree(&tree))
            .await
            .context("Extraction task failed")??;

        let skipped_files = std::mem::take(&mut extraction.skipped_files);
        let entities = classifier.classify_extraction(extraction).await;

        Ok(ExtractOutcome {
            entities,
            skipped_files,
        })
    }

    /// Diff against the latest snapshot without saving
    pub async fn preview(&self, request: &RunRequest) -> Result<RunOutcome> {
        self.execute(request, false).await
    }

    /// Full run: extract, classify, diff, save
    pub async fn run(&self, request: &RunRequest) -> Result<RunOutcome> {
        self.execute(request, true).await
    }

    async fn execute(&self, request: &RunRequest, save: bool) -> Result<RunOutcome> {
        let commit = non_empty(&request.commit).or_else(|| self.tree.head_commit());
        let git_ref = non_empty(&request.git_ref);

        tracing::info!(
            "Run started (ref: {}, commit: {}){}",
            git_ref.as_deref().unwrap_or("-"),
            commit.as_deref().unwrap_or("-"),
            non_empty(&request.message)
                .map(|m| format!(": {}", m.lines().next().unwrap_or_default()))
                .unwrap_or_default()
        );

        let ExtractOutcome {
            entities,
            skipped_files,
        } = self.extract(request.use_assistant).await?;

        let store = self.store();
        let previous = store.load_latest();
        let snapshot = ExtractionSnapshot::from_classified(&entities, commit, git_ref);
        let diff = diff_snapshots(previous.as_ref(), &snapshot);

        let snapshot_path = if save {
            Some(store.save(&snapshot)?)
        } else {
            None
        };

        Ok(RunOutcome {
            entities,
            diff,
            snapshot,
            skipped_files,
            snapshot_path,
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
