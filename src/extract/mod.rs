//! Source entity extraction module
//!
//! This module turns raw source text into entities:
//! - Python function definitions (using tree-sitter)
//! - SQL statements, from `.sql` files and from SQL embedded in Python string literals
//!
//! Extraction is per file and independent, so a whole tree is fanned out with rayon.

pub mod python;
pub mod sql;
pub mod syntax;

pub use python::{FunctionEntity, Parameter, PythonExtractor};
pub use sql::{SqlBlock, SqlExtractor, SqlType};
pub use syntax::{NodeRole, SyntaxNode};

use crate::repo::SourceTree;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::LazyLock;

/// Compute a stable hash for content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Explicit business rule annotation: `BUSINESS_RULE: <text>` up to end of line
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)\bBUSINESS[_ ]RULE\b[ \t]*[:\-]?[ \t]*(.*)$").expect("valid marker regex")
});

/// Scan texts for business rule markers.
///
/// Returns the free text following each tag, trimmed, in order of appearance.
/// Duplicates (the same marker seen in both a docstring and the source slice)
/// are collapsed to their first occurrence.
pub fn scan_markers<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut markers: Vec<String> = Vec::new();

    for text in texts {
        for caps in MARKER_RE.captures_iter(text) {
            let raw = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let marker = raw
                .trim()
                .trim_end_matches(['"', '\''])
                .trim()
                .to_string();

            if !marker.is_empty() && !markers.contains(&marker) {
                markers.push(marker);
            }
        }
    }

    markers
}

/// Kind of extracted entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Function,
    SqlBlock,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Function => write!(f, "function"),
            EntityKind::SqlBlock => write!(f, "sql_block"),
        }
    }
}

/// Read-only view shared by every extracted entity
pub trait SourceEntity {
    /// Which variant this entity is
    fn kind(&self) -> EntityKind;

    /// Entity name (function name or derived SQL name)
    fn name(&self) -> &str;

    /// File path relative to the source root
    fn file_path(&self) -> &str;

    /// Verbatim source slice
    fn source_code(&self) -> &str;

    /// Explicit business rule annotations found in the entity
    fn business_rule_markers(&self) -> &[String];

    /// Docstring or leading-comment description, if any
    fn description(&self) -> Option<&str>;

    /// Identity key used when diffing snapshots
    fn identity_key(&self) -> String {
        format!("{}:{}", self.file_path(), self.name())
    }

    /// Content hash of the source slice
    fn hash(&self) -> String {
        content_hash(self.source_code())
    }
}

/// Everything extracted from one source tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub functions: Vec<FunctionEntity>,
    pub sql_blocks: Vec<SqlBlock>,
    /// Files that could not be read or parsed and were skipped
    pub skipped_files: Vec<String>,
}

impl Extraction {
    /// Total number of entities
    pub fn len(&self) -> usize {
        self.functions.len() + self.sql_blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a single file produced
enum FileOutcome {
    Extracted {
        functions: Vec<FunctionEntity>,
        sql_blocks: Vec<SqlBlock>,
    },
    Skipped(String),
}

/// Extract all entities below a source tree.
///
/// Python files yield functions and embedded SQL, SQL files yield statements.
/// A file that fails to read or parse is logged and skipped.
pub fn extract_tree(tree: &SourceTree) -> anyhow::Result<Extraction> {
    let python_files = tree.python_files()?;
    let sql_files = tree.sql_files()?;

    tracing::info!(
        "Extracting from {} python and {} sql files",
        python_files.len(),
        sql_files.len()
    );

    let python_outcomes: Vec<FileOutcome> = python_files
        .par_iter()
        .map_init(PythonExtractor::new, |extractor, path| {
            let extractor = match extractor {
                Ok(extractor) => extractor,
                Err(e) => {
                    tracing::warn!("Python parser unavailable, skipping {:?}: {}", path, e);
                    return FileOutcome::Skipped(SourceTree::display_path(path));
                }
            };
            extract_python_file(tree, extractor, path)
        })
        .collect();

    let sql_extractor = SqlExtractor::new();
    let sql_outcomes: Vec<FileOutcome> = sql_files
        .par_iter()
        .map(|path| extract_sql_file(tree, &sql_extractor, path))
        .collect();

    let mut extraction = Extraction::default();
    for outcome in python_outcomes.into_iter().chain(sql_outcomes) {
        match outcome {
            FileOutcome::Extracted {
                functions,
                sql_blocks,
            } => {
                extraction.functions.extend(functions);
                extraction.sql_blocks.extend(sql_blocks);
            }
            FileOutcome::Skipped(path) => extraction.skipped_files.push(path),
        }
    }

    tracing::info!(
        "Extracted {} functions and {} SQL blocks ({} files skipped)",
        extraction.functions.len(),
        extraction.sql_blocks.len(),
        extraction.skipped_files.len()
    );

    Ok(extraction)
}

fn extract_python_file(
    tree: &SourceTree,
    extractor: &mut PythonExtractor,
    path: &Path,
) -> FileOutcome {
    let file_path = SourceTree::display_path(path);

    let content = match tree.read(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("Failed to read {}: {:#}", file_path, e);
            return FileOutcome::Skipped(file_path);
        }
    };

    let functions = match extractor.extract_source(&file_path, &content) {
        Ok(functions) => functions,
        Err(e) => {
            tracing::warn!("Failed to parse {}: {:#}", file_path, e);
            return FileOutcome::Skipped(file_path);
        }
    };

    let sql_blocks = SqlExtractor::new().extract_embedded(&file_path, &content);
    tracing::debug!(
        "{}: {} functions, {} embedded SQL blocks",
        file_path,
        functions.len(),
        sql_blocks.len()
    );

    FileOutcome::Extracted {
        functions,
        sql_blocks,
    }
}

fn extract_sql_file(tree: &SourceTree, extractor: &SqlExtractor, path: &Path) -> FileOutcome {
    let file_path = SourceTree::display_path(path);

    match tree.read(path) {
        Ok(content) => {
            let sql_blocks = extractor.extract_file(&file_path, &content);
            tracing::debug!("{}: {} SQL statements", file_path, sql_blocks.len());
            FileOutcome::Extracted {
                functions: Vec::new(),
                sql_blocks,
            }
        }
        Err(e) => {
            tracing::warn!("Failed to read {}: {:#}", file_path, e);
            FileOutcome::Skipped(file_path)
        }
    }
}
