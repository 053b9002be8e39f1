//! rulescope - Business logic extraction and classification drift tracking
//!
//! This library extracts Python functions and SQL statements from a source tree,
//! classifies each one as business logic or pipeline code, and tracks how those
//! classifications change from one run to the next.

pub mod classify;
pub mod cli;
pub mod drift;
pub mod extract;
pub mod llm;
pub mod pipeline;
pub mod repo;
pub mod storage;

/// Re-export commonly used types
pub use classify::{Classification, ClassificationResult, ClassifiedEntities, Classifier, Confidence};
pub use drift::{diff_snapshots, DiffResult};
pub use extract::{FunctionEntity, SourceEntity, SqlBlock};
pub use pipeline::{Pipeline, RunOutcome, RunRequest};
pub use repo::SourceTree;
pub use storage::{ExtractionSnapshot, SnapshotStore};

/// Application-wide error type
pub use anyhow::Result;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "rulescope";
