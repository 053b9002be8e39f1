use rulescope::classify::{Classification, Confidence, DecisionSource};
use rulescope::extract::SqlType;
use rulescope::llm::MockAssistant;
use rulescope::pipeline::{Pipeline, RunRequest};
use rulescope::repo::SourceTree;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const ETL_PY: &str = r#"import pandas as pd


def load_orders(spark, path):
    return spark.read.parquet(path)


def classify_growth(pct_change):
    """BUSINESS_RULE: RED if increase >= 50%"""
    df = load_orders(None, "orders")
    if pct_change >= 50:
        return "RED"
    return "GREEN"


def helper(x):
    return x + 1


def run_report(conn):
    return conn.execute("""
        SELECT region, SUM(amount) AS total
        FROM sales
        GROUP BY region
    """)
"#;

const ORDERS_SQL: &str = "-- name: get_active_orders
SELECT order_id FROM orders WHERE total_amount > 10000;

CREATE OR REPLACE VIEW reporting.big_orders AS
SELECT order_id, total_amount FROM orders WHERE total_amount > 50000;
";

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn source_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "jobs/etl.py", ETL_PY);
    write(dir.path(), "sql/orders.sql", ORDERS_SQL);
    write(dir.path(), ".venv/lib/vendored.py", "def load_vendor():\n    pass\n");
    dir
}

fn pipeline(root: &Path) -> Pipeline {
    Pipeline::new(SourceTree::open(root).unwrap())
}

#[tokio::test]
async fn test_first_run_reports_everything_added() {
    let dir = source_tree();
    let outcome = pipeline(dir.path()).run(&RunRequest::default()).await.unwrap();

    let names: Vec<&str> = outcome
        .diff
        .added
        .functions
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec!["classify_growth", "helper", "load_orders", "run_report"]
    );
    // two statements from the .sql file plus one embedded query
    assert_eq!(outcome.diff.added.sql_blocks.len(), 3);
    assert!(outcome.diff.removed.is_empty());
    assert!(outcome.diff.modified.is_empty());
    assert!(outcome.diff.reclassified.is_empty());
    assert!(outcome.snapshot_path.is_some());
}

#[tokio::test]
async fn test_unchanged_source_gives_empty_diff() {
    let dir = source_tree();
    let pipeline = pipeline(dir.path());

    pipeline.run(&RunRequest::default()).await.unwrap();
    let second = pipeline.run(&RunRequest::default()).await.unwrap();

    assert!(second.diff.is_empty());
    assert_eq!(pipeline.store().history().unwrap().len(), 1);
}

#[tokio::test]
async fn test_marker_wins_over_pipeline_patterns() {
    let dir = source_tree();
    let outcome = pipeline(dir.path()).extract(None).await.unwrap();

    let growth = outcome
        .entities
        .functions
        .iter()
        .find(|c| c.entity.name == "classify_growth")
        .unwrap();
    assert_eq!(
        growth.classification.classification,
        Classification::BusinessLogic
    );
    assert_eq!(growth.classification.confidence, Confidence::High);
    assert_eq!(growth.classification.source, DecisionSource::Marker);

    let load = outcome
        .entities
        .functions
        .iter()
        .find(|c| c.entity.name == "load_orders")
        .unwrap();
    assert_eq!(load.classification.classification, Classification::PipelineCode);
}

#[tokio::test]
async fn test_sql_entities() {
    let dir = source_tree();
    let outcome = pipeline(dir.path()).extract(None).await.unwrap();
    let blocks = &outcome.entities.sql_blocks;

    let query = blocks
        .iter()
        .find(|c| c.entity.name == "get_active_orders")
        .unwrap();
    assert_eq!(query.entity.sql_type, SqlType::Query);
    assert_eq!(query.entity.tables, vec!["orders"]);
    assert_eq!(query.entity.file_path, "sql/orders.sql");

    let view = blocks
        .iter()
        .find(|c| c.entity.name == "reporting.big_orders")
        .unwrap();
    assert_eq!(view.entity.sql_type, SqlType::View);

    let embedded = blocks.iter().find(|c| c.entity.embedded).unwrap();
    assert_eq!(embedded.entity.name, "embedded_sql_1");
    assert_eq!(embedded.entity.file_path, "jobs/etl.py");
    assert_eq!(embedded.entity.tables, vec!["sales"]);
}

#[tokio::test]
async fn test_edit_is_reported_as_modified() {
    let dir = source_tree();
    let pipeline = pipeline(dir.path());
    pipeline.run(&RunRequest::default()).await.unwrap();

    let edited = ETL_PY.replace(
        "return spark.read.parquet(path)",
        "return spark.read.parquet(path).dropDuplicates()",
    );
    write(dir.path(), "jobs/etl.py", &edited);

    let outcome = pipeline.run(&RunRequest::default()).await.unwrap();
    let modified: Vec<String> = outcome
        .diff
        .modified
        .iter()
        .map(|c| c.identity_key())
        .collect();
    assert_eq!(modified, vec!["jobs/etl.py:load_orders"]);
    assert!(outcome.diff.reclassified.is_empty());
    assert!(outcome.diff.added.is_empty());
    assert!(outcome.diff.removed.is_empty());
}

#[tokio::test]
async fn test_removed_file_is_reported() {
    let dir = source_tree();
    let pipeline = pipeline(dir.path());
    pipeline.run(&RunRequest::default()).await.unwrap();

    fs::remove_file(dir.path().join("sql/orders.sql")).unwrap();
    let outcome = pipeline.run(&RunRequest::default()).await.unwrap();

    assert_eq!(outcome.diff.removed.sql_blocks.len(), 2);
    assert!(outcome.diff.removed.functions.is_empty());
}

#[tokio::test]
async fn test_preview_does_not_save() {
    let dir = source_tree();
    let pipeline = pipeline(dir.path());

    let outcome = pipeline.preview(&RunRequest::default()).await.unwrap();
    assert!(outcome.snapshot_path.is_none());
    assert!(!outcome.diff.added.is_empty());
    assert!(pipeline.store().load_latest().is_none());
}

#[tokio::test]
async fn test_assistant_label_change_is_reclassified() {
    let dir = source_tree();
    let tree = SourceTree::open(dir.path()).unwrap();

    // first run: no assistant, helper defaults to pipeline code
    let plain = Pipeline::new(tree.clone());
    plain.run(&RunRequest::default()).await.unwrap();

    let mut mock = MockAssistant::new();
    mock.add_response(
        "`helper`",
        r#"{"classification": "business_logic", "reason": "increments a counter rule"}"#,
    );
    let assisted = Pipeline::new(tree).with_assistant(Arc::new(mock));
    let request = RunRequest {
        use_assistant: Some(true),
        ..Default::default()
    };
    let outcome = assisted.run(&request).await.unwrap();

    let reclassified: Vec<String> = outcome
        .diff
        .reclassified
        .iter()
        .map(|c| c.identity_key())
        .collect();
    assert_eq!(reclassified, vec!["jobs/etl.py:helper"]);
    assert!(outcome.diff.modified.is_empty());

    let change = &outcome.diff.reclassified.functions[0];
    assert_eq!(change.previous.classification, Classification::PipelineCode);
    assert_eq!(change.current.classification, Classification::BusinessLogic);
}

#[tokio::test]
async fn test_unreadable_file_is_skipped() {
    let dir = source_tree();
    fs::write(dir.path().join("jobs/broken.py"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

    let outcome = pipeline(dir.path()).extract(None).await.unwrap();
    assert_eq!(outcome.skipped_files, vec!["jobs/broken.py"]);
    assert_eq!(outcome.entities.functions.len(), 4);
}

#[tokio::test]
async fn test_explicit_commit_is_recorded() {
    let dir = source_tree();
    let request = RunRequest {
        git_ref: "refs/heads/main".to_string(),
        commit: "0123abcd".to_string(),
        message: "Tighten order thresholds".to_string(),
        use_assistant: Some(false),
    };
    let outcome = pipeline(dir.path()).run(&request).await.unwrap();

    assert_eq!(outcome.snapshot.commit.as_deref(), Some("0123abcd"));
    assert_eq!(outcome.snapshot.git_ref.as_deref(), Some("refs/heads/main"));
}
