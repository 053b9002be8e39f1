//! Fixed pattern sets for business/pipeline scoring

use regex::Regex;
use std::sync::LazyLock;

/// A named, case-insensitive signal
pub struct Pattern {
    pub name: &'static str,
    regex: Regex,
}

impl Pattern {
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

fn compile(table: &[(&'static str, &str)]) -> Vec<Pattern> {
    table
        .iter()
        .map(|(name, pattern)| Pattern {
            name,
            regex: Regex::new(&format!("(?i){}", pattern)).expect("valid classifier pattern"),
        })
        .collect()
}

/// Vocabulary of domain decisions
pub static BUSINESS_PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    compile(&[
        ("threshold", r"threshold"),
        ("limit", r"_limit\b|\blimit_|\blimits\b|\blimit\s*(?:=|>|<|exceed)"),
        ("validation", r"\bvalidat(?:e|es|ed|ion|ions|or)|\bis_valid|\bvalid_"),
        ("rule", r"\brules?\b|_rules?\b|\brule_"),
        ("policy", r"polic(?:y|ies)"),
        ("compliance", r"complian(?:ce|t)"),
        ("sla", r"\bsla\b|_sla\b|\bsla_|service[_ ]level"),
        ("kpi", r"\bkpis?\b|_kpi|kpi_"),
        ("metric", r"metric"),
        ("status calculation", r"calc(?:ulate)?\w*?_?(?:rag|status|score)"),
        ("percentage", r"percent(?:age)?|\bpct\b|_pct\b|\bpct_"),
        (
            "rate of change",
            r"rate[_ ]of[_ ]change|change[_ ]rate|growth[_ ]rate|(?:increase|decrease)[sd]?\s*[<>]=?",
        ),
        ("red/amber/green", r"\b(?:red|amber|green)\b|\brag\b|\brag_|_rag\b"),
    ])
});

/// Vocabulary of data movement and setup
pub static PIPELINE_PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    compile(&[
        ("load/read/write/save prefix", r"\b(?:load|read|write|save)_\w"),
        ("extract/transform/ingest prefix", r"\b(?:extract|transform|ingest)_\w"),
        (
            "setup prefix",
            r"\b(?:setup|init|initialize|configure|connect)(?:_\w|\s*\()",
        ),
        (
            "tabular read",
            r"\.read_(?:csv|parquet|json|sql|excel|table)\b|spark\.read\b|\.read\.(?:format|csv|parquet|json|table|load)\b",
        ),
        (
            "tabular write",
            r"\.to_(?:csv|parquet|sql|json|excel)\b|\.write\.|saveAsTable|insertInto|\.save\(",
        ),
        (
            "connection",
            r"(?:\.connect|create_engine|get_connection|\.cursor)\s*\(|SparkSession|\bsession\s*=|\.client\s*\(|\bclient\s*=",
        ),
        (
            "schema creation",
            r"\bcreate\s+(?:or\s+replace\s+)?(?:table|database|schema)\b|\bcreate_(?:table|database|schema)\b",
        ),
    ])
});

/// Names of the patterns in `set` matching `text`, each counted once
pub fn matching(set: &[Pattern], text: &str) -> Vec<&'static str> {
    set.iter()
        .filter(|p| p.is_match(text))
        .map(|p| p.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_patterns() {
        let hits = matching(
            &BUSINESS_PATTERNS,
            "def calculate_rag_status(pct_change):\n    if pct_change >= 50:\n        return 'RED'",
        );
        assert_eq!(hits, vec!["status calculation", "percentage", "red/amber/green"]);
    }

    #[test]
    fn test_pipeline_patterns() {
        let hits = matching(
            &PIPELINE_PATTERNS,
            "def load_orders(spark, path):\n    return spark.read.parquet(path)",
        );
        assert_eq!(hits, vec!["load/read/write/save prefix", "tabular read"]);

        let hits = matching(&PIPELINE_PATTERNS, "CREATE TABLE IF NOT EXISTS staging.orders (id INT);");
        assert_eq!(hits, vec!["schema creation"]);
    }

    #[test]
    fn test_neutral_text_scores_nothing() {
        let text = "def helper(x):\n    return x + 1";
        assert!(matching(&BUSINESS_PATTERNS, text).is_empty());
        assert!(matching(&PIPELINE_PATTERNS, text).is_empty());
    }

    #[test]
    fn test_dunder_init_is_not_setup() {
        assert!(matching(&PIPELINE_PATTERNS, "def __init__(self):\n    pass").is_empty());
    }
}
