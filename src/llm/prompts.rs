//! Prompt templates for assistant classification

use crate::extract::SourceEntity;

/// Appended to a source excerpt that was cut short
pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// Prompt for classifying a single entity
pub struct ClassificationPrompt;

impl ClassificationPrompt {
    /// Generate a classification prompt for an entity
    pub fn generate(entity: &dyn SourceEntity, max_excerpt_chars: usize) -> String {
        let mut prompt = String::new();

        prompt.push_str(CLASSIFICATION_SYSTEM_PROMPT);
        prompt.push('\n');

        prompt.push_str("## Entity\n\n");
        prompt.push_str(&format!("**Kind:** {}\n", entity.kind()));
        prompt.push_str(&format!("**Name:** `{}`\n", entity.name()));
        if let Some(description) = entity.description() {
            prompt.push_str(&format!("**Description:** {}\n", description));
        }

        prompt.push_str(&format!(
            "\n**Source:**\n```\n{}\n```\n\n",
            truncate_excerpt(entity.source_code(), max_excerpt_chars)
        ));

        prompt.push_str(CLASSIFICATION_INSTRUCTIONS);

        prompt
    }
}

/// Cap source text at `max_chars` characters, marking the cut
pub fn truncate_excerpt(source: &str, max_chars: usize) -> String {
    match source.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &source[..cut], TRUNCATION_MARKER),
        None => source.to_string(),
    }
}

const CLASSIFICATION_SYSTEM_PROMPT: &str = r#"You classify code from a data platform into exactly one of two categories.

business_logic: code that encodes domain decisions. Thresholds, limits, validation rules, policies,
compliance checks, SLA or KPI calculations, status or score derivation (for example RED / AMBER /
GREEN ratings), percentage or rate-of-change rules.

pipeline_code: code that moves or prepares data. Loading, reading, writing, saving, extracting,
transforming or ingesting data, setting up connections, sessions or clients, configuration, and
creating tables, databases or schemas.
"#;

const CLASSIFICATION_INSTRUCTIONS: &str = r#"## Instructions

Respond with a JSON object containing exactly these fields:

```json
{
  "classification": "business_logic",
  "reason": "One short sentence explaining the decision"
}
```

The classification must be either "business_logic" or "pipeline_code".

Respond ONLY with the JSON object, no additional text.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SqlExtractor;

    #[test]
    fn test_truncate_excerpt() {
        assert_eq!(truncate_excerpt("short", 10), "short");
        assert_eq!(truncate_excerpt("exactly", 7), "exactly");
        assert_eq!(
            truncate_excerpt("abcdefgh", 3),
            format!("abc{}", TRUNCATION_MARKER)
        );
        // multi-byte characters are counted, not bytes
        assert_eq!(truncate_excerpt("ééé", 2), format!("éé{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_classification_prompt_generation() {
        let blocks = SqlExtractor::new().extract_file(
            "sql/kpi.sql",
            "-- Weekly churn KPI\n-- name: churn_rate\nSELECT customer_id FROM churn;",
        );
        let prompt = ClassificationPrompt::generate(&blocks[0], 20);

        assert!(prompt.contains("`churn_rate`"));
        assert!(prompt.contains("**Description:** Weekly churn KPI"));
        assert!(prompt.contains(TRUNCATION_MARKER));
        assert!(prompt.contains("business_logic"));
        assert!(prompt.contains("pipeline_code"));
        assert!(prompt.contains("JSON"));
    }
}
