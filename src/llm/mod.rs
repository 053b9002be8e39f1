//! External classification assistant
//!
//! This module handles:
//! - The [`Assistant`] seam the classifier calls when heuristics are inconclusive
//! - An HTTP client for Ollama and OpenAI-compatible endpoints
//! - The fixed classification prompt and strict verdict parsing

mod client;
mod prompts;

pub use client::{LlmClient, LlmConfig, LlmProvider, MockAssistant};
pub use prompts::{truncate_excerpt, ClassificationPrompt, TRUNCATION_MARKER};

use crate::classify::Classification;
use serde::Deserialize;
use thiserror::Error;

/// Ways an assistant call can fail
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("assistant returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("assistant reported an error: {0}")]
    Reported(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invalid classification label: {0:?}")]
    InvalidLabel(String),
}

/// A text-completion collaborator used for fallback classification
#[async_trait::async_trait]
pub trait Assistant: Send + Sync {
    /// Send a prompt and return the terminal response text
    async fn complete(&self, prompt: &str) -> Result<String, AssistantError>;
}

/// A parsed assistant decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantVerdict {
    pub classification: Classification,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    classification: String,
    #[serde(default)]
    reason: String,
}

/// Parse the assistant's JSON answer.
///
/// The response must be a single JSON object; one surrounding Markdown code
/// fence is tolerated. Anything else is a protocol violation.
pub fn parse_verdict(content: &str) -> Result<AssistantVerdict, AssistantError> {
    let body = strip_code_fence(content.trim());
    if body.is_empty() {
        return Err(AssistantError::Malformed("empty response".to_string()));
    }

    let raw: RawVerdict =
        serde_json::from_str(body).map_err(|e| AssistantError::Malformed(e.to_string()))?;

    let classification = match raw.classification.trim() {
        "business_logic" => Classification::BusinessLogic,
        "pipeline_code" => Classification::PipelineCode,
        other => return Err(AssistantError::InvalidLabel(other.to_string())),
    };

    let reason = raw.reason.trim();
    Ok(AssistantVerdict {
        classification,
        reason: if reason.is_empty() {
            "no reason given".to_string()
        } else {
            reason.to_string()
        },
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    // Drop the info string (e.g. "json") on the opening fence line
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };

    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verdict() {
        let verdict =
            parse_verdict(r#"{"classification": "business_logic", "reason": "applies a discount rule"}"#)
                .unwrap();
        assert_eq!(verdict.classification, Classification::BusinessLogic);
        assert_eq!(verdict.reason, "applies a discount rule");
    }

    #[test]
    fn test_parse_verdict_in_code_fence() {
        let content = "```json\n{\"classification\": \"pipeline_code\", \"reason\": \"moves files\"}\n```";
        let verdict = parse_verdict(content).unwrap();
        assert_eq!(verdict.classification, Classification::PipelineCode);
    }

    #[test]
    fn test_parse_verdict_rejects_bad_label() {
        let err = parse_verdict(r#"{"classification": "both", "reason": "?"}"#).unwrap_err();
        assert!(matches!(err, AssistantError::InvalidLabel(label) if label == "both"));
    }

    #[test]
    fn test_parse_verdict_rejects_prose() {
        let err = parse_verdict("I think this is business logic.").unwrap_err();
        assert!(matches!(err, AssistantError::Malformed(_)));

        let err = parse_verdict("   ").unwrap_err();
        assert!(matches!(err, AssistantError::Malformed(_)));
    }
}
