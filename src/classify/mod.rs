//! Entity classification module
//!
//! Every entity gets exactly one label through an ordered procedure, first match wins:
//! 1. Explicit business rule markers
//! 2. Pattern scoring (business vs pipeline vocabulary)
//! 3. Tie-break on the two scores
//! 4. Optional assistant fallback for ambiguous entities
//! 5. Default to pipeline code

pub mod patterns;

use crate::extract::{Extraction, FunctionEntity, SourceEntity, SqlBlock};
use crate::llm::{parse_verdict, Assistant, ClassificationPrompt};
use crate::repo::ClassifierSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Classification label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    BusinessLogic,
    PipelineCode,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::BusinessLogic => write!(f, "business_logic"),
            Classification::PipelineCode => write!(f, "pipeline_code"),
        }
    }
}

/// Confidence tier, ordered `Low < Medium < High`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// Which stage of the procedure produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    Marker,
    Pattern,
    Assistant,
    Default,
}

/// Outcome of classifying one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub classification: Classification,
    pub confidence: Confidence,
    /// Human-readable audit trail
    pub reason: String,
    pub source: DecisionSource,
}

/// An entity with its classification attached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classified<E> {
    #[serde(flatten)]
    pub entity: E,
    pub classification: ClassificationResult,
}

/// The classified entity set handed to renderers and the snapshot store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifiedEntities {
    pub functions: Vec<Classified<FunctionEntity>>,
    pub sql_blocks: Vec<Classified<SqlBlock>>,
}

impl ClassifiedEntities {
    pub fn len(&self) -> usize {
        self.functions.len() + self.sql_blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entities carrying a label
    pub fn count(&self, classification: Classification) -> usize {
        let functions = self
            .functions
            .iter()
            .filter(|c| c.classification.classification == classification)
            .count();
        let sql_blocks = self
            .sql_blocks
            .iter()
            .filter(|c| c.classification.classification == classification)
            .count();
        functions + sql_blocks
    }
}

/// Result of the deterministic stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Decided(ClassificationResult),
    /// Scores tied (both zero or both equal), assistant or default decides
    Ambiguous { business: usize, pipeline: usize },
}

/// Ordered marker/pattern classifier with optional assistant fallback
pub struct Classifier {
    assistant: Option<Arc<dyn Assistant>>,
    max_excerpt_chars: usize,
    max_concurrency: usize,
}

impl Classifier {
    /// Create a deterministic classifier
    pub fn new(settings: &ClassifierSettings) -> Self {
        Self {
            assistant: None,
            max_excerpt_chars: settings.max_excerpt_chars,
            max_concurrency: settings.max_concurrency.max(1),
        }
    }

    /// Enable the assistant fallback
    pub fn with_assistant(mut self, assistant: Arc<dyn Assistant>) -> Self {
        self.assistant = Some(assistant);
        self
    }

    /// Whether ambiguous entities are sent to an assistant
    pub fn uses_assistant(&self) -> bool {
        self.assistant.is_some()
    }

    /// Apply the marker, pattern and tie-break stages
    pub fn decide(&self, entity: &dyn SourceEntity) -> Decision {
        let markers = entity.business_rule_markers();
        if !markers.is_empty() {
            return Decision::Decided(ClassificationResult {
                classification: Classification::BusinessLogic,
                confidence: Confidence::High,
                reason: format!("Business rule marker: {}", markers.join("; ")),
                source: DecisionSource::Marker,
            });
        }

        let mut search_text = format!("{}\n{}", entity.name(), entity.source_code());
        if let Some(description) = entity.description() {
            search_text.push('\n');
            search_text.push_str(description);
        }

        let business = patterns::matching(&patterns::BUSINESS_PATTERNS, &search_text);
        let pipeline = patterns::matching(&patterns::PIPELINE_PATTERNS, &search_text);

        let (classification, confidence) = match (business.len(), pipeline.len()) {
            (b, 0) if b > 0 => (Classification::BusinessLogic, single_side_confidence(b)),
            (0, p) if p > 0 => (Classification::PipelineCode, single_side_confidence(p)),
            (b, p) if b > p => (Classification::BusinessLogic, Confidence::Medium),
            (b, p) if p > b => (Classification::PipelineCode, Confidence::Medium),
            (b, p) => {
                return Decision::Ambiguous {
                    business: b,
                    pipeline: p,
                }
            }
        };

        Decision::Decided(ClassificationResult {
            classification,
            confidence,
            reason: pattern_reason(&business, &pipeline),
            source: DecisionSource::Pattern,
        })
    }

    /// Classify a single entity
    pub async fn classify(&self, entity: &dyn SourceEntity) -> ClassificationResult {
        match self.decide(entity) {
            Decision::Decided(result) => result,
            Decision::Ambiguous { business, pipeline } => {
                let verdict = match &self.assistant {
                    Some(assistant) => {
                        let prompt = ClassificationPrompt::generate(entity, self.max_excerpt_chars);
                        consult(Arc::clone(assistant), entity.identity_key(), prompt).await
                    }
                    None => None,
                };
                verdict.unwrap_or_else(|| {
                    default_result(business, pipeline, self.assistant.is_some())
                })
            }
        }
    }

    /// Classify a batch, preserving input order.
    ///
    /// Deterministic stages run inline; assistant requests for ambiguous
    /// entities run concurrently, bounded by `max_concurrency`.
    pub async fn classify_all<E: SourceEntity>(&self, entities: Vec<E>) -> Vec<Classified<E>> {
        let mut results: Vec<Option<ClassificationResult>> = Vec::with_capacity(entities.len());
        let mut ambiguous: Vec<(usize, usize, usize)> = Vec::new();
        let mut tasks = JoinSet::new();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        for (index, entity) in entities.iter().enumerate() {
            match self.decide(entity) {
                Decision::Decided(result) => results.push(Some(result)),
                Decision::Ambiguous { business, pipeline } => {
                    results.push(None);
                    ambiguous.push((index, business, pipeline));

                    if let Some(assistant) = &self.assistant {
                        let assistant = Arc::clone(assistant);
                        let semaphore = Arc::clone(&semaphore);
                        let key = entity.identity_key();
                        let prompt = ClassificationPrompt::generate(entity, self.max_excerpt_chars);

                        tasks.spawn(async move {
                            let _permit = semaphore.acquire_owned().await.ok();
                            (index, consult(assistant, key, prompt).await)
                        });
                    }
                }
            }
        }

        if !tasks.is_empty() {
            tracing::info!(
                "Consulting assistant for {} ambiguous entities (max {} concurrent)",
                tasks.len(),
                self.max_concurrency
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Some(result))) => results[index] = Some(result),
                Ok((_, None)) => {}
                Err(e) => tracing::warn!("Assistant task failed: {}", e),
            }
        }

        for (index, business, pipeline) in ambiguous {
            if results[index].is_none() {
                results[index] = Some(default_result(business, pipeline, self.uses_assistant()));
            }
        }

        entities
            .into_iter()
            .zip(results)
            .map(|(entity, result)| Classified {
                entity,
                classification: result.unwrap_or_else(|| default_result(0, 0, false)),
            })
            .collect()
    }

    /// Classify everything a tree produced
    pub async fn classify_extraction(&self, extraction: Extraction) -> ClassifiedEntities {
        let functions = self.classify_all(extraction.functions).await;
        let sql_blocks = self.classify_all(extraction.sql_blocks).await;

        let classified = ClassifiedEntities {
            functions,
            sql_blocks,
        };

        tracing::info!(
            "Classified {} entities: {} business logic, {} pipeline code",
            classified.len(),
            classified.count(Classification::BusinessLogic),
            classified.count(Classification::PipelineCode)
        );

        classified
    }
}

/// Ask the assistant once; any failure is logged and yields `None`
async fn consult(
    assistant: Arc<dyn Assistant>,
    key: String,
    prompt: String,
) -> Option<ClassificationResult> {
    let content = match assistant.complete(&prompt).await {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("Assistant fallback failed for {}: {}", key, e);
            return None;
        }
    };

    match parse_verdict(&content) {
        Ok(verdict) => {
            tracing::debug!("Assistant classified {} as {}", key, verdict.classification);
            Some(ClassificationResult {
                classification: verdict.classification,
                confidence: Confidence::Medium,
                reason: format!("Assistant: {}", verdict.reason),
                source: DecisionSource::Assistant,
            })
        }
        Err(e) => {
            tracing::warn!("Assistant fallback failed for {}: {}", key, e);
            None
        }
    }
}

fn single_side_confidence(score: usize) -> Confidence {
    if score >= 2 {
        Confidence::High
    } else {
        Confidence::Medium
    }
}

fn pattern_reason(business: &[&str], pipeline: &[&str]) -> String {
    match (business.is_empty(), pipeline.is_empty()) {
        (false, true) => format!("Matched business logic patterns: {}", business.join(", ")),
        (true, false) => format!("Matched pipeline patterns: {}", pipeline.join(", ")),
        _ => format!(
            "Business score {} ({}) vs pipeline score {} ({})",
            business.len(),
            business.join(", "),
            pipeline.len(),
            pipeline.join(", ")
        ),
    }
}

fn default_result(business: usize, pipeline: usize, assistant_failed: bool) -> ClassificationResult {
    let mut reason = if business == 0 && pipeline == 0 {
        "No business logic or pipeline signal matched".to_string()
    } else {
        format!(
            "Ambiguous signals (business {}, pipeline {})",
            business, pipeline
        )
    };
    if assistant_failed {
        reason.push_str("; assistant fallback failed");
    }
    reason.push_str("; defaulted to pipeline code");

    ClassificationResult {
        classification: Classification::PipelineCode,
        confidence: Confidence::Low,
        reason,
        source: DecisionSource::Default,
    }
}
