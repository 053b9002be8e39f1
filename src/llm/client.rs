//! LLM client for API communication

use super::{Assistant, AssistantError};
use crate::repo::LlmSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Wire protocol spoken by the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Ollama,
    OpenAiCompatible,
}

impl LlmProvider {
    /// Guess the protocol from the endpoint URL
    pub fn detect(endpoint: &str) -> Self {
        if endpoint.contains("11434") || endpoint.contains("ollama") {
            LlmProvider::Ollama
        } else {
            LlmProvider::OpenAiCompatible
        }
    }
}

/// Configuration for LLM client
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API endpoint URL
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// API key (optional)
    pub api_key: Option<String>,
    /// Maximum tokens for response
    pub max_tokens: usize,
    /// Temperature for generation
    pub temperature: f32,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            api_key: None,
            max_tokens: 512,
            temperature: 0.0,
            timeout: Duration::from_secs(60),
        }
    }
}

impl LlmConfig {
    /// Build from the `[llm]` section of the configuration file
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let defaults = Self::default();
        Self {
            endpoint: settings
                .endpoint
                .clone()
                .unwrap_or(defaults.endpoint)
                .trim_end_matches('/')
                .to_string(),
            model: settings.model.clone().unwrap_or(defaults.model),
            api_key: settings.api_key.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

/// HTTP client for an Ollama or OpenAI-compatible completion endpoint
pub struct LlmClient {
    config: LlmConfig,
    provider: LlmProvider,
    client: reqwest::Client,
}

impl LlmClient {
    /// Create a new LLM client
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            provider: LlmProvider::detect(&config.endpoint),
            config,
            client,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Get the detected provider
    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    /// Generate completion using Ollama API
    async fn complete_ollama(&self, prompt: &str) -> Result<String, AssistantError> {
        let url = format!("{}/api/generate", self.config.endpoint);

        let request = OllamaGenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens as i32,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Status { status, body });
        }

        let result: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Malformed(e.to_string()))?;

        if let Some(error) = result.error {
            return Err(AssistantError::Reported(error));
        }

        tracing::debug!("Ollama used {} tokens", result.eval_count.unwrap_or(0));
        Ok(result.response)
    }

    /// Generate completion using OpenAI-compatible API
    async fn complete_openai(&self, prompt: &str) -> Result<String, AssistantError> {
        let url = format!("{}/v1/chat/completions", self.config.endpoint);

        let request = OpenAIChatRequest {
            model: self.config.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
        };

        let mut req_builder = self.client.post(&url).json(&request);

        if let Some(ref key) = self.config.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = req_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Status { status, body });
        }

        let result: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Malformed(e.to_string()))?;

        if let Some(error) = result.error {
            return Err(AssistantError::Reported(error.message));
        }

        if let Some(usage) = result.usage {
            tracing::debug!("Completion used {} tokens", usage.total_tokens);
        }

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AssistantError::Malformed("response has no choices".to_string()))
    }
}

#[async_trait::async_trait]
impl Assistant for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, AssistantError> {
        match self.provider {
            LlmProvider::Ollama => self.complete_ollama(prompt).await,
            LlmProvider::OpenAiCompatible => self.complete_openai(prompt).await,
        }
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
    eval_count: Option<i32>,
    error: Option<String>,
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

/// Scripted assistant for tests and offline runs
pub struct MockAssistant {
    responses: Vec<(String, Result<String, String>)>,
    default_response: Result<String, String>,
    calls: AtomicUsize,
}

impl MockAssistant {
    /// Create a mock that answers `pipeline_code` unless told otherwise
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            default_response: Ok(
                r#"{"classification": "pipeline_code", "reason": "Mock reason"}"#.to_string(),
            ),
            calls: AtomicUsize::new(0),
        }
    }

    /// Add a mock response for prompts containing `prompt_contains`
    pub fn add_response(&mut self, prompt_contains: &str, response: &str) {
        self.responses
            .push((prompt_contains.to_string(), Ok(response.to_string())));
    }

    /// Fail prompts containing `prompt_contains`
    pub fn add_failure(&mut self, prompt_contains: &str, message: &str) {
        self.responses
            .push((prompt_contains.to_string(), Err(message.to_string())));
    }

    /// Replace the response used when nothing matches
    pub fn set_default_response(&mut self, response: &str) {
        self.default_response = Ok(response.to_string());
    }

    /// Number of prompts received so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockAssistant {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Assistant for MockAssistant {
    async fn complete(&self, prompt: &str) -> Result<String, AssistantError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let reply = self
            .responses
            .iter()
            .find(|(key, _)| prompt.contains(key.as_str()))
            .map(|(_, reply)| reply)
            .unwrap_or(&self.default_response);

        reply.clone().map_err(AssistantError::Reported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_assistant() {
        let mut assistant = MockAssistant::new();
        assistant.add_response("test", r#"{"result": "success"}"#);
        assistant.add_failure("broken", "model unavailable");

        let response = assistant.complete("this is a test prompt").await.unwrap();
        assert!(response.contains("success"));

        let err = assistant.complete("a broken prompt").await.unwrap_err();
        assert!(matches!(err, AssistantError::Reported(_)));

        let response = assistant.complete("anything else").await.unwrap();
        assert!(response.contains("pipeline_code"));
        assert_eq!(assistant.calls(), 3);
    }

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert!(config.endpoint.contains("11434"));
        assert_eq!(config.temperature, 0.0);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = LlmSettings {
            endpoint: Some("https://api.example.com/".to_string()),
            model: Some("gpt-4o-mini".to_string()),
            api_key: Some("secret".to_string()),
            timeout_secs: 5,
            ..Default::default()
        };
        let config = LlmConfig::from_settings(&settings);
        assert_eq!(config.endpoint, "https://api.example.com");
        assert_eq!(config.timeout, Duration::from_secs(5));

        let client = LlmClient::new(config).unwrap();
        assert_eq!(client.provider(), LlmProvider::OpenAiCompatible);
    }

    #[test]
    fn test_provider_detection() {
        assert_eq!(
            LlmProvider::detect("http://localhost:11434"),
            LlmProvider::Ollama
        );
        assert_eq!(
            LlmProvider::detect("http://localhost:8000"),
            LlmProvider::OpenAiCompatible
        );
    }
}
