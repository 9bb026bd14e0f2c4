// Copyright 2025 Cowboy AI, LLC.

//! LLM completion backend
//!
//! Speaks the common chat-completion protocol: one user message in, the
//! first choice's content out. The generator layers its own budget and
//! fallback on top, so this backend only reports errors, it never retries.

use crate::generator::{GeneratorBackend, GeneratorError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Configuration for the LLM completion endpoint
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL, e.g. `http://localhost:11434/v1`
    pub base_url: String,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Model to request
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
    /// Completion token budget
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "mistral".to_string(),
            timeout: Duration::from_secs(25),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Chat-completion backend over HTTP
pub struct LlmBackend {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LlmBackend {
    /// Build the backend and its HTTP client
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(5)))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }
}

#[async_trait]
impl GeneratorBackend for LlmBackend {
    fn model_id(&self) -> String {
        self.config.model.clone()
    }

    async fn complete(&self, prompt: &str) -> Result<String, GeneratorError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GeneratorError::Timeout
            } else {
                GeneratorError::Unavailable(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(GeneratorError::Unavailable(format!(
                "completion endpoint returned {}",
                response.status()
            )));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Malformed(e.to_string()))?;

        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GeneratorError::Malformed("no choices in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_schema() {
        let json = r#"{
            "id": "cmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "line one\nline two"}}
            ],
            "usage": {"total_tokens": 12}
        }"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices[0].message.content, "line one\nline two");
    }

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert_eq!(config.model, "mistral");
        assert!(config.api_key.is_none());
        assert_eq!(config.max_tokens, 1024);
    }
}
