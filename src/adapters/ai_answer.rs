// Copyright 2025 Cowboy AI, LLC.

//! AI-answer engine adapter
//!
//! Sends a verbose question to a completion-style endpoint and extracts the
//! citations array as search hits. Citations arrive either as bare URL
//! strings or as objects with title and snippet; both forms are accepted.

use crate::adapters::{CircuitState, HealthStatus, SearchAdapter, SearchError, SearchHit};
use crate::domain::EngineKind;
use crate::identifiers::SessionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Configuration for the AI-answer engine
#[derive(Debug, Clone)]
pub struct AiAnswerConfig {
    /// Base URL of the API
    pub base_url: String,
    /// Bearer token
    pub api_key: String,
    /// Model requested from the engine
    pub model: String,
    /// Whether the engine is enabled
    pub enabled: bool,
    /// Connect + request timeout
    pub timeout: Duration,
}

impl AiAnswerConfig {
    /// Config with the default online model
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: "sonar".to_string(),
            enabled: true,
            timeout: Duration::from_secs(10),
        }
    }
}

/// A citation, either a bare URL or an annotated object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Citation {
    /// Bare URL string
    Url(String),
    /// Annotated citation
    Annotated {
        /// Cited URL
        url: String,
        /// Optional page title
        #[serde(default)]
        title: Option<String>,
        /// Optional supporting snippet
        #[serde(default)]
        snippet: Option<String>,
    },
}

impl Citation {
    fn url(&self) -> &str {
        match self {
            Citation::Url(url) => url,
            Citation::Annotated { url, .. } => url,
        }
    }

    fn title(&self) -> &str {
        match self {
            Citation::Url(_) => "",
            Citation::Annotated { title, .. } => title.as_deref().unwrap_or(""),
        }
    }

    fn snippet(&self) -> &str {
        match self {
            Citation::Url(_) => "",
            Citation::Annotated { snippet, .. } => snippet.as_deref().unwrap_or(""),
        }
    }
}

/// AI-answer response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnswerResponse {
    /// Cited sources, in answer order
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// Adapter over the AI-answer engine
pub struct AiAnswerAdapter {
    config: AiAnswerConfig,
    client: reqwest::Client,
}

impl AiAnswerAdapter {
    /// Build the adapter and its HTTP client
    pub fn new(config: AiAnswerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(5)))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }
}

#[async_trait]
impl SearchAdapter for AiAnswerAdapter {
    fn engine(&self) -> EngineKind {
        EngineKind::AiAnswer
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
        session_id: SessionId,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let engine = EngineKind::AiAnswer;
        if !self.config.enabled {
            return Err(SearchError::Disabled { engine });
        }

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": query }],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout {
                        engine,
                        timeout_ms: self.config.timeout.as_millis() as u64,
                    }
                } else {
                    SearchError::Unknown {
                        engine,
                        detail: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(match status.as_u16() {
                401 | 403 => SearchError::Auth { engine },
                429 => SearchError::RateLimited {
                    engine,
                    retry_after_secs: retry_after,
                },
                code if status.is_server_error() => SearchError::Remote5xx {
                    engine,
                    status: code,
                },
                code => SearchError::Unknown {
                    engine,
                    detail: format!("unexpected status {code}"),
                },
            });
        }

        let payload: AiAnswerResponse = response.json().await.map_err(|e| SearchError::Parse {
            engine,
            detail: e.to_string(),
        })?;

        let hits = payload
            .citations
            .iter()
            .take(max_results as usize)
            .enumerate()
            .map(|(index, citation)| {
                SearchHit::new(
                    citation.url(),
                    citation.title(),
                    citation.snippet(),
                    index as u32 + 1,
                    engine,
                    session_id,
                )
            })
            .collect();
        Ok(hits)
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            engine: EngineKind::AiAnswer,
            up: self.config.enabled,
            circuit: CircuitState::Closed,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_url_citations() {
        let json = r#"{
            "citations": ["https://example.ngo/grants", "https://fund.example.eu"],
            "choices": [{"message": {"content": "ignored"}}]
        }"#;
        let response: AiAnswerResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.citations.len(), 2);
        assert_eq!(response.citations[0].url(), "https://example.ngo/grants");
        assert_eq!(response.citations[0].title(), "");
    }

    #[test]
    fn test_annotated_citations() {
        let json = r#"{
            "citations": [
                {"url": "https://example.ngo", "title": "Example NGO", "snippet": "Grants"}
            ]
        }"#;
        let response: AiAnswerResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.citations[0].title(), "Example NGO");
        assert_eq!(response.citations[0].snippet(), "Grants");
    }

    #[test]
    fn test_no_citations_field() {
        let response: AiAnswerResponse = serde_json::from_str("{}").unwrap();
        assert!(response.citations.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_engine_short_circuits() {
        let mut config = AiAnswerConfig::new("http://127.0.0.1:1", "key");
        config.enabled = false;
        let adapter = AiAnswerAdapter::new(config);
        let err = adapter.search("q", 10, SessionId::new()).await.unwrap_err();
        assert_eq!(err.category(), "DISABLED");
    }

    #[test]
    fn test_capabilities() {
        let adapter = AiAnswerAdapter::new(AiAnswerConfig::new("http://x", "k"));
        assert!(!adapter.supports_keyword_queries());
        assert!(adapter.supports_ai_queries());
    }
}
