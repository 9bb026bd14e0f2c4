// Copyright 2025 Cowboy AI, LLC.

//! Keyword search API adapter
//!
//! Serves both keyword engines (the paid web-search API and the
//! Google-proxy): the wire shape is the same organic result array, only the
//! engine identity, base URL, and auth header differ.

use crate::adapters::{CircuitState, HealthStatus, SearchAdapter, SearchError, SearchHit};
use crate::domain::EngineKind;
use crate::identifiers::SessionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Configuration for one keyword engine instance
#[derive(Debug, Clone)]
pub struct KeywordApiConfig {
    /// Which keyword engine this instance is
    pub engine: EngineKind,
    /// Base URL of the API, e.g. `https://api.websearch.example`
    pub base_url: String,
    /// API key sent in the auth header
    pub api_key: String,
    /// Header name the key travels in
    pub auth_header: String,
    /// Whether the engine is enabled at all
    pub enabled: bool,
    /// Connect + request timeout for the underlying client
    pub timeout: Duration,
}

impl KeywordApiConfig {
    /// Config for the paid web-search API
    pub fn websearch(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            engine: EngineKind::Websearch,
            base_url: base_url.into(),
            api_key: api_key.into(),
            auth_header: "X-Api-Key".to_string(),
            enabled: true,
            timeout: Duration::from_secs(10),
        }
    }

    /// Config for the Google-proxy API
    pub fn google_proxy(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            engine: EngineKind::GoogleProxy,
            base_url: base_url.into(),
            api_key: api_key.into(),
            auth_header: "X-Api-Key".to_string(),
            enabled: true,
            timeout: Duration::from_secs(10),
        }
    }
}

/// One organic result in the keyword API response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganicResult {
    /// Result title
    pub title: String,
    /// Result URL
    pub link: String,
    /// Result snippet
    #[serde(default)]
    pub snippet: String,
    /// 1-based position; absent positions fall back to array order
    #[serde(default)]
    pub position: Option<u32>,
}

/// Keyword API response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganicResponse {
    /// Organic result list
    #[serde(default)]
    pub organic: Vec<OrganicResult>,
}

/// Adapter over a keyword search API
pub struct KeywordApiAdapter {
    config: KeywordApiConfig,
    client: reqwest::Client,
}

impl KeywordApiAdapter {
    /// Build the adapter and its HTTP client
    pub fn new(config: KeywordApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(5)))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    fn map_status(&self, status: reqwest::StatusCode, retry_after: Option<u64>) -> SearchError {
        let engine = self.config.engine;
        match status.as_u16() {
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
        }
    }
}

fn retry_after_header(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

#[async_trait]
impl SearchAdapter for KeywordApiAdapter {
    fn engine(&self) -> EngineKind {
        self.config.engine
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
        session_id: SessionId,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let engine = self.config.engine;
        if !self.config.enabled {
            return Err(SearchError::Disabled { engine });
        }

        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header(&self.config.auth_header, &self.config.api_key)
            .json(&json!({ "q": query, "num": max_results }))
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

        if !response.status().is_success() {
            let retry_after = retry_after_header(&response);
            return Err(self.map_status(response.status(), retry_after));
        }

        let payload: OrganicResponse = response.json().await.map_err(|e| SearchError::Parse {
            engine,
            detail: e.to_string(),
        })?;

        let hits = payload
            .organic
            .into_iter()
            .take(max_results as usize)
            .enumerate()
            .map(|(index, result)| {
                let rank = result.position.unwrap_or(index as u32 + 1);
                SearchHit::new(
                    result.link,
                    result.title,
                    result.snippet,
                    rank,
                    engine,
                    session_id,
                )
            })
            .collect();
        Ok(hits)
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            engine: self.config.engine,
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
    fn test_response_schema_full() {
        let json = r#"{
            "organic": [
                {"title": "EU Grants", "link": "https://ec.example.eu/grants", "snippet": "Apply now", "position": 1},
                {"title": "Second", "link": "https://example.org", "snippet": ""}
            ],
            "searchParameters": {"q": "ignored extra field"}
        }"#;
        let response: OrganicResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.organic.len(), 2);
        assert_eq!(response.organic[0].position, Some(1));
        assert_eq!(response.organic[1].position, None);
    }

    #[test]
    fn test_response_schema_empty() {
        let response: OrganicResponse = serde_json::from_str("{}").unwrap();
        assert!(response.organic.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_engine_short_circuits() {
        let mut config = KeywordApiConfig::websearch("http://127.0.0.1:1", "key");
        config.enabled = false;
        let adapter = KeywordApiAdapter::new(config);
        let err = adapter.search("q", 10, SessionId::new()).await.unwrap_err();
        assert_eq!(err.category(), "DISABLED");
    }

    #[test]
    fn test_engine_identity() {
        let websearch =
            KeywordApiAdapter::new(KeywordApiConfig::websearch("http://x", "k"));
        assert_eq!(websearch.engine(), EngineKind::Websearch);
        assert!(websearch.supports_keyword_queries());
        assert!(!websearch.supports_ai_queries());

        let proxy = KeywordApiAdapter::new(KeywordApiConfig::google_proxy("http://x", "k"));
        assert_eq!(proxy.engine(), EngineKind::GoogleProxy);
    }
}
