// Copyright 2025 Cowboy AI, LLC.

//! Self-hosted meta-search adapter
//!
//! Talks to a SearXNG-style instance: no auth, JSON format, results
//! aggregated from whatever upstream engines the instance federates.

use crate::adapters::{CircuitState, HealthStatus, SearchAdapter, SearchError, SearchHit};
use crate::domain::EngineKind;
use crate::identifiers::SessionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the meta-search instance
#[derive(Debug, Clone)]
pub struct MetaSearchConfig {
    /// Base URL of the instance
    pub base_url: String,
    /// Whether the engine is enabled
    pub enabled: bool,
    /// Connect + request timeout
    pub timeout: Duration,
}

impl MetaSearchConfig {
    /// Config for a local instance
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            enabled: true,
            timeout: Duration::from_secs(10),
        }
    }
}

/// One aggregated result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaResult {
    /// Result URL
    pub url: String,
    /// Result title
    #[serde(default)]
    pub title: String,
    /// Result content snippet
    #[serde(default)]
    pub content: String,
}

/// Meta-search response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaResponse {
    /// Aggregated result list
    #[serde(default)]
    pub results: Vec<MetaResult>,
}

/// Adapter over the self-hosted meta-search
pub struct MetaSearchAdapter {
    config: MetaSearchConfig,
    client: reqwest::Client,
}

impl MetaSearchAdapter {
    /// Build the adapter and its HTTP client
    pub fn new(config: MetaSearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(5)))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }
}

#[async_trait]
impl SearchAdapter for MetaSearchAdapter {
    fn engine(&self) -> EngineKind {
        EngineKind::MetaSearch
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
        session_id: SessionId,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let engine = EngineKind::MetaSearch;
        if !self.config.enabled {
            return Err(SearchError::Disabled { engine });
        }

        let url = format!(
            "{}/search?q={}&format=json",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(query)
        );
        let response = self.client.get(&url).send().await.map_err(|e| {
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
            return Err(if status.is_server_error() {
                SearchError::Remote5xx {
                    engine,
                    status: status.as_u16(),
                }
            } else {
                SearchError::Unknown {
                    engine,
                    detail: format!("unexpected status {status}"),
                }
            });
        }

        let payload: MetaResponse = response.json().await.map_err(|e| SearchError::Parse {
            engine,
            detail: e.to_string(),
        })?;

        let hits = payload
            .results
            .into_iter()
            .take(max_results as usize)
            .enumerate()
            .map(|(index, result)| {
                SearchHit::new(
                    result.url,
                    result.title,
                    result.content,
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
            engine: EngineKind::MetaSearch,
            up: self.config.enabled,
            circuit: CircuitState::Closed,
            last_error: None,
        }
    }
}
