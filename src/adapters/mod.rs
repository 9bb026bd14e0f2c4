// Copyright 2025 Cowboy AI, LLC.

//! Uniform capability interface over heterogeneous search engines
//!
//! Every engine - keyword APIs, the self-hosted meta-search, the AI-answer
//! engine - implements [`SearchAdapter`] and normalizes its payload into
//! [`SearchHit`]s. [`GuardedAdapter`] wraps any adapter with the shared
//! middleware stack: `rate_limit(retry(circuit_break(timeout(call))))`.

mod ai_answer;
mod circuit_breaker;
mod guard;
mod keyword;
mod meta_search;
mod policy;
mod rate_limit;

pub use ai_answer::{AiAnswerAdapter, AiAnswerConfig};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use guard::GuardedAdapter;
pub use keyword::{KeywordApiAdapter, KeywordApiConfig};
pub use meta_search::{MetaSearchAdapter, MetaSearchConfig};
pub use policy::{with_retry, with_timeout, RetryPolicy};
pub use rate_limit::{RateLimit, UsageRateLimiter};

use crate::domain::{extract_domain, EngineKind, ProviderType};
use crate::identifiers::SessionId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One normalized hit from any engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// URL the engine returned
    pub url: String,
    /// Normalized host, empty when the URL has no parseable host
    pub host: String,
    /// Result title
    pub title: String,
    /// Result snippet or description
    pub snippet: String,
    /// 1-based rank within the engine's response
    pub rank: u32,
    /// Engine that produced the hit
    pub engine: EngineKind,
    /// When the hit was observed
    pub discovered_at: DateTime<Utc>,
    /// Session the search ran for
    pub session_id: SessionId,
}

impl SearchHit {
    /// Build a hit, deriving the normalized host from the URL
    ///
    /// An unextractable host becomes the empty string; the validation stage
    /// makes the authoritative call and counts the skip.
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
        rank: u32,
        engine: EngineKind,
        session_id: SessionId,
    ) -> Self {
        let url = url.into();
        let host = extract_domain(&url).unwrap_or_default();
        Self {
            url,
            host,
            title: title.into(),
            snippet: snippet.into(),
            rank,
            engine,
            discovered_at: Utc::now(),
            session_id,
        }
    }
}

/// Normalized error taxonomy emitted by adapters
///
/// Each variant maps to exactly one upstream failure category.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    /// Credentials rejected; terminal, disables the engine for the session
    #[error("authentication rejected by {engine}")]
    Auth {
        /// Engine that rejected the credentials
        engine: EngineKind,
    },

    /// Rate limit exhausted, locally or remotely (429)
    #[error("rate limit exhausted for {engine}")]
    RateLimited {
        /// Engine whose budget is exhausted
        engine: EngineKind,
        /// Seconds until the remote says to retry, when it said
        retry_after_secs: Option<u64>,
    },

    /// The request exceeded its deadline
    #[error("request to {engine} timed out after {timeout_ms} ms")]
    Timeout {
        /// Engine that timed out
        engine: EngineKind,
        /// Deadline that was exceeded
        timeout_ms: u64,
    },

    /// Circuit is open; no request was issued
    #[error("circuit open for {engine}")]
    CircuitOpen {
        /// Engine whose circuit is open
        engine: EngineKind,
    },

    /// The engine returned a server error
    #[error("{engine} returned server error {status}")]
    Remote5xx {
        /// Engine that failed
        engine: EngineKind,
        /// HTTP status code
        status: u16,
    },

    /// The engine's payload did not match its schema
    #[error("failed to parse {engine} response: {detail}")]
    Parse {
        /// Engine whose payload failed to parse
        engine: EngineKind,
        /// What went wrong
        detail: String,
    },

    /// The engine is disabled by configuration or for this session
    #[error("engine {engine} is disabled")]
    Disabled {
        /// The disabled engine
        engine: EngineKind,
    },

    /// Anything that fits no other category
    #[error("unexpected {engine} failure: {detail}")]
    Unknown {
        /// Engine that failed
        engine: EngineKind,
        /// What went wrong
        detail: String,
    },
}

impl SearchError {
    /// The single failure category this error maps to upstream
    pub fn category(&self) -> &'static str {
        match self {
            SearchError::Auth { .. } => "AUTH",
            SearchError::RateLimited { .. } => "RATE_LIMITED",
            SearchError::Timeout { .. } => "TIMEOUT",
            SearchError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            SearchError::Remote5xx { .. } => "REMOTE_5XX",
            SearchError::Parse { .. } => "PARSE",
            SearchError::Disabled { .. } => "DISABLED",
            SearchError::Unknown { .. } => "UNKNOWN",
        }
    }

    /// The engine this error concerns
    pub fn engine(&self) -> EngineKind {
        match self {
            SearchError::Auth { engine }
            | SearchError::RateLimited { engine, .. }
            | SearchError::Timeout { engine, .. }
            | SearchError::CircuitOpen { engine }
            | SearchError::Remote5xx { engine, .. }
            | SearchError::Parse { engine, .. }
            | SearchError::Disabled { engine }
            | SearchError::Unknown { engine, .. } => *engine,
        }
    }

    /// Whether the retry policy may try again
    ///
    /// Timeouts and 5xx are transient, as is a remote 429 that did not name
    /// a Retry-After. Everything else fails immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SearchError::Timeout { .. }
                | SearchError::Remote5xx { .. }
                | SearchError::RateLimited {
                    retry_after_secs: None,
                    ..
                }
        )
    }
}

impl From<SearchError> for crate::errors::DiscoveryError {
    fn from(err: SearchError) -> Self {
        crate::errors::DiscoveryError::Search(err.to_string())
    }
}

/// Health snapshot of one engine adapter
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Engine this snapshot describes
    pub engine: EngineKind,
    /// Whether the adapter considers itself usable
    pub up: bool,
    /// Circuit-breaker state
    pub circuit: CircuitState,
    /// Most recent error, when one is remembered
    pub last_error: Option<String>,
}

/// Uniform contract over all search engines
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    /// Stable engine identity
    fn engine(&self) -> EngineKind;

    /// Provider class
    fn provider_type(&self) -> ProviderType {
        self.engine().provider_type()
    }

    /// Whether the engine accepts short keyword queries
    fn supports_keyword_queries(&self) -> bool {
        self.engine().supports_keyword_queries()
    }

    /// Whether the engine accepts verbose AI-optimized questions
    fn supports_ai_queries(&self) -> bool {
        self.engine().supports_ai_queries()
    }

    /// Execute a query, returning normalized hits with rank preserved
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        session_id: SessionId,
    ) -> Result<Vec<SearchHit>, SearchError>;

    /// Health snapshot
    async fn health(&self) -> HealthStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_derives_host() {
        let hit = SearchHit::new(
            "https://WWW.Example.ORG/grants",
            "Grants",
            "Funding",
            1,
            EngineKind::Websearch,
            SessionId::new(),
        );
        assert_eq!(hit.host, "example.org");
    }

    #[test]
    fn test_hit_with_bad_url_has_empty_host() {
        let hit = SearchHit::new(
            "mailto:x@y.org",
            "t",
            "s",
            1,
            EngineKind::Websearch,
            SessionId::new(),
        );
        assert_eq!(hit.host, "");
    }

    #[test]
    fn test_error_categories() {
        let engine = EngineKind::Websearch;
        assert_eq!(SearchError::Auth { engine }.category(), "AUTH");
        assert_eq!(
            SearchError::Timeout {
                engine,
                timeout_ms: 10_000
            }
            .category(),
            "TIMEOUT"
        );
        assert_eq!(SearchError::CircuitOpen { engine }.category(), "CIRCUIT_OPEN");
    }

    #[test]
    fn test_transient_classification() {
        let engine = EngineKind::AiAnswer;
        assert!(SearchError::Timeout {
            engine,
            timeout_ms: 1
        }
        .is_transient());
        assert!(SearchError::Remote5xx {
            engine,
            status: 503
        }
        .is_transient());
        assert!(SearchError::RateLimited {
            engine,
            retry_after_secs: None
        }
        .is_transient());

        assert!(!SearchError::RateLimited {
            engine,
            retry_after_secs: Some(60)
        }
        .is_transient());
        assert!(!SearchError::Auth { engine }.is_transient());
        assert!(!SearchError::Parse {
            engine,
            detail: "x".to_string()
        }
        .is_transient());
        assert!(!SearchError::Disabled { engine }.is_transient());
    }
}
