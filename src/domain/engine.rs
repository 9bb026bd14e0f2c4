// Copyright 2025 Cowboy AI, LLC.

//! Search engine identity and capability flags

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad class of search provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderType {
    /// Classic keyword search over an organic result list
    Keyword,
    /// AI-answer engine returning citations for a question
    AiAnswer,
    /// Self-hosted meta-search aggregating other engines
    MetaSearch,
}

/// Stable identity of a configured search engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    /// Paid keyword web-search API (header token, daily quota)
    Websearch,
    /// Google-proxy keyword API (header token, daily quota)
    GoogleProxy,
    /// Self-hosted meta-search instance (no auth, host-local)
    MetaSearch,
    /// AI-answer engine (bearer token, per-minute limit)
    AiAnswer,
}

impl EngineKind {
    /// All engines the pipeline knows about
    pub const ALL: [EngineKind; 4] = [
        EngineKind::Websearch,
        EngineKind::GoogleProxy,
        EngineKind::MetaSearch,
        EngineKind::AiAnswer,
    ];

    /// Stable engine name used in events, usage rows, and statistics keys
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Websearch => "websearch",
            EngineKind::GoogleProxy => "google-proxy",
            EngineKind::MetaSearch => "metasearch",
            EngineKind::AiAnswer => "ai-answer",
        }
    }

    /// Provider class of this engine
    pub fn provider_type(&self) -> ProviderType {
        match self {
            EngineKind::Websearch | EngineKind::GoogleProxy => ProviderType::Keyword,
            EngineKind::MetaSearch => ProviderType::MetaSearch,
            EngineKind::AiAnswer => ProviderType::AiAnswer,
        }
    }

    /// Whether the engine accepts short keyword queries (3-8 words)
    pub fn supports_keyword_queries(&self) -> bool {
        !matches!(self, EngineKind::AiAnswer)
    }

    /// Whether the engine accepts verbose AI-optimized questions (15-30 words)
    pub fn supports_ai_queries(&self) -> bool {
        matches!(self, EngineKind::AiAnswer)
    }

    /// Parse a stable engine name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "websearch" => Some(EngineKind::Websearch),
            "google-proxy" => Some(EngineKind::GoogleProxy),
            "metasearch" => Some(EngineKind::MetaSearch),
            "ai-answer" => Some(EngineKind::AiAnswer),
            _ => None,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
