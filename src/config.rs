// Copyright 2025 Cowboy AI, LLC.

//! Environment-driven configuration
//!
//! Every key is prefixed `DISCOVERY_`; missing keys fall back to defaults
//! suitable for a local single-process run against a local NATS server.

use crate::adapters::{CircuitBreakerConfig, RateLimit, RetryPolicy};
use crate::bus::NatsConfig;
use crate::cache::BlacklistCacheConfig;
use crate::confidence::Confidence;
use crate::domain::EngineKind;
use crate::errors::{DiscoveryError, DiscoveryResult};
use crate::generator::LlmConfig;
use crate::pipeline::SpamPolicy;
use crate::store::NatsKvConfig;
use std::env;
use std::time::Duration;

/// Settings for one search engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Which engine these settings configure
    pub engine: EngineKind,
    /// Whether the engine participates in searches
    pub enabled: bool,
    /// Base URL of the engine's API
    pub base_url: String,
    /// API key, empty for engines without auth
    pub api_key: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retry attempts for transient failures
    pub max_retries: u32,
    /// Rolling rate limit, None for host-local engines
    pub rate_limit: Option<RateLimit>,
}

impl EngineSettings {
    /// Retry policy derived from these settings
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.max(1),
            ..RetryPolicy::default()
        }
    }
}

/// Top-level configuration of the discovery core
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Event bus connection
    pub nats: NatsConfig,
    /// KV store buckets
    pub store: NatsKvConfig,
    /// Blacklist cache tuning
    pub cache: BlacklistCacheConfig,
    /// Per-engine settings
    pub engines: Vec<EngineSettings>,
    /// LLM completion endpoint
    pub llm: LlmConfig,
    /// Confidence threshold for candidate classification
    pub threshold: Confidence,
    /// Circuit-breaker defaults applied to every engine
    pub breaker: CircuitBreakerConfig,
    /// Anti-spam pre-filter policy
    pub spam_policy: SpamPolicy,
    /// Partitions per partitioned topic
    pub partitions: u32,
    /// Queries requested from the generator per template
    pub queries_per_engine: u32,
    /// Session soft deadline
    pub session_deadline: Duration,
    /// Ingress bind address
    pub bind: String,
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn engine_settings(engine: EngineKind, default_enabled: bool) -> EngineSettings {
    let prefix = format!(
        "DISCOVERY_{}",
        engine.as_str().to_ascii_uppercase().replace('-', "_")
    );
    let rate_limit = match engine {
        EngineKind::Websearch | EngineKind::GoogleProxy => Some(RateLimit::daily(env_parse(
            &format!("{prefix}_RATE_LIMIT"),
            100,
        ))),
        EngineKind::AiAnswer => Some(RateLimit::per_minute(env_parse(
            &format!("{prefix}_RATE_LIMIT"),
            20,
        ))),
        EngineKind::MetaSearch => None,
    };

    EngineSettings {
        engine,
        enabled: env_bool(&format!("{prefix}_ENABLED"), default_enabled),
        base_url: env_string(&format!("{prefix}_BASE_URL"), ""),
        api_key: env_string(&format!("{prefix}_API_KEY"), ""),
        timeout: Duration::from_secs(env_parse(&format!("{prefix}_TIMEOUT_SECS"), 10)),
        max_retries: env_parse(&format!("{prefix}_RETRIES"), 3),
        rate_limit,
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig::default(),
            store: NatsKvConfig::default(),
            cache: BlacklistCacheConfig::default(),
            engines: EngineKind::ALL
                .into_iter()
                .map(|engine| engine_settings(engine, false))
                .collect(),
            llm: LlmConfig::default(),
            threshold: Confidence::DEFAULT_THRESHOLD,
            breaker: CircuitBreakerConfig::default(),
            spam_policy: SpamPolicy::default(),
            partitions: crate::bus::DEFAULT_PARTITIONS,
            queries_per_engine: 3,
            session_deadline: crate::orchestrator::DEFAULT_SESSION_DEADLINE,
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl DiscoveryConfig {
    /// Read the configuration from the environment
    pub fn from_env() -> DiscoveryResult<Self> {
        let threshold_raw: f64 = env_parse("DISCOVERY_CONFIDENCE_THRESHOLD", 0.60);
        let threshold = Confidence::from_f64(threshold_raw).ok_or_else(|| {
            DiscoveryError::Configuration(format!(
                "DISCOVERY_CONFIDENCE_THRESHOLD {threshold_raw} outside [0.00, 1.00]"
            ))
        })?;

        let spam_policy = match env_string("DISCOVERY_SPAM_POLICY", "DISABLED").as_str() {
            "PRE_FILTER" => SpamPolicy::PreFilter,
            "SCORE_ZERO" => SpamPolicy::ScoreZero,
            "DISABLED" => SpamPolicy::Disabled,
            other => {
                return Err(DiscoveryError::Configuration(format!(
                    "DISCOVERY_SPAM_POLICY '{other}' is not PRE_FILTER, SCORE_ZERO, or DISABLED"
                )))
            }
        };

        Ok(Self {
            nats: NatsConfig {
                url: env_string("DISCOVERY_NATS_URL", "nats://localhost:4222"),
                user: env_opt("DISCOVERY_NATS_USER"),
                password: env_opt("DISCOVERY_NATS_PASSWORD"),
                tls_required: env_bool("DISCOVERY_NATS_TLS", false),
                ..NatsConfig::default()
            },
            store: NatsKvConfig {
                bucket_prefix: env_string("DISCOVERY_BUCKET_PREFIX", "discovery"),
                ..NatsKvConfig::default()
            },
            cache: BlacklistCacheConfig {
                capacity: env_parse("DISCOVERY_CACHE_CAPACITY", 10_000),
                ttl: Duration::from_secs(env_parse("DISCOVERY_CACHE_TTL_SECS", 24 * 60 * 60)),
            },
            engines: EngineKind::ALL
                .into_iter()
                .map(|engine| engine_settings(engine, false))
                .collect(),
            llm: LlmConfig {
                base_url: env_string("DISCOVERY_LLM_BASE_URL", "http://localhost:11434/v1"),
                api_key: env_opt("DISCOVERY_LLM_API_KEY"),
                model: env_string("DISCOVERY_LLM_MODEL", "mistral"),
                timeout: Duration::from_secs(env_parse("DISCOVERY_LLM_TIMEOUT_SECS", 25)),
                max_tokens: env_parse("DISCOVERY_LLM_MAX_TOKENS", 1024),
                temperature: env_parse("DISCOVERY_LLM_TEMPERATURE", 0.7),
            },
            threshold,
            breaker: CircuitBreakerConfig {
                failure_threshold: env_parse("DISCOVERY_BREAKER_THRESHOLD", 5),
                cooldown: Duration::from_secs(env_parse("DISCOVERY_BREAKER_COOLDOWN_SECS", 60)),
            },
            spam_policy,
            partitions: env_parse("DISCOVERY_PARTITIONS", crate::bus::DEFAULT_PARTITIONS),
            queries_per_engine: env_parse("DISCOVERY_QUERIES_PER_ENGINE", 3),
            session_deadline: Duration::from_secs(env_parse(
                "DISCOVERY_SESSION_DEADLINE_SECS",
                30 * 60,
            )),
            bind: env_string("DISCOVERY_BIND", "0.0.0.0:8080"),
        })
    }

    /// Settings for one engine, when configured
    pub fn engine(&self, engine: EngineKind) -> Option<&EngineSettings> {
        self.engines.iter().find(|e| e.engine == engine)
    }

    /// Enabled engines only
    pub fn enabled_engines(&self) -> Vec<&EngineSettings> {
        self.engines.iter().filter(|e| e.enabled).collect()
    }
}
