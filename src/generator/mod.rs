// Copyright 2025 Cowboy AI, LLC.

//! Query generation
//!
//! Turns search criteria into N engine-ready queries: short keyword queries
//! for the keyword engines, verbose questions for the AI-answer engine.
//! Generation never fails the caller - a result cache answers repeats, and
//! a deterministic built-in fallback list substitutes whenever the backend
//! is unavailable, times out, or under-delivers. Every run is recorded.

mod llm;

pub use llm::{LlmBackend, LlmConfig};

use crate::domain::{EngineKind, QueryGenerationRecord, SearchCriteria};
use crate::identifiers::{GenerationId, SessionId};
use crate::store::GenerationStore;
use async_trait::async_trait;
use chrono::Utc;
use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Errors a generator backend can produce
#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    /// Backend could not be reached or answered with an error
    #[error("generator backend unavailable: {0}")]
    Unavailable(String),

    /// Backend exceeded the generation budget
    #[error("generator backend timed out")]
    Timeout,

    /// Backend answered with an unusable payload
    #[error("generator backend returned malformed output: {0}")]
    Malformed(String),
}

/// A pluggable completion backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GeneratorBackend: Send + Sync {
    /// Model identifier recorded on sessions
    fn model_id(&self) -> String;

    /// Complete a prompt into raw text
    async fn complete(&self, prompt: &str) -> Result<String, GeneratorError>;
}

/// Which prompt template to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryTemplate {
    /// 3-8-word keyword queries
    Keyword,
    /// 15-30-word AI-optimized questions
    AiOptimized,
}

impl QueryTemplate {
    /// The template an engine's capabilities ask for
    pub fn for_engine(engine: EngineKind) -> Self {
        if engine.supports_ai_queries() {
            QueryTemplate::AiOptimized
        } else {
            QueryTemplate::Keyword
        }
    }
}

/// A generation request: criteria plus the desired query count
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Validated search criteria
    pub criteria: SearchCriteria,
    /// Desired query count, clamped to [1, 50]
    pub count: u32,
}

impl QueryRequest {
    /// Build a request, clamping the count into its legal range
    pub fn new(criteria: SearchCriteria, count: u32) -> Self {
        Self {
            criteria,
            count: count.clamp(1, 50),
        }
    }
}

/// What one generation produced
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// The queries, always non-empty
    pub queries: Vec<String>,
    /// Model that produced them, None when the fallback was used
    pub model_id: Option<String>,
    /// Prompt sent to the backend
    pub prompt: String,
    /// Whether the fallback list was substituted
    pub fallback_used: bool,
    /// Why the fallback was used
    pub fallback_reason: Option<String>,
    /// Whether the result came from the cache
    pub from_cache: bool,
}

/// Cache hit-rate counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    /// Requests answered from the cache
    pub cache_hits: u64,
    /// Requests that went to the backend (or fallback)
    pub cache_misses: u64,
}

#[derive(Clone)]
struct CachedQueries {
    queries: Vec<String>,
    model_id: Option<String>,
    prompt: String,
}

/// The query generator
pub struct QueryGenerator {
    backend: Arc<dyn GeneratorBackend>,
    store: Arc<dyn GenerationStore>,
    cache: Mutex<LruCache<u64, CachedQueries>>,
    budget: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Total wall-clock budget shared by one generation run
pub const DEFAULT_GENERATION_BUDGET: Duration = Duration::from_secs(30);

impl QueryGenerator {
    /// Build a generator over a backend and an audit store
    pub fn new(backend: Arc<dyn GeneratorBackend>, store: Arc<dyn GenerationStore>) -> Self {
        Self {
            backend,
            store,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(128).unwrap_or(NonZeroUsize::MIN),
            )),
            budget: DEFAULT_GENERATION_BUDGET,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Override the generation budget
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Generate queries for one template; never fails, never empty
    pub async fn generate(
        &self,
        request: &QueryRequest,
        template: QueryTemplate,
        session_id: Option<SessionId>,
    ) -> GenerationOutcome {
        let fingerprint = Self::fingerprint(request, template);

        {
            let mut cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&fingerprint) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return GenerationOutcome {
                    queries: cached.queries.clone(),
                    model_id: cached.model_id.clone(),
                    prompt: cached.prompt.clone(),
                    fallback_used: false,
                    fallback_reason: None,
                    from_cache: true,
                };
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let prompt = Self::prompt_for(template, request);
        let started = Instant::now();
        let mut rejection_reasons = Vec::new();
        let mut generated_count = 0;

        let backend_result =
            match tokio::time::timeout(self.budget, self.backend.complete(&prompt)).await {
                Ok(result) => result,
                Err(_) => Err(GeneratorError::Timeout),
            };

        let (queries, model_id, fallback_reason) = match backend_result {
            Ok(raw) => {
                let (parsed, rejected) = Self::parse_queries(&raw, template, request.count);
                generated_count = parsed.len() as u32 + rejected.len() as u32;
                rejection_reasons = rejected;
                if parsed.len() as u32 >= request.count {
                    (parsed, Some(self.backend.model_id()), None)
                } else {
                    let reason = format!(
                        "backend produced {} of {} requested queries",
                        parsed.len(),
                        request.count
                    );
                    warn!(reason, "substituting fallback queries");
                    (Self::fallback_for(template, request), None, Some(reason))
                }
            }
            Err(error) => {
                warn!(error = %error, "generator backend failed, substituting fallback");
                (
                    Self::fallback_for(template, request),
                    None,
                    Some(error.to_string()),
                )
            }
        };

        let outcome = GenerationOutcome {
            queries: queries.clone(),
            model_id: model_id.clone(),
            prompt: prompt.clone(),
            fallback_used: fallback_reason.is_some(),
            fallback_reason: fallback_reason.clone(),
            from_cache: false,
        };

        let record = QueryGenerationRecord {
            id: GenerationId::new(),
            session_id,
            model_id,
            queries_requested: request.count,
            queries_generated: generated_count,
            queries_approved: outcome.queries.len() as u32,
            queries_rejected: rejection_reasons.len() as u32,
            rejection_reasons,
            duration_ms: started.elapsed().as_millis() as u64,
            fallback_used: outcome.fallback_used,
            fallback_reason,
            generated_at: Utc::now(),
        };
        if let Err(e) = self.store.record_generation(record).await {
            warn!(error = %e, "failed to record generation session");
        }

        {
            let mut cache = self.cache.lock().await;
            cache.put(
                fingerprint,
                CachedQueries {
                    queries: outcome.queries.clone(),
                    model_id: outcome.model_id.clone(),
                    prompt,
                },
            );
        }

        info!(
            queries = outcome.queries.len(),
            fallback = outcome.fallback_used,
            "queries generated"
        );
        outcome
    }

    /// Generate per-engine query lists, one template per capability class
    ///
    /// The distinct templates run concurrently, so the whole call shares
    /// one generation budget of wall-clock time.
    pub async fn generate_multi(
        &self,
        engines: &[EngineKind],
        request: &QueryRequest,
        session_id: Option<SessionId>,
    ) -> HashMap<EngineKind, GenerationOutcome> {
        let mut templates: Vec<QueryTemplate> = Vec::new();
        for engine in engines {
            let template = QueryTemplate::for_engine(*engine);
            if !templates.contains(&template) {
                templates.push(template);
            }
        }

        let generated = futures::future::join_all(
            templates
                .iter()
                .map(|template| self.generate(request, *template, session_id)),
        )
        .await;
        let by_template: HashMap<QueryTemplate, GenerationOutcome> =
            templates.into_iter().zip(generated).collect();

        engines
            .iter()
            .filter_map(|engine| {
                by_template
                    .get(&QueryTemplate::for_engine(*engine))
                    .map(|outcome| (*engine, outcome.clone()))
            })
            .collect()
    }

    /// Cache hit-rate counters
    pub fn stats(&self) -> GeneratorStats {
        GeneratorStats {
            cache_hits: self.hits.load(Ordering::Relaxed),
            cache_misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Deterministic fingerprint of a request and template
    fn fingerprint(request: &QueryRequest, template: QueryTemplate) -> u64 {
        let mut hasher = DefaultHasher::new();
        template.hash(&mut hasher);
        request.count.hash(&mut hasher);
        request.criteria.language.hash(&mut hasher);
        for category in &request.criteria.funding_categories {
            format!("{category:?}").hash(&mut hasher);
        }
        for scope in &request.criteria.geographic_scopes {
            format!("{scope:?}").hash(&mut hasher);
        }
        for recipient in &request.criteria.recipient_types {
            format!("{recipient:?}").hash(&mut hasher);
        }
        format!("{:?}", request.criteria.project_scale).hash(&mut hasher);
        hasher.finish()
    }

    /// Render the prompt for a template
    fn prompt_for(template: QueryTemplate, request: &QueryRequest) -> String {
        let criteria = &request.criteria;
        let categories: Vec<&str> = criteria
            .funding_categories
            .iter()
            .flat_map(|c| c.terms().iter().copied())
            .collect();
        let regions: Vec<String> = criteria.region_terms();
        let recipients: Vec<String> = criteria
            .recipient_types
            .iter()
            .map(|r| format!("{r:?}"))
            .collect();

        match template {
            QueryTemplate::Keyword => format!(
                "Generate {} short web search queries (3 to 8 words each, one per line, \
                 no numbering) to find funding opportunities.\n\
                 Topics: {}.\nRegions: {}.\nRecipients: {}.\nLanguage: {}.",
                request.count,
                categories.join(", "),
                regions.join(", "),
                recipients.join(", "),
                criteria.language,
            ),
            QueryTemplate::AiOptimized => format!(
                "Generate {} detailed questions (15 to 30 words each, one per line, \
                 no numbering) asking which organizations currently offer funding.\n\
                 Topics: {}.\nRegions: {}.\nRecipients: {}.\nLanguage: {}.",
                request.count,
                categories.join(", "),
                regions.join(", "),
                recipients.join(", "),
                criteria.language,
            ),
        }
    }

    /// Parse backend output into accepted queries and rejection reasons
    fn parse_queries(
        raw: &str,
        template: QueryTemplate,
        count: u32,
    ) -> (Vec<String>, Vec<String>) {
        let mut accepted: Vec<String> = Vec::new();
        let mut rejected = Vec::new();

        for line in raw.lines() {
            let cleaned = line
                .trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
                .trim_start_matches(['-', '*', '•'])
                .trim()
                .trim_matches('"')
                .to_string();

            if cleaned.is_empty() {
                continue;
            }
            if accepted.iter().any(|q| q == &cleaned) {
                rejected.push(format!("duplicate query: {cleaned}"));
                continue;
            }

            let words = cleaned.split_whitespace().count();
            let acceptable = match template {
                QueryTemplate::Keyword => (1..=8).contains(&words),
                QueryTemplate::AiOptimized => (8..=40).contains(&words),
            };
            if !acceptable {
                rejected.push(format!("query length {words} words: {cleaned}"));
                continue;
            }

            accepted.push(cleaned);
            if accepted.len() as u32 == count {
                break;
            }
        }
        (accepted, rejected)
    }

    /// Deterministic built-in fallback list for a template
    fn fallback_for(template: QueryTemplate, request: &QueryRequest) -> Vec<String> {
        let criteria = &request.criteria;
        let regions = criteria.region_terms();
        let region = regions.first().map_or("europe", |r| r.as_str());

        let mut queries = Vec::new();
        match template {
            QueryTemplate::Keyword => {
                for category in &criteria.funding_categories {
                    for term in category.terms() {
                        queries.push(format!("{term} grants {region}"));
                        queries.push(format!("{term} funding program {region}"));
                    }
                }
                queries.push(format!("ngo grants {region} apply"));
                queries.push(format!("municipal funding opportunities {region}"));
                queries.push(format!("eu funding calls {region}"));
            }
            QueryTemplate::AiOptimized => {
                for category in &criteria.funding_categories {
                    let term = category.terms().first().copied().unwrap_or("community");
                    queries.push(format!(
                        "Which foundations, ministries, or European Union programs currently \
                         offer grants or other funding for {term} projects in {region}, and \
                         what are their application deadlines?"
                    ));
                }
                queries.push(format!(
                    "What funding opportunities, grants, or subsidies are open right now for \
                     non-governmental organizations and municipalities working in {region}?"
                ));
            }
        }

        queries.dedup();
        queries.truncate(request.count as usize);
        if queries.is_empty() {
            // Cannot happen with validated criteria, but the contract is
            // a non-empty list, unconditionally.
            queries.push(format!("funding opportunities {region}"));
        }
        queries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn request() -> QueryRequest {
        QueryRequest::new(SearchCriteria::canned(), 3)
    }

    fn generator(backend: MockGeneratorBackend) -> QueryGenerator {
        QueryGenerator::new(Arc::new(backend), Arc::new(MemoryStore::new()))
            .with_budget(Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_live_generation() {
        let mut backend = MockGeneratorBackend::new();
        backend.expect_model_id().return_const("test-model".to_string());
        backend.expect_complete().times(1).returning(|_| {
            Ok("- education grants bulgaria\n- school funding program eu\n- ngo grants sofia"
                .to_string())
        });

        let generator = generator(backend);
        let outcome = generator
            .generate(&request(), QueryTemplate::Keyword, None)
            .await;

        assert_eq!(
            outcome.queries,
            vec![
                "education grants bulgaria".to_string(),
                "school funding program eu".to_string(),
                "ngo grants sofia".to_string(),
            ]
        );
        assert!(!outcome.fallback_used);
        assert_eq!(outcome.model_id.as_deref(), Some("test-model"));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_backend() {
        let mut backend = MockGeneratorBackend::new();
        backend.expect_model_id().return_const("test-model".to_string());
        // Exactly one backend call despite two generate() calls.
        backend
            .expect_complete()
            .times(1)
            .returning(|_| Ok("one grants query\ntwo grants query\nthree grants query".to_string()));

        let generator = generator(backend);
        let first = generator
            .generate(&request(), QueryTemplate::Keyword, None)
            .await;
        let second = generator
            .generate(&request(), QueryTemplate::Keyword, None)
            .await;

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.queries, second.queries);
        assert_eq!(
            generator.stats(),
            GeneratorStats {
                cache_hits: 1,
                cache_misses: 1
            }
        );
    }

    #[tokio::test]
    async fn test_backend_failure_uses_fallback() {
        let mut backend = MockGeneratorBackend::new();
        backend.expect_model_id().return_const("test-model".to_string());
        backend
            .expect_complete()
            .returning(|_| Err(GeneratorError::Unavailable("connection refused".to_string())));

        let store = MemoryStore::new();
        let generator = QueryGenerator::new(Arc::new(backend), Arc::new(store.clone()));
        let outcome = generator
            .generate(&request(), QueryTemplate::Keyword, None)
            .await;

        assert!(outcome.fallback_used);
        assert!(!outcome.queries.is_empty());
        assert!(outcome.model_id.is_none());

        // The degradation was recorded.
        use crate::store::GenerationStore as _;
        let records = store.list_recent_generations(1).await.unwrap();
        assert!(records[0].fallback_used);
        assert!(records[0].fallback_reason.is_some());
    }

    #[tokio::test]
    async fn test_short_output_uses_fallback() {
        let mut backend = MockGeneratorBackend::new();
        backend.expect_model_id().return_const("test-model".to_string());
        backend
            .expect_complete()
            .returning(|_| Ok("only one query here".to_string()));

        let generator = generator(backend);
        let outcome = generator
            .generate(&request(), QueryTemplate::Keyword, None)
            .await;
        assert!(outcome.fallback_used);
        assert_eq!(outcome.queries.len(), 3);
    }

    #[tokio::test]
    async fn test_generate_multi_one_call_per_template() {
        let mut backend = MockGeneratorBackend::new();
        backend.expect_model_id().return_const("test-model".to_string());
        // Two templates requested (keyword x2 engines, ai x1): two calls.
        backend.expect_complete().times(2).returning(|prompt| {
            if prompt.contains("detailed questions") {
                Ok("Which organizations in bulgaria currently offer education grants to \
                    municipalities and what are the application deadlines this year\n\
                    Which european union programs fund community development projects for \
                    non-governmental organizations in bulgaria right now\n\
                    What foundations provide scholarships and school funding for rural \
                    municipalities across bulgaria and southeast europe today"
                    .to_string())
            } else {
                Ok("education grants bulgaria\nschool funding eu\nngo grants sofia".to_string())
            }
        });

        let generator = generator(backend);
        let outcomes = generator
            .generate_multi(
                &[
                    EngineKind::Websearch,
                    EngineKind::MetaSearch,
                    EngineKind::AiAnswer,
                ],
                &request(),
                None,
            )
            .await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes[&EngineKind::Websearch].queries,
            outcomes[&EngineKind::MetaSearch].queries
        );
        assert_ne!(
            outcomes[&EngineKind::Websearch].queries,
            outcomes[&EngineKind::AiAnswer].queries
        );
    }

    #[test]
    fn test_parse_strips_numbering_and_rejects_long() {
        let raw = "1. education grants bulgaria\n\
                   2) \"school funding eu\"\n\
                   * a query that is certainly way too long to pass the keyword filter rules\n\
                   education grants bulgaria\n\
                   - ngo grants sofia";
        let (accepted, rejected) = QueryGenerator::parse_queries(raw, QueryTemplate::Keyword, 10);
        assert_eq!(
            accepted,
            vec![
                "education grants bulgaria".to_string(),
                "school funding eu".to_string(),
                "ngo grants sofia".to_string(),
            ]
        );
        assert_eq!(rejected.len(), 2);
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let req = request();
        let a = QueryGenerator::fallback_for(QueryTemplate::Keyword, &req);
        let b = QueryGenerator::fallback_for(QueryTemplate::Keyword, &req);
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_fingerprint_sensitivity() {
        let req = request();
        let base = QueryGenerator::fingerprint(&req, QueryTemplate::Keyword);
        assert_eq!(
            base,
            QueryGenerator::fingerprint(&req, QueryTemplate::Keyword)
        );
        assert_ne!(
            base,
            QueryGenerator::fingerprint(&req, QueryTemplate::AiOptimized)
        );

        let mut other = request();
        other.count = 5;
        assert_ne!(base, QueryGenerator::fingerprint(&other, QueryTemplate::Keyword));
    }
}
