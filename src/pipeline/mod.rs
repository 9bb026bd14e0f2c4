// Copyright 2025 Cowboy AI, LLC.

//! The seven-stage result-processing pipeline
//!
//! Per raw result: domain extraction, spam-TLD filter, in-session dedup,
//! blacklist check, confidence scoring, threshold classification, and
//! candidate persistence. Every result reaches exactly one terminal
//! outcome, which keeps the per-session counters conserved.

mod antispam;
mod keywords;
mod scoring;
mod tld;

pub use antispam::{SpamChecks, SpamPolicy, SpamSignal};
pub use keywords::{
    contains_term, matching_terms, word_set, DEFAULT_REGION_TERMS, FUNDING_KEYWORDS,
    FUNCTION_WORDS, ORGANIZATION_TERMS,
};
pub use scoring::{ConfidenceScorer, ScoredResult};
pub use tld::{TldTable, TldTier};

use crate::adapters::SearchHit;
use crate::cache::BlacklistCache;
use crate::confidence::Confidence;
use crate::domain::{
    extract_domain, Candidate, CandidateStatus, MetadataJudgment, ProcessedOutcome, SearchCriteria,
};
use crate::errors::DiscoveryResult;
use crate::identifiers::{CandidateId, SessionId};
use crate::store::{CandidateStore, DomainStore, JudgmentStore};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Confidence threshold separating PendingCrawl from SkippedLowConfidence
    pub threshold: Confidence,
    /// Anti-spam pre-filter policy
    pub spam_policy: SpamPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: Confidence::DEFAULT_THRESHOLD,
            spam_policy: SpamPolicy::default(),
        }
    }
}

/// Per-session processing state held by the scoring consumer
///
/// The seen-host set implements in-session deduplication; the processed-key
/// set makes redelivered results no-ops so reprocessing leaves counters and
/// candidates untouched.
#[derive(Debug)]
pub struct SessionContext {
    /// Session this context belongs to
    pub session_id: SessionId,
    /// Scorer built from the session's criteria
    pub scorer: ConfidenceScorer,
    seen_hosts: HashSet<String>,
    processed_keys: HashSet<String>,
}

impl SessionContext {
    /// Build a context for a session's criteria
    pub fn new(session_id: SessionId, criteria: &SearchCriteria) -> Self {
        Self {
            session_id,
            scorer: ConfidenceScorer::new(TldTable::default(), criteria.region_terms()),
            seen_hosts: HashSet::new(),
            processed_keys: HashSet::new(),
        }
    }

    /// Hosts seen so far in this session
    pub fn seen_count(&self) -> usize {
        self.seen_hosts.len()
    }
}

/// Terminal outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// This exact result was already processed; nothing changed
    Reprocessed,
    /// The result reached a counted terminal outcome without a candidate
    Skipped(ProcessedOutcome),
    /// A candidate exists for this result (created now or found existing)
    Candidate {
        /// The candidate id
        id: CandidateId,
        /// Status it was classified into
        status: CandidateStatus,
        /// Confidence it scored
        confidence: Confidence,
        /// Counted outcome (high or low confidence)
        outcome: ProcessedOutcome,
    },
}

impl PipelineOutcome {
    /// The session-statistics outcome to count, if any
    pub fn counted(&self) -> Option<ProcessedOutcome> {
        match self {
            PipelineOutcome::Reprocessed => None,
            PipelineOutcome::Skipped(outcome) => Some(*outcome),
            PipelineOutcome::Candidate { outcome, .. } => Some(*outcome),
        }
    }
}

/// The result-processing pipeline
pub struct ResultPipeline {
    domains: Arc<dyn DomainStore>,
    candidates: Arc<dyn CandidateStore>,
    judgments: Arc<dyn JudgmentStore>,
    blacklist: Arc<BlacklistCache>,
    spam_checks: SpamChecks,
    config: PipelineConfig,
}

impl ResultPipeline {
    /// Wire the pipeline to its stores and cache
    pub fn new(
        domains: Arc<dyn DomainStore>,
        candidates: Arc<dyn CandidateStore>,
        judgments: Arc<dyn JudgmentStore>,
        blacklist: Arc<BlacklistCache>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            domains,
            candidates,
            judgments,
            blacklist,
            spam_checks: SpamChecks,
            config,
        }
    }

    /// The configured confidence threshold
    pub fn threshold(&self) -> Confidence {
        self.config.threshold
    }

    /// Run the seven stages for one raw result
    ///
    /// `result_key` identifies the result across redeliveries; processing
    /// the same key twice in one context is a no-op.
    pub async fn process(
        &self,
        ctx: &mut SessionContext,
        hit: &SearchHit,
        result_key: &str,
    ) -> DiscoveryResult<PipelineOutcome> {
        if !ctx.processed_keys.insert(result_key.to_string()) {
            debug!(result_key, "result already processed, skipping");
            return Ok(PipelineOutcome::Reprocessed);
        }

        // Stage 1: domain extraction.
        let host = match extract_domain(&hit.url) {
            Ok(host) => host,
            Err(e) => {
                debug!(url = %hit.url, error = %e, "invalid url skipped");
                return Ok(PipelineOutcome::Skipped(ProcessedOutcome::InvalidUrl));
            }
        };

        // Stage 2: spam-TLD filter.
        if ctx.scorer.tld_table().is_spam(&host) {
            debug!(host, "spam tld filtered");
            return Ok(PipelineOutcome::Skipped(ProcessedOutcome::SpamTld));
        }

        // Stage 3: in-session deduplication.
        if !ctx.seen_hosts.insert(host.clone()) {
            debug!(host, "duplicate host skipped");
            return Ok(PipelineOutcome::Skipped(ProcessedOutcome::Duplicate));
        }

        // Stage 4: blacklist check through the cache.
        if self.blacklist.is_blacklisted(&host).await? {
            debug!(host, "blacklisted host skipped");
            return Ok(PipelineOutcome::Skipped(ProcessedOutcome::Blacklisted));
        }

        // Optional anti-spam pre-filter in front of scoring.
        let spam_signal = if self.config.spam_policy == SpamPolicy::Disabled {
            None
        } else {
            self.spam_checks.detect(&host, &hit.title, &hit.snippet)
        };
        if let Some(signal) = spam_signal {
            warn!(host, signal = %signal, "anti-spam check fired");
            if self.config.spam_policy == SpamPolicy::PreFilter {
                return Ok(PipelineOutcome::Skipped(ProcessedOutcome::SpamTld));
            }
        }

        // Stage 5: confidence scoring.
        let scored = if spam_signal.is_some() {
            ScoredResult {
                confidence: Confidence::ZERO,
                breakdown: Default::default(),
                keywords_found: Vec::new(),
            }
        } else {
            ctx.scorer.score(&hit.title, &hit.snippet, &host)
        };

        // Stage 6: threshold classification. Both classes persist.
        let status = Candidate::status_for(scored.confidence, self.config.threshold);
        let is_high = status == CandidateStatus::PendingCrawl;
        let outcome = if is_high {
            ProcessedOutcome::HighConfidence
        } else {
            ProcessedOutcome::LowConfidence
        };

        // Stage 7: persistence, retried once; the second failure bubbles up
        // and the consumer dead-letters this result alone.
        let candidate_id = match self.persist(ctx, hit, &host, &scored, status, is_high).await {
            Ok(id) => id,
            Err(first) => {
                warn!(host, error = %first, "persistence failed, retrying once");
                self.persist(ctx, hit, &host, &scored, status, is_high)
                    .await?
            }
        };

        Ok(PipelineOutcome::Candidate {
            id: candidate_id,
            status,
            confidence: scored.confidence,
            outcome,
        })
    }

    async fn persist(
        &self,
        ctx: &SessionContext,
        hit: &SearchHit,
        host: &str,
        scored: &ScoredResult,
        status: CandidateStatus,
        is_high: bool,
    ) -> DiscoveryResult<CandidateId> {
        self.domains.register_or_get(host, ctx.session_id).await?;

        let now = Utc::now();
        let candidate = Candidate {
            id: CandidateId::new(),
            status,
            confidence: scored.confidence,
            host: host.to_string(),
            session_id: ctx.session_id,
            source_url: hit.url.clone(),
            title: hit.title.clone(),
            snippet: hit.snippet.clone(),
            engine: hit.engine,
            organization_name: None,
            program_name: None,
            categories: Vec::new(),
            geographic_eligibility: Vec::new(),
            organization_types: Vec::new(),
            created_at: now,
            updated_at: now,
            reviewer: None,
        };
        let inserted = self.candidates.insert_candidate(candidate).await?;

        if inserted.was_inserted() {
            self.domains
                .update_quality(host, scored.confidence, is_high)
                .await?;
            self.judgments
                .insert_judgment(MetadataJudgment {
                    candidate_id: inserted.id(),
                    session_id: ctx.session_id,
                    breakdown: scored.breakdown,
                    confidence: scored.confidence,
                    keywords_found: scored.keywords_found.clone(),
                    engine: hit.engine,
                    judged_at: now,
                })
                .await?;
        }

        Ok(inserted.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BlacklistCacheConfig;
    use crate::domain::{DomainStatus, EngineKind};
    use crate::store::{
        CandidateFilter, CandidateStore as _, DomainStore as _, JudgmentStore as _, MemoryStore,
    };

    fn pipeline_over(store: &MemoryStore, config: PipelineConfig) -> ResultPipeline {
        let store_arc = Arc::new(store.clone());
        ResultPipeline::new(
            store_arc.clone(),
            store_arc.clone(),
            store_arc.clone(),
            Arc::new(BlacklistCache::new(
                store_arc,
                BlacklistCacheConfig::default(),
            )),
            config,
        )
    }

    fn hit(url: &str, title: &str, snippet: &str, session: SessionId) -> SearchHit {
        SearchHit::new(url, title, snippet, 1, EngineKind::Websearch, session)
    }

    fn ctx(session: SessionId) -> SessionContext {
        SessionContext::new(session, &SearchCriteria::canned())
    }

    #[tokio::test]
    async fn test_high_confidence_candidate_created() {
        let store = MemoryStore::new();
        let pipeline = pipeline_over(&store, PipelineConfig::default());
        let session = SessionId::new();
        let mut ctx = ctx(session);

        let hit = hit(
            "https://example.ngo/grants",
            "European Commission Grants for Bulgaria",
            "Apply for funding and scholarships today",
            session,
        );
        let outcome = pipeline.process(&mut ctx, &hit, "k1").await.unwrap();

        let PipelineOutcome::Candidate {
            id,
            status,
            confidence,
            outcome,
        } = outcome
        else {
            panic!("expected a candidate");
        };
        assert_eq!(status, CandidateStatus::PendingCrawl);
        assert_eq!(confidence.to_string(), "0.90");
        assert_eq!(outcome, ProcessedOutcome::HighConfidence);

        // Judgment row written, domain promoted.
        let judgments = store.judgments_for(id).await.unwrap();
        assert_eq!(judgments.len(), 1);
        assert_eq!(judgments[0].breakdown.compound_bonus, 15);
        let domain = store.get_domain("example.ngo").await.unwrap().unwrap();
        assert_eq!(domain.status, DomainStatus::ProcessedHighQuality);
        assert_eq!(domain.best_confidence, confidence);
    }

    #[tokio::test]
    async fn test_low_confidence_still_creates_candidate() {
        let store = MemoryStore::new();
        let pipeline = pipeline_over(&store, PipelineConfig::default());
        let session = SessionId::new();
        let mut ctx = ctx(session);

        let hit = hit("https://example.info/page", "Some page", "Nothing here", session);
        let outcome = pipeline.process(&mut ctx, &hit, "k1").await.unwrap();
        let PipelineOutcome::Candidate { status, outcome, .. } = outcome else {
            panic!("expected a candidate");
        };
        assert_eq!(status, CandidateStatus::SkippedLowConfidence);
        assert_eq!(outcome, ProcessedOutcome::LowConfidence);

        let page = store
            .query_candidates(&CandidateFilter {
                size: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total_items, 1);
    }

    #[tokio::test]
    async fn test_spam_tld_filtered_before_scoring() {
        let store = MemoryStore::new();
        let pipeline = pipeline_over(&store, PipelineConfig::default());
        let session = SessionId::new();
        let mut ctx = ctx(session);

        let hit = hit(
            "https://spam-site.xyz/grants",
            "Grants available",
            "Apply now",
            session,
        );
        let outcome = pipeline.process(&mut ctx, &hit, "k1").await.unwrap();
        assert_eq!(
            outcome,
            PipelineOutcome::Skipped(ProcessedOutcome::SpamTld)
        );

        // No candidate, no domain row.
        assert!(store.get_domain("spam-site.xyz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_host_in_session() {
        let store = MemoryStore::new();
        let pipeline = pipeline_over(&store, PipelineConfig::default());
        let session = SessionId::new();
        let mut ctx = ctx(session);

        let first = hit("https://example.org/a", "Grants", "Funding", session);
        let second = hit("https://example.org/b", "Other page", "Text", session);

        pipeline.process(&mut ctx, &first, "k1").await.unwrap();
        let outcome = pipeline.process(&mut ctx, &second, "k2").await.unwrap();
        assert_eq!(
            outcome,
            PipelineOutcome::Skipped(ProcessedOutcome::Duplicate)
        );

        let page = store
            .query_candidates(&CandidateFilter {
                size: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total_items, 1);
    }

    #[tokio::test]
    async fn test_blacklisted_host_skipped() {
        let store = MemoryStore::new();
        store
            .blacklist_domain("casinowinners.com", "gambling", "ops")
            .await
            .unwrap();
        let pipeline = pipeline_over(&store, PipelineConfig::default());
        let session = SessionId::new();
        let mut ctx = ctx(session);

        let hit = hit(
            "https://casinowinners.com/grants",
            "Grants",
            "Funding",
            session,
        );
        let outcome = pipeline.process(&mut ctx, &hit, "k1").await.unwrap();
        assert_eq!(
            outcome,
            PipelineOutcome::Skipped(ProcessedOutcome::Blacklisted)
        );
    }

    #[tokio::test]
    async fn test_invalid_url_skipped() {
        let store = MemoryStore::new();
        let pipeline = pipeline_over(&store, PipelineConfig::default());
        let session = SessionId::new();
        let mut ctx = ctx(session);

        let mut bad = hit("https://example.org", "t", "s", session);
        bad.url = "mailto:grants@example.org".to_string();
        let outcome = pipeline.process(&mut ctx, &bad, "k1").await.unwrap();
        assert_eq!(
            outcome,
            PipelineOutcome::Skipped(ProcessedOutcome::InvalidUrl)
        );
    }

    #[tokio::test]
    async fn test_reprocessing_same_key_is_noop() {
        let store = MemoryStore::new();
        let pipeline = pipeline_over(&store, PipelineConfig::default());
        let session = SessionId::new();
        let mut ctx = ctx(session);

        let hit = hit("https://example.org/grants", "Grants", "Funding", session);
        let first = pipeline.process(&mut ctx, &hit, "same-key").await.unwrap();
        assert!(matches!(first, PipelineOutcome::Candidate { .. }));

        let second = pipeline.process(&mut ctx, &hit, "same-key").await.unwrap();
        assert_eq!(second, PipelineOutcome::Reprocessed);
        assert_eq!(second.counted(), None);

        // Still exactly one candidate and one judgment.
        let page = store
            .query_candidates(&CandidateFilter {
                size: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total_items, 1);
    }

    #[tokio::test]
    async fn test_spam_policy_score_zero() {
        let store = MemoryStore::new();
        let pipeline = pipeline_over(
            &store,
            PipelineConfig {
                threshold: Confidence::DEFAULT_THRESHOLD,
                spam_policy: SpamPolicy::ScoreZero,
            },
        );
        let session = SessionId::new();
        let mut ctx = ctx(session);

        // Keyword stuffing: kept, but scored zero and skipped.
        let hit = hit(
            "https://stuffed.example.com/grants",
            "grants grants grants grants",
            "grants grants grants money",
            session,
        );
        let outcome = pipeline.process(&mut ctx, &hit, "k1").await.unwrap();
        let PipelineOutcome::Candidate {
            status, confidence, ..
        } = outcome
        else {
            panic!("expected a zero-confidence candidate");
        };
        assert_eq!(status, CandidateStatus::SkippedLowConfidence);
        assert_eq!(confidence, Confidence::ZERO);
    }

    #[tokio::test]
    async fn test_spam_policy_pre_filter_drops() {
        let store = MemoryStore::new();
        let pipeline = pipeline_over(
            &store,
            PipelineConfig {
                threshold: Confidence::DEFAULT_THRESHOLD,
                spam_policy: SpamPolicy::PreFilter,
            },
        );
        let session = SessionId::new();
        let mut ctx = ctx(session);

        let hit = hit(
            "https://stuffed.example.com/grants",
            "grants grants grants grants",
            "grants grants grants money",
            session,
        );
        let outcome = pipeline.process(&mut ctx, &hit, "k1").await.unwrap();
        assert_eq!(
            outcome,
            PipelineOutcome::Skipped(ProcessedOutcome::SpamTld)
        );
        let page = store
            .query_candidates(&CandidateFilter {
                size: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total_items, 0);
    }
}
