// Copyright 2025 Cowboy AI, LLC.

//! In-memory store for tests and single-process runs

use crate::bus::events::WorkflowErrorEvent;
use crate::confidence::Confidence;
use crate::domain::{
    Candidate, CandidateStatus, DiscoverySession, DomainRecord, EngineKind, EnhancementRecord,
    MetadataJudgment, ProcessedOutcome, ProviderUsage, QueryGenerationRecord, SavedQuery,
    ScheduleDay, SessionProgress, SessionStatus,
};
use crate::errors::{DiscoveryError, DiscoveryResult};
use crate::identifiers::{CandidateId, ErrorId, SessionId};
use crate::store::{
    CandidateFilter, CandidateInsert, CandidatePage, CandidateStore, DeadLetterStore, DomainStore,
    EnhancementStore, GenerationStore, JudgmentStore, SavedQueryStore, SessionStore, SortDirection,
    SortField, UsageStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, DiscoverySession>,
    disabled_engines: HashMap<SessionId, Vec<EngineKind>>,
    domains: HashMap<String, DomainRecord>,
    candidates: HashMap<CandidateId, Candidate>,
    candidate_index: HashMap<(SessionId, String), CandidateId>,
    judgments: Vec<MetadataJudgment>,
    enhancements: Vec<EnhancementRecord>,
    usage: Vec<ProviderUsage>,
    saved_queries: HashMap<Uuid, SavedQuery>,
    generations: Vec<QueryGenerationRecord>,
    dead_letters: HashMap<ErrorId, WorkflowErrorEvent>,
    dead_letter_order: Vec<ErrorId>,
}

/// In-memory implementation of every store trait
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: DiscoverySession) -> DiscoveryResult<()> {
        let mut inner = self.inner.write().await;
        if inner.sessions.contains_key(&session.id) {
            return Err(DiscoveryError::AlreadyExists(session.id.to_string()));
        }
        inner.sessions.insert(session.id, session);
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> DiscoveryResult<Option<DiscoverySession>> {
        Ok(self.inner.read().await.sessions.get(&id).cloned())
    }

    async fn list_recent_sessions(&self, limit: usize) -> DiscoveryResult<Vec<DiscoverySession>> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<DiscoverySession> = inner.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn record_engine_request(
        &self,
        id: SessionId,
        engine: EngineKind,
        results_found: u64,
        failed: bool,
    ) -> DiscoveryResult<Option<SessionProgress>> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or_else(|| not_found("DiscoverySession", &id.to_string()))?;
        if !session.is_running() {
            return Ok(None);
        }
        session.progress.requests_completed += 1;
        session.progress.results_found += results_found;
        let stats = session.engine_stats_mut(engine);
        stats.requests_completed += 1;
        stats.results_found += results_found;
        if failed {
            stats.failures += 1;
        }
        Ok(Some(session.progress))
    }

    async fn record_outcome(
        &self,
        id: SessionId,
        outcome: ProcessedOutcome,
    ) -> DiscoveryResult<Option<SessionProgress>> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or_else(|| not_found("DiscoverySession", &id.to_string()))?;
        if !session.is_running() {
            return Ok(None);
        }
        session.statistics.record(outcome);
        session.progress.results_processed += 1;
        Ok(Some(session.progress))
    }

    async fn disable_engine(&self, id: SessionId, engine: EngineKind) -> DiscoveryResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(session) = inner.sessions.get_mut(&id) {
            session.engine_stats_mut(engine).disabled = true;
        }
        let disabled = inner.disabled_engines.entry(id).or_default();
        if !disabled.contains(&engine) {
            disabled.push(engine);
        }
        Ok(())
    }

    async fn is_engine_disabled(
        &self,
        id: SessionId,
        engine: EngineKind,
    ) -> DiscoveryResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .disabled_engines
            .get(&id)
            .is_some_and(|engines| engines.contains(&engine)))
    }

    async fn try_finalize_session(
        &self,
        id: SessionId,
        status: SessionStatus,
    ) -> DiscoveryResult<bool> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or_else(|| not_found("DiscoverySession", &id.to_string()))?;
        if !session.is_running() {
            return Ok(false);
        }
        session.finalize(status, Utc::now());
        Ok(true)
    }
}

#[async_trait]
impl DomainStore for MemoryStore {
    async fn register_or_get(
        &self,
        host: &str,
        session: SessionId,
    ) -> DiscoveryResult<DomainRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .domains
            .entry(host.to_string())
            .or_insert_with(|| DomainRecord::new(host, session, Utc::now()));
        Ok(record.clone())
    }

    async fn get_domain(&self, host: &str) -> DiscoveryResult<Option<DomainRecord>> {
        Ok(self.inner.read().await.domains.get(host).cloned())
    }

    async fn should_process(&self, host: &str) -> DiscoveryResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .domains
            .get(host)
            .map_or(true, |record| record.should_process(Utc::now())))
    }

    async fn is_blacklisted(&self, host: &str) -> DiscoveryResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .domains
            .get(host)
            .is_some_and(|record| record.blacklist.is_some()))
    }

    async fn update_quality(
        &self,
        host: &str,
        confidence: Confidence,
        is_high: bool,
    ) -> DiscoveryResult<DomainRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .domains
            .get_mut(host)
            .ok_or_else(|| not_found("Domain", host))?;
        record.apply_quality(confidence, is_high, Utc::now());
        Ok(record.clone())
    }

    async fn blacklist_domain(
        &self,
        host: &str,
        reason: &str,
        actor: &str,
    ) -> DiscoveryResult<DomainRecord> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let record = inner
            .domains
            .entry(host.to_string())
            .or_insert_with(|| DomainRecord::new(host, SessionId::new(), now));
        record.blacklist(reason, actor, now);
        Ok(record.clone())
    }

    async fn unblacklist_domain(&self, host: &str, _actor: &str) -> DiscoveryResult<DomainRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .domains
            .get_mut(host)
            .ok_or_else(|| not_found("Domain", host))?;
        record.unblacklist();
        Ok(record.clone())
    }

    async fn mark_no_funds(
        &self,
        host: &str,
        year: i32,
        notes: Option<String>,
    ) -> DiscoveryResult<DomainRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .domains
            .get_mut(host)
            .ok_or_else(|| not_found("Domain", host))?;
        record.mark_no_funds(year, notes);
        Ok(record.clone())
    }

    async fn record_domain_failure(
        &self,
        host: &str,
        reason: &str,
    ) -> DiscoveryResult<DomainRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .domains
            .get_mut(host)
            .ok_or_else(|| not_found("Domain", host))?;
        record.record_failure(reason, Utc::now());
        Ok(record.clone())
    }
}

#[async_trait]
impl CandidateStore for MemoryStore {
    async fn insert_candidate(&self, candidate: Candidate) -> DiscoveryResult<CandidateInsert> {
        let mut inner = self.inner.write().await;
        let key = (candidate.session_id, candidate.host.clone());
        if let Some(existing) = inner.candidate_index.get(&key) {
            return Ok(CandidateInsert::Existing(*existing));
        }
        let id = candidate.id;
        inner.candidate_index.insert(key, id);
        inner.candidates.insert(id, candidate);
        Ok(CandidateInsert::Inserted(id))
    }

    async fn get_candidate(&self, id: CandidateId) -> DiscoveryResult<Option<Candidate>> {
        Ok(self.inner.read().await.candidates.get(&id).cloned())
    }

    async fn review_candidate(
        &self,
        id: CandidateId,
        target: CandidateStatus,
        reviewer: &str,
    ) -> DiscoveryResult<Candidate> {
        let mut inner = self.inner.write().await;
        let candidate = inner
            .candidates
            .get_mut(&id)
            .ok_or_else(|| not_found("Candidate", &id.to_string()))?;
        candidate.review(target, reviewer, Utc::now())?;
        Ok(candidate.clone())
    }

    async fn query_candidates(&self, filter: &CandidateFilter) -> DiscoveryResult<CandidatePage> {
        let filter = filter.clone().sanitized();
        let inner = self.inner.read().await;

        let mut matching: Vec<Candidate> = inner
            .candidates
            .values()
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .filter(|c| filter.min_confidence.map_or(true, |m| c.confidence >= m))
            .filter(|c| filter.engine.map_or(true, |e| c.engine == e))
            .filter(|c| filter.start_date.map_or(true, |d| c.created_at >= d))
            .filter(|c| filter.end_date.map_or(true, |d| c.created_at <= d))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let ordering = match filter.sort_by {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::Confidence => a.confidence.cmp(&b.confidence),
                SortField::Host => a.host.cmp(&b.host),
            };
            match filter.sort_direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let total_items = matching.len() as u64;
        let items: Vec<Candidate> = matching
            .into_iter()
            .skip(filter.page * filter.size)
            .take(filter.size)
            .collect();

        Ok(CandidatePage {
            items,
            page: filter.page,
            size: filter.size,
            total_items,
        })
    }
}

#[async_trait]
impl JudgmentStore for MemoryStore {
    async fn insert_judgment(&self, judgment: MetadataJudgment) -> DiscoveryResult<()> {
        self.inner.write().await.judgments.push(judgment);
        Ok(())
    }

    async fn judgments_for(&self, id: CandidateId) -> DiscoveryResult<Vec<MetadataJudgment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .judgments
            .iter()
            .filter(|j| j.candidate_id == id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EnhancementStore for MemoryStore {
    async fn append_enhancement(&self, record: EnhancementRecord) -> DiscoveryResult<()> {
        if !record.timestamp_acceptable(Utc::now()) {
            return Err(DiscoveryError::validation(format!(
                "enhancement timestamp {} outside the clock-skew tolerance",
                record.recorded_at
            )));
        }
        self.inner.write().await.enhancements.push(record);
        Ok(())
    }

    async fn enhancements_for(&self, id: CandidateId) -> DiscoveryResult<Vec<EnhancementRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .enhancements
            .iter()
            .filter(|r| r.candidate_id == id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn record_usage(&self, usage: ProviderUsage) -> DiscoveryResult<()> {
        self.inner.write().await.usage.push(usage);
        Ok(())
    }

    async fn complete_usage(
        &self,
        id: Uuid,
        result_count: u32,
        success: bool,
        response_time_ms: u64,
    ) -> DiscoveryResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(row) = inner.usage.iter_mut().find(|u| u.id == id) {
            row.result_count = result_count;
            row.success = success;
            row.response_time_ms = response_time_ms;
        }
        Ok(())
    }

    async fn count_usage_since(
        &self,
        provider: EngineKind,
        since: DateTime<Utc>,
    ) -> DiscoveryResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .usage
            .iter()
            .filter(|u| u.provider == provider && u.requested_at >= since)
            .count() as u64)
    }
}

#[async_trait]
impl SavedQueryStore for MemoryStore {
    async fn upsert_saved_query(&self, query: SavedQuery) -> DiscoveryResult<()> {
        self.inner.write().await.saved_queries.insert(query.id, query);
        Ok(())
    }

    async fn list_saved_queries(&self) -> DiscoveryResult<Vec<SavedQuery>> {
        let inner = self.inner.read().await;
        let mut queries: Vec<SavedQuery> = inner.saved_queries.values().cloned().collect();
        queries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(queries)
    }

    async fn saved_queries_for(&self, day: ScheduleDay) -> DiscoveryResult<Vec<SavedQuery>> {
        let inner = self.inner.read().await;
        let mut queries: Vec<SavedQuery> = inner
            .saved_queries
            .values()
            .filter(|q| q.enabled && q.day == day)
            .cloned()
            .collect();
        queries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(queries)
    }
}

#[async_trait]
impl GenerationStore for MemoryStore {
    async fn record_generation(&self, record: QueryGenerationRecord) -> DiscoveryResult<()> {
        self.inner.write().await.generations.push(record);
        Ok(())
    }

    async fn list_recent_generations(
        &self,
        limit: usize,
    ) -> DiscoveryResult<Vec<QueryGenerationRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<QueryGenerationRecord> = inner.generations.clone();
        records.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        records.truncate(limit);
        Ok(records)
    }
}

#[async_trait]
impl DeadLetterStore for MemoryStore {
    async fn record_dead_letter(&self, event: WorkflowErrorEvent) -> DiscoveryResult<()> {
        let mut inner = self.inner.write().await;
        let id = event.error_id;
        if inner.dead_letters.insert(id, event).is_none() {
            inner.dead_letter_order.push(id);
        }
        Ok(())
    }

    async fn get_dead_letter(&self, id: ErrorId) -> DiscoveryResult<Option<WorkflowErrorEvent>> {
        Ok(self.inner.read().await.dead_letters.get(&id).cloned())
    }

    async fn recent_dead_letters(
        &self,
        limit: usize,
    ) -> DiscoveryResult<Vec<WorkflowErrorEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .dead_letter_order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| inner.dead_letters.get(id).cloned())
            .collect())
    }
}

fn not_found(entity_type: &str, id: &str) -> DiscoveryError {
    DiscoveryError::EntityNotFound {
        entity_type: entity_type.to_string(),
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SearchCriteria, SessionType};

    fn session() -> DiscoverySession {
        DiscoverySession::new(SessionType::Manual, SearchCriteria::canned())
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = MemoryStore::new();
        let mut s = session();
        s.progress.requests_total = 1;
        let id = s.id;
        store.create_session(s).await.unwrap();

        let progress = store
            .record_engine_request(id, EngineKind::Websearch, 3, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(progress.requests_completed, 1);
        assert_eq!(progress.results_found, 3);

        for _ in 0..3 {
            store
                .record_outcome(id, ProcessedOutcome::HighConfidence)
                .await
                .unwrap();
        }

        assert!(store
            .try_finalize_session(id, SessionStatus::Completed)
            .await
            .unwrap());
        // Second finalize is a no-op.
        assert!(!store
            .try_finalize_session(id, SessionStatus::Failed)
            .await
            .unwrap());

        let stored = store.get_session(id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert_eq!(stored.statistics.high_confidence, 3);
        assert!(stored.statistics.is_conserved());
    }

    #[tokio::test]
    async fn test_counters_immutable_after_finalize() {
        let store = MemoryStore::new();
        let s = session();
        let id = s.id;
        store.create_session(s).await.unwrap();
        store
            .try_finalize_session(id, SessionStatus::Failed)
            .await
            .unwrap();

        // Stale outputs are ignored, not errors.
        assert!(store
            .record_outcome(id, ProcessedOutcome::HighConfidence)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .record_engine_request(id, EngineKind::Websearch, 5, false)
            .await
            .unwrap()
            .is_none());

        let stored = store.get_session(id).await.unwrap().unwrap();
        assert_eq!(stored.statistics.total_results_processed, 0);
        assert_eq!(stored.progress.results_found, 0);
    }

    #[tokio::test]
    async fn test_register_or_get_is_idempotent() {
        let store = MemoryStore::new();
        let session_id = SessionId::new();
        let first = store.register_or_get("example.org", session_id).await.unwrap();
        let second = store
            .register_or_get("example.org", SessionId::new())
            .await
            .unwrap();
        assert_eq!(first.discovered_in, second.discovered_in);
        assert_eq!(first.discovered_at, second.discovered_at);
    }

    #[tokio::test]
    async fn test_candidate_insert_idempotent_on_session_host() {
        let store = MemoryStore::new();
        let session_id = SessionId::new();
        let mut candidate = crate::domain::Candidate {
            id: CandidateId::new(),
            status: CandidateStatus::PendingCrawl,
            confidence: Confidence::from_hundredths(80).unwrap(),
            host: "example.org".to_string(),
            session_id,
            source_url: "https://example.org".to_string(),
            title: "t".to_string(),
            snippet: "s".to_string(),
            engine: EngineKind::Websearch,
            organization_name: None,
            program_name: None,
            categories: vec![],
            geographic_eligibility: vec![],
            organization_types: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            reviewer: None,
        };

        let first = store.insert_candidate(candidate.clone()).await.unwrap();
        assert!(first.was_inserted());

        candidate.id = CandidateId::new();
        let second = store.insert_candidate(candidate).await.unwrap();
        assert!(!second.was_inserted());
        assert_eq!(second.id(), first.id());
    }

    #[tokio::test]
    async fn test_review_unknown_candidate_not_found() {
        let store = MemoryStore::new();
        let err = store
            .review_candidate(CandidateId::new(), CandidateStatus::Approved, "r")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_usage_rolling_count() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store
                .record_usage(ProviderUsage::reserve(EngineKind::AiAnswer, "q"))
                .await
                .unwrap();
        }
        store
            .record_usage(ProviderUsage::reserve(EngineKind::Websearch, "q"))
            .await
            .unwrap();

        let hour_ago = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(
            store
                .count_usage_since(EngineKind::AiAnswer, hour_ago)
                .await
                .unwrap(),
            3
        );
        assert_eq!(
            store
                .count_usage_since(EngineKind::AiAnswer, Utc::now() + chrono::Duration::hours(1))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_enhancement_backdating_rejected() {
        let store = MemoryStore::new();
        let mut record = EnhancementRecord::manual(CandidateId::new(), "r", "notes", None, None);
        record.recorded_at = Utc::now() - chrono::Duration::hours(2);
        let err = store.append_enhancement(record).await.unwrap_err();
        assert!(err.is_validation_error());
    }

    #[tokio::test]
    async fn test_dead_letter_roundtrip() {
        use crate::bus::events::PipelineStage;
        let store = MemoryStore::new();
        let event = WorkflowErrorEvent::new(
            PipelineStage::SearchExecution,
            "TIMEOUT",
            "x",
            serde_json::json!({"query": "q"}),
        );
        let id = event.error_id;
        store.record_dead_letter(event).await.unwrap();

        assert!(store.get_dead_letter(id).await.unwrap().is_some());
        assert_eq!(store.recent_dead_letters(10).await.unwrap().len(), 1);
    }
}
