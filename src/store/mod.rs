// Copyright 2025 Cowboy AI, LLC.

//! Repository traits over the discovery entities
//!
//! Each entity family gets a narrow async trait; [`MemoryStore`] implements
//! all of them for tests and single-process runs, [`NatsKvStore`] persists
//! them in NATS KV buckets. The traits express intent-level operations
//! (register-or-get, record-outcome, try-finalize) rather than raw CRUD so
//! the concurrency rules live in exactly one place per implementation.

mod memory;
mod nats_kv;

pub use memory::MemoryStore;
pub use nats_kv::{NatsKvConfig, NatsKvStore};

use crate::bus::events::WorkflowErrorEvent;
use crate::confidence::Confidence;
use crate::domain::{
    Candidate, CandidateStatus, DiscoverySession, DomainRecord, EngineKind, EnhancementRecord,
    MetadataJudgment, ProcessedOutcome, ProviderUsage, QueryGenerationRecord, SavedQuery,
    ScheduleDay, SessionProgress, SessionStatus,
};
use crate::errors::DiscoveryResult;
use crate::identifiers::{CandidateId, ErrorId, SessionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of an idempotent candidate insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateInsert {
    /// A new row was created
    Inserted(CandidateId),
    /// A row for this (session, host) already existed
    Existing(CandidateId),
}

impl CandidateInsert {
    /// The candidate id either way
    pub fn id(&self) -> CandidateId {
        match self {
            CandidateInsert::Inserted(id) | CandidateInsert::Existing(id) => *id,
        }
    }

    /// Whether a new row was created
    pub fn was_inserted(&self) -> bool {
        matches!(self, CandidateInsert::Inserted(_))
    }
}

/// Sort field for candidate listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    /// Creation timestamp
    #[default]
    CreatedAt,
    /// Confidence score
    Confidence,
    /// Normalized host
    Host,
}

impl SortField {
    /// Parse an ingress query value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "createdAt" => Some(SortField::CreatedAt),
            "confidence" => Some(SortField::Confidence),
            "host" => Some(SortField::Host),
            _ => None,
        }
    }
}

/// Sort direction for candidate listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    /// Descending (newest / highest first)
    #[default]
    Desc,
    /// Ascending
    Asc,
}

/// Filter and paging for candidate listings
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    /// Only this status
    pub status: Option<CandidateStatus>,
    /// Only candidates at or above this confidence
    pub min_confidence: Option<Confidence>,
    /// Only candidates from this engine
    pub engine: Option<EngineKind>,
    /// Only candidates created at or after this instant
    pub start_date: Option<DateTime<Utc>>,
    /// Only candidates created at or before this instant
    pub end_date: Option<DateTime<Utc>>,
    /// Sort field
    pub sort_by: SortField,
    /// Sort direction
    pub sort_direction: SortDirection,
    /// 0-indexed page
    pub page: usize,
    /// Page size, clamped to [1, 100]
    pub size: usize,
}

impl CandidateFilter {
    /// Clamp the page size into its legal range
    pub fn sanitized(mut self) -> Self {
        self.size = self.size.clamp(1, 100);
        self
    }
}

/// One page of candidates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePage {
    /// Candidates on this page
    pub items: Vec<Candidate>,
    /// 0-indexed page number
    pub page: usize,
    /// Requested page size
    pub size: usize,
    /// Total matching candidates across all pages
    pub total_items: u64,
}

/// Discovery sessions and their counters
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session
    async fn create_session(&self, session: DiscoverySession) -> DiscoveryResult<()>;

    /// Fetch a session by id
    async fn get_session(&self, id: SessionId) -> DiscoveryResult<Option<DiscoverySession>>;

    /// Most recently started sessions, newest first
    async fn list_recent_sessions(&self, limit: usize) -> DiscoveryResult<Vec<DiscoverySession>>;

    /// Record one finished (engine, query) request
    ///
    /// Returns the updated progress, or `None` when the session is already
    /// finalized (the output is stale and must not affect counters).
    async fn record_engine_request(
        &self,
        id: SessionId,
        engine: EngineKind,
        results_found: u64,
        failed: bool,
    ) -> DiscoveryResult<Option<SessionProgress>>;

    /// Record one terminal pipeline outcome
    ///
    /// Returns the updated progress, or `None` for finalized sessions.
    async fn record_outcome(
        &self,
        id: SessionId,
        outcome: ProcessedOutcome,
    ) -> DiscoveryResult<Option<SessionProgress>>;

    /// Disable an engine for the remainder of a session (auth failure)
    async fn disable_engine(&self, id: SessionId, engine: EngineKind) -> DiscoveryResult<()>;

    /// Whether an engine was disabled for this session
    async fn is_engine_disabled(&self, id: SessionId, engine: EngineKind)
        -> DiscoveryResult<bool>;

    /// Flip a Running session into a terminal status, exactly once
    ///
    /// Returns whether this call performed the flip. Counters are immutable
    /// from the moment this returns `true`.
    async fn try_finalize_session(
        &self,
        id: SessionId,
        status: SessionStatus,
    ) -> DiscoveryResult<bool>;
}

/// The global domain registry
#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Idempotently register a host, returning the canonical row
    ///
    /// Uniqueness races resolve by catching the conflict and re-reading.
    async fn register_or_get(
        &self,
        host: &str,
        session: SessionId,
    ) -> DiscoveryResult<DomainRecord>;

    /// Fetch a domain by host
    async fn get_domain(&self, host: &str) -> DiscoveryResult<Option<DomainRecord>>;

    /// Whether the pipeline should process this host now
    async fn should_process(&self, host: &str) -> DiscoveryResult<bool>;

    /// Whether the host is currently blacklisted (authoritative read)
    async fn is_blacklisted(&self, host: &str) -> DiscoveryResult<bool>;

    /// Record a quality sighting atomically
    async fn update_quality(
        &self,
        host: &str,
        confidence: Confidence,
        is_high: bool,
    ) -> DiscoveryResult<DomainRecord>;

    /// Upsert the host into the blacklist
    async fn blacklist_domain(
        &self,
        host: &str,
        reason: &str,
        actor: &str,
    ) -> DiscoveryResult<DomainRecord>;

    /// Explicitly lift a blacklist (administrator action)
    async fn unblacklist_domain(&self, host: &str, actor: &str) -> DiscoveryResult<DomainRecord>;

    /// Mark an existing host as having no funds for a year
    async fn mark_no_funds(
        &self,
        host: &str,
        year: i32,
        notes: Option<String>,
    ) -> DiscoveryResult<DomainRecord>;

    /// Record a processing failure with exponential backoff
    async fn record_domain_failure(&self, host: &str, reason: &str)
        -> DiscoveryResult<DomainRecord>;
}

/// Candidate rows and review transitions
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Insert a candidate, idempotent on (session, host)
    async fn insert_candidate(&self, candidate: Candidate) -> DiscoveryResult<CandidateInsert>;

    /// Fetch a candidate by id
    async fn get_candidate(&self, id: CandidateId) -> DiscoveryResult<Option<Candidate>>;

    /// Apply a review transition (approve or reject)
    ///
    /// Fails with `EntityNotFound` for unknown ids and
    /// `InvalidStateTransition` when the candidate is already in (or past)
    /// the target state.
    async fn review_candidate(
        &self,
        id: CandidateId,
        target: CandidateStatus,
        reviewer: &str,
    ) -> DiscoveryResult<Candidate>;

    /// Paged, filtered candidate listing
    async fn query_candidates(&self, filter: &CandidateFilter) -> DiscoveryResult<CandidatePage>;
}

/// Immutable score breakdowns
#[async_trait]
pub trait JudgmentStore: Send + Sync {
    /// Append a judgment
    async fn insert_judgment(&self, judgment: MetadataJudgment) -> DiscoveryResult<()>;

    /// All judgments for a candidate, oldest first
    async fn judgments_for(&self, id: CandidateId) -> DiscoveryResult<Vec<MetadataJudgment>>;
}

/// The append-only enhancement audit log
#[async_trait]
pub trait EnhancementStore: Send + Sync {
    /// Append a record; backdated timestamps are rejected
    async fn append_enhancement(&self, record: EnhancementRecord) -> DiscoveryResult<()>;

    /// All records for a candidate, oldest first
    async fn enhancements_for(&self, id: CandidateId) -> DiscoveryResult<Vec<EnhancementRecord>>;
}

/// Provider usage rows driving rolling rate limits
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Record a usage row (written before the call goes out)
    async fn record_usage(&self, usage: ProviderUsage) -> DiscoveryResult<()>;

    /// Fill in the outcome of a previously recorded row
    async fn complete_usage(
        &self,
        id: Uuid,
        result_count: u32,
        success: bool,
        response_time_ms: u64,
    ) -> DiscoveryResult<()>;

    /// Rolling count of calls to a provider since an instant
    async fn count_usage_since(
        &self,
        provider: EngineKind,
        since: DateTime<Utc>,
    ) -> DiscoveryResult<u64>;
}

/// The saved-query library for scheduled runs
#[async_trait]
pub trait SavedQueryStore: Send + Sync {
    /// Insert or replace a saved query
    async fn upsert_saved_query(&self, query: SavedQuery) -> DiscoveryResult<()>;

    /// All saved queries
    async fn list_saved_queries(&self) -> DiscoveryResult<Vec<SavedQuery>>;

    /// Enabled queries scheduled for a day
    async fn saved_queries_for(&self, day: ScheduleDay) -> DiscoveryResult<Vec<SavedQuery>>;
}

/// Query-generation audit rows
#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Append a generation record
    async fn record_generation(&self, record: QueryGenerationRecord) -> DiscoveryResult<()>;

    /// Most recent generation records, newest first
    async fn list_recent_generations(
        &self,
        limit: usize,
    ) -> DiscoveryResult<Vec<QueryGenerationRecord>>;
}

/// Dead-letter events kept for replay
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Record a dead-letter event
    async fn record_dead_letter(&self, event: WorkflowErrorEvent) -> DiscoveryResult<()>;

    /// Fetch a dead-letter event by id
    async fn get_dead_letter(&self, id: ErrorId) -> DiscoveryResult<Option<WorkflowErrorEvent>>;

    /// Most recent dead-letter events, newest first
    async fn recent_dead_letters(&self, limit: usize)
        -> DiscoveryResult<Vec<WorkflowErrorEvent>>;
}

/// The full store surface the pipeline components consume
pub trait DiscoveryStore:
    SessionStore
    + DomainStore
    + CandidateStore
    + JudgmentStore
    + EnhancementStore
    + UsageStore
    + SavedQueryStore
    + GenerationStore
    + DeadLetterStore
{
}

impl<T> DiscoveryStore for T where
    T: SessionStore
        + DomainStore
        + CandidateStore
        + JudgmentStore
        + EnhancementStore
        + UsageStore
        + SavedQueryStore
        + GenerationStore
        + DeadLetterStore
{
}

/// Per-trait handles over one store, cloned cheaply into each component
#[derive(Clone)]
pub struct StoreHandles {
    /// Sessions and their counters
    pub sessions: std::sync::Arc<dyn SessionStore>,
    /// The global domain registry
    pub domains: std::sync::Arc<dyn DomainStore>,
    /// Candidate rows
    pub candidates: std::sync::Arc<dyn CandidateStore>,
    /// Score breakdowns
    pub judgments: std::sync::Arc<dyn JudgmentStore>,
    /// Enhancement audit log
    pub enhancements: std::sync::Arc<dyn EnhancementStore>,
    /// Provider usage rows
    pub usage: std::sync::Arc<dyn UsageStore>,
    /// Saved-query library
    pub saved_queries: std::sync::Arc<dyn SavedQueryStore>,
    /// Query-generation audit rows
    pub generations: std::sync::Arc<dyn GenerationStore>,
    /// Dead-letter records
    pub dead_letters: std::sync::Arc<dyn DeadLetterStore>,
}

impl StoreHandles {
    /// Split one store into its per-trait handles
    pub fn from_store<S: DiscoveryStore + 'static>(store: std::sync::Arc<S>) -> Self {
        Self {
            sessions: store.clone(),
            domains: store.clone(),
            candidates: store.clone(),
            judgments: store.clone(),
            enhancements: store.clone(),
            usage: store.clone(),
            saved_queries: store.clone(),
            generations: store.clone(),
            dead_letters: store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_insert_accessors() {
        let id = CandidateId::new();
        assert!(CandidateInsert::Inserted(id).was_inserted());
        assert!(!CandidateInsert::Existing(id).was_inserted());
        assert_eq!(CandidateInsert::Existing(id).id(), id);
    }

    #[test]
    fn test_filter_sanitizes_size() {
        let filter = CandidateFilter {
            size: 0,
            ..Default::default()
        };
        assert_eq!(filter.sanitized().size, 1);

        let filter = CandidateFilter {
            size: 5000,
            ..Default::default()
        };
        assert_eq!(filter.sanitized().size, 100);
    }

    #[test]
    fn test_sort_field_parse() {
        assert_eq!(SortField::parse("confidence"), Some(SortField::Confidence));
        assert_eq!(SortField::parse("createdAt"), Some(SortField::CreatedAt));
        assert_eq!(SortField::parse("rank"), None);
    }
}
